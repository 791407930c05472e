//! Photo Lifecycle Manager.
//!
//! Uploads are written in full to a hidden staging file first, renamed to
//! their final name once the owning card is known, and only then linked in
//! the database. The previous file is removed after the new link commits, so
//! a crash can leave an orphaned file but never a dangling `photo_path`.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{PhotoError, PhotoResult};
use crate::store::Store;

pub const MAX_PHOTO_BYTES: u64 = 5 * 1024 * 1024;

const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// Stored paths look like `uploads/<file>`; the URL is the same with a leading slash.
const PATH_PREFIX: &str = "uploads";

const STAGING_PREFIX: &str = ".incoming-";

/// Checks the extension and returns it lower-cased.
pub fn validate(filename: &str) -> PhotoResult<String> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(PhotoError::Validation(
            "only jpg, jpeg, png and webp photos are allowed".to_string(),
        ))
    }
}

fn check_size(len: u64) -> PhotoResult<()> {
    if len > MAX_PHOTO_BYTES {
        return Err(PhotoError::Validation("photo exceeds the 5 MiB limit".to_string()));
    }
    Ok(())
}

/// Copies `reader` into a new file at `path`, stopping as soon as the size
/// cap is passed. Returns the number of bytes written.
async fn write_upload<R>(path: &Path, reader: R) -> PhotoResult<u64>
where
    R: AsyncRead,
{
    let mut file = fs::File::create(path).await?;
    tokio::pin!(reader);
    let mut buf = vec![0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| PhotoError::Validation(format!("photo upload interrupted: {e}")))?;
        if n == 0 {
            break;
        }
        size += n as u64;
        check_size(size)?;
        file.write_all(&buf[..n]).await?;
    }
    file.sync_all().await?;
    Ok(size)
}

/// A fully written upload that is not yet linked to any card.
/// Dropping it without committing deletes the file.
#[derive(Debug)]
pub struct StagedPhoto {
    path: Option<PathBuf>,
    ext: String,
    size: u64,
}

impl StagedPhoto {
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Deletes the staging file now.
    pub async fn discard(mut self) {
        if let Some(path) = self.path.take() {
            if let Err(err) = fs::remove_file(&path).await {
                log_discard_failure(&path, &err);
            }
        }
    }
}

fn log_discard_failure(path: &Path, err: &io::Error) {
    if err.kind() != io::ErrorKind::NotFound {
        warn!(path = %path.display(), error = %err, "could not discard staged photo");
    }
}

fn remove_staging_file(path: PathBuf) {
    if let Err(err) = std::fs::remove_file(&path) {
        log_discard_failure(&path, &err);
    }
}

impl Drop for StagedPhoto {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        // Inside the runtime the unlink goes to the blocking pool.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_staging_file(path));
            }
            Err(_) => remove_staging_file(path),
        }
    }
}

#[derive(Clone)]
pub struct PhotoManager {
    uploads_dir: PathBuf,
    store: Store,
}

impl PhotoManager {
    pub fn new(uploads_dir: impl Into<PathBuf>, store: Store) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
            store,
        }
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    /// Removes staging files left behind by an earlier process. Returns how
    /// many were deleted. Run before serving; a missing directory counts as
    /// empty.
    pub async fn sweep_staging(&self) -> PhotoResult<usize> {
        let mut entries = match fs::read_dir(&self.uploads_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let is_staging = name.to_str().is_some_and(|n| n.starts_with(STAGING_PREFIX));
            if !is_staging || !entry.file_type().await?.is_file() {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        if removed > 0 {
            info!(removed, "swept stale staging files");
        }
        Ok(removed)
    }

    /// Streams `reader` into a staging file, enforcing the extension and size
    /// rules. Nothing is left on disk if this fails.
    pub async fn stage<R>(&self, filename: &str, reader: R) -> PhotoResult<StagedPhoto>
    where
        R: AsyncRead,
    {
        let ext = validate(filename)?;
        fs::create_dir_all(&self.uploads_dir).await?;

        let path = self
            .uploads_dir
            .join(format!("{STAGING_PREFIX}{}.{ext}", Uuid::new_v4()));
        let mut staged = StagedPhoto {
            path: Some(path.clone()),
            ext,
            size: 0,
        };
        match write_upload(&path, reader).await {
            Ok(size) => {
                staged.size = size;
                Ok(staged)
            }
            Err(err) => {
                staged.discard().await;
                Err(err)
            }
        }
    }

    /// Moves a staged upload to its final name for `card_id` and returns the
    /// relative path to store.
    pub async fn commit(&self, card_id: i64, mut staged: StagedPhoto) -> PhotoResult<String> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let name = format!("card_{card_id}_{nanos}.{}", staged.ext);
        let Some(from) = staged.path.take() else {
            return Err(PhotoError::Validation("photo was already committed".to_string()));
        };
        if let Err(err) = fs::rename(&from, self.uploads_dir.join(&name)).await {
            staged.path = Some(from);
            return Err(err.into());
        }
        Ok(format!("{PATH_PREFIX}/{name}"))
    }

    /// Validates, writes and names an upload for an existing card.
    /// The card is not linked to it yet; see [`PhotoManager::attach`].
    pub async fn store<R>(&self, card_id: i64, filename: &str, reader: R) -> PhotoResult<String>
    where
        R: AsyncRead,
    {
        let staged = self.stage(filename, reader).await?;
        self.commit(card_id, staged).await
    }

    /// Links a stored photo to the card, then removes the photo it replaced.
    /// If the link fails the new file is removed instead.
    pub async fn attach(&self, card_id: i64, relative_path: &str) -> PhotoResult<()> {
        let path = relative_path.to_string();
        let linked = self
            .store
            .call(move |store| store.update_photo_path(card_id, &path))
            .await;

        let previous = match linked {
            Ok(previous) => previous,
            Err(err) => {
                if let Err(cleanup) = self.remove(relative_path).await {
                    warn!(card_id, error = %cleanup, "could not remove unlinked photo");
                }
                return Err(err.into());
            }
        };
        info!(card_id, path = relative_path, "photo attached");

        if !previous.is_empty() && previous != relative_path {
            if let Err(err) = self.remove(&previous).await {
                warn!(card_id, path = %previous, error = %err, "old photo left on disk");
            }
        }
        Ok(())
    }

    /// Unlinks the card's photo and deletes the file. Returns the path that
    /// was linked (empty if there was none).
    pub async fn detach(&self, card_id: i64) -> PhotoResult<String> {
        let previous = self
            .store
            .call(move |store| store.clear_photo_path(card_id))
            .await?;
        if !previous.is_empty() {
            self.remove(&previous).await?;
            info!(card_id, path = %previous, "photo detached");
        }
        Ok(previous)
    }

    /// Deletes the file behind a stored path. A missing file is not an error.
    pub async fn remove(&self, relative_path: &str) -> PhotoResult<()> {
        let Some(path) = self.disk_path(relative_path) else {
            return Ok(());
        };
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Resolves a client-supplied file name under the uploads directory.
    /// Anything other than a plain, visible base name is rejected.
    pub fn locate(&self, filename: &str) -> PhotoResult<PathBuf> {
        let is_base_name = Path::new(filename).file_name().and_then(|n| n.to_str()) == Some(filename);
        if !is_base_name || filename.starts_with('.') || filename.contains('\\') {
            return Err(PhotoError::Validation("invalid filename".to_string()));
        }
        Ok(self.uploads_dir.join(filename))
    }

    fn disk_path(&self, relative_path: &str) -> Option<PathBuf> {
        let name = Path::new(relative_path).file_name()?;
        Some(self.uploads_dir.join(name))
    }
}
