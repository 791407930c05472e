use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "cardfile", about = "Business card store with a REST API")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// SQLite database path
    #[arg(long, env = "CARDFILE_DB", default_value = "cardfile.db")]
    pub db: PathBuf,

    /// Directory for uploaded photos
    #[arg(long, env = "CARDFILE_UPLOADS", default_value = "uploads")]
    pub uploads_dir: PathBuf,

    /// Seed the database with sample cards if it is empty
    #[arg(long, env = "CARDFILE_SEED", default_value_t = false)]
    pub seed: bool,

    /// Seconds in-flight requests get to finish after a shutdown signal
    #[arg(long = "shutdown-grace", env = "CARDFILE_SHUTDOWN_GRACE", default_value_t = 10)]
    pub shutdown_grace_secs: u64,

    /// Largest request body accepted, in bytes
    #[arg(long = "max-body", env = "CARDFILE_MAX_BODY", default_value_t = 6 * 1024 * 1024)]
    pub max_body_bytes: usize,
}

impl Config {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
