//! Multipart decoding for the card endpoints.
//!
//! Scalar fields arrive as plain text parts. `phones`, `emails`, `addresses`
//! and `tags` arrive as JSON-encoded text parts; each is decoded on its own
//! and a malformed value degrades to an empty list instead of failing the
//! request. A `photo` file part is streamed straight to the photo staging area.

use std::collections::HashMap;
use std::io;

use axum::extract::multipart::{Field, Multipart};
use futures_util::TryStreamExt;
use serde::de::DeserializeOwned;
use tokio_util::io::StreamReader;
use tracing::warn;

use crate::error::ApiError;
use crate::models::{AddressInput, CardInput, EmailInput, PhoneInput};
use crate::photos::{PhotoManager, StagedPhoto};

const PHOTO_FIELD: &str = "photo";

/// A decoded create/update form.
pub struct CardForm {
    pub input: CardInput,
    pub photo: Option<StagedPhoto>,
}

fn multipart_error(err: impl std::fmt::Display) -> ApiError {
    ApiError::Validation(format!("invalid multipart body: {err}"))
}

/// File name of a non-empty photo part, if this field is one.
fn photo_filename(field: &Field<'_>) -> Option<String> {
    if field.name() != Some(PHOTO_FIELD) {
        return None;
    }
    field
        .file_name()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

async fn stage_field(photos: &PhotoManager, filename: &str, field: Field<'_>) -> Result<StagedPhoto, ApiError> {
    let stream = field.map_err(|e| io::Error::new(io::ErrorKind::Other, e));
    let staged = photos.stage(filename, StreamReader::new(stream)).await?;
    Ok(staged)
}

pub async fn read_card_form(mut multipart: Multipart, photos: &PhotoManager) -> Result<CardForm, ApiError> {
    let mut text: HashMap<String, String> = HashMap::new();
    let mut photo = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if let Some(filename) = photo_filename(&field) {
            photo = Some(stage_field(photos, &filename, field).await?);
            continue;
        }
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let value = field.text().await.map_err(multipart_error)?;
        text.insert(name, value);
    }

    match card_input_from_fields(&text) {
        Ok(input) => Ok(CardForm { input, photo }),
        Err(err) => {
            if let Some(staged) = photo {
                staged.discard().await;
            }
            Err(err)
        }
    }
}

/// Reads the single `photo` part of a photo upload form.
pub async fn read_photo_form(mut multipart: Multipart, photos: &PhotoManager) -> Result<StagedPhoto, ApiError> {
    let mut photo = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if let Some(filename) = photo_filename(&field) {
            photo = Some(stage_field(photos, &filename, field).await?);
        }
    }
    photo.ok_or_else(|| ApiError::Validation("no photo field provided".to_string()))
}

fn decode_list<T: DeserializeOwned>(text: &HashMap<String, String>, key: &str) -> Vec<T> {
    let Some(raw) = text.get(key).map(|s| s.trim()).filter(|s| !s.is_empty()) else {
        return Vec::new();
    };
    serde_json::from_str(raw).unwrap_or_else(|err| {
        warn!(field = key, error = %err, "ignoring malformed form field");
        Vec::new()
    })
}

fn scalar(text: &HashMap<String, String>, key: &str) -> String {
    text.get(key).map(|s| s.trim().to_string()).unwrap_or_default()
}

pub fn card_input_from_fields(text: &HashMap<String, String>) -> Result<CardInput, ApiError> {
    let name = scalar(text, "name");
    if name.is_empty() {
        return Err(ApiError::Validation("name is required".to_string()));
    }

    Ok(CardInput {
        name,
        title: scalar(text, "title"),
        company: scalar(text, "company"),
        website: scalar(text, "website"),
        notes: scalar(text, "notes"),
        phones: decode_list::<PhoneInput>(text, "phones"),
        emails: decode_list::<EmailInput>(text, "emails"),
        addresses: decode_list::<AddressInput>(text, "addresses"),
        tags: decode_list::<String>(text, "tags"),
    })
}
