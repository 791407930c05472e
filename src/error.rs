use std::io;

use axum::{
    extract::{multipart::MultipartRejection, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Outcomes of Card Store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),

    #[error("card {0} not found")]
    NotFound(i64),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("storage task failed: {0}")]
    Background(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Outcomes of photo validation, storage and linking.
#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("{0}")]
    Validation(String),

    #[error("photo file error: {0}")]
    FileSystem(#[from] io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type PhotoResult<T> = std::result::Result<T, PhotoError>;

/// Errors as seen by HTTP clients. Every variant renders as
/// `{"kind": ..., "error": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Storage(String),

    #[error("{0}")]
    FileSystem(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation",
            ApiError::NotFound(_) => "not_found",
            ApiError::Storage(_) => "storage",
            ApiError::FileSystem(_) => "filesystem",
            ApiError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Storage(_) | ApiError::FileSystem(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(msg) => ApiError::Validation(msg),
            StoreError::NotFound(_) => ApiError::NotFound(err.to_string()),
            StoreError::Storage(_) => ApiError::Storage(err.to_string()),
            StoreError::Background(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<PhotoError> for ApiError {
    fn from(err: PhotoError) -> Self {
        match err {
            PhotoError::Validation(msg) => ApiError::Validation(msg),
            PhotoError::FileSystem(_) => ApiError::FileSystem(err.to_string()),
            PhotoError::Store(inner) => inner.into(),
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::Validation(format!("expected a multipart form: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.kind(), "{}", self);
        }
        let body = Json(json!({
            "kind": self.kind(),
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}
