//! Cache error types and their HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use raclette_store::StoreError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("entry with key {key} already exists and overwrite-existing is disabled")]
    KeyConflict { key: String },

    #[error("payload of at least {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("key must not be empty")]
    InvalidKey,

    #[error("request carries no payload part")]
    MissingPayload,

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

impl CacheError {
    pub fn status(&self) -> StatusCode {
        match self {
            CacheError::KeyConflict { .. } => StatusCode::CONFLICT,
            CacheError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            CacheError::InvalidKey | CacheError::MissingPayload | CacheError::InvalidBody(_) => {
                StatusCode::BAD_REQUEST
            }
            CacheError::Store(StoreError::OversizedEntry { component, .. }) if component == "key" => {
                StatusCode::BAD_REQUEST
            }
            CacheError::Store(StoreError::OversizedEntry { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            CacheError::Store(_) | CacheError::Io(_) | CacheError::Config(_) | CacheError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Caused by the request rather than by the service.
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}
