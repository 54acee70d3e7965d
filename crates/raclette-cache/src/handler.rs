//! HTTP handlers for `/raclette/{key}` and `/health`.
//!
//! Store calls block, so each one runs on the blocking thread pool.

use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use bytes::{Buf, Bytes};
use serde_json::json;

use crate::error::{CacheError, CacheResult};
use crate::repository::BlobRepository;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn BlobRepository>,
    pub max_payload_bytes: u64,
}

impl AppState {
    pub fn new(repository: Arc<dyn BlobRepository>, max_payload_bytes: u64) -> Self {
        Self { repository, max_payload_bytes }
    }

    /// Request body limit: the payload plus room for multipart framing.
    pub fn body_limit(&self) -> usize {
        self.max_payload_bytes.saturating_add(64 * 1024).min(usize::MAX as u64) as usize
    }
}

/// Run a repository call on the blocking pool.
async fn run_blocking<T, F>(f: F) -> CacheResult<T>
where
    F: FnOnce() -> CacheResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CacheError::Internal(format!("repository task failed: {}", e)))?
}

fn multipart_error(err: MultipartError, limit: u64) -> CacheError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        CacheError::PayloadTooLarge { size: limit.saturating_add(1), limit }
    } else {
        CacheError::InvalidBody(err.body_text())
    }
}

/// Pick the payload part: the first part with a filename, else the first part.
async fn payload_part(multipart: &mut Multipart, limit: u64) -> CacheResult<Bytes> {
    let mut first = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| multipart_error(e, limit))? {
        let is_file = field.file_name().is_some();
        let data = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
        if is_file {
            return Ok(data);
        }
        if first.is_none() {
            first = Some(data);
        }
    }
    first.ok_or(CacheError::MissingPayload)
}

/// `POST /raclette/:key`
pub async fn save_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    mut multipart: Multipart,
) -> CacheResult<StatusCode> {
    let payload = payload_part(&mut multipart, state.max_payload_bytes).await?;
    let repository = Arc::clone(&state.repository);
    run_blocking(move || repository.save(&key, &mut payload.reader())).await?;
    Ok(StatusCode::OK)
}

/// `GET /raclette/:key`
pub async fn find_handler(State(state): State<AppState>, Path(key): Path<String>) -> CacheResult<Response> {
    let repository = Arc::clone(&state.repository);
    let lookup_key = key.clone();
    let found = run_blocking(move || repository.find(&lookup_key)).await?;
    Ok(match found {
        Some(value) => ([(header::CONTENT_TYPE, "application/octet-stream")], value).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": format!("no entry for key {}", key) }))).into_response(),
    })
}

/// `DELETE /raclette/:key`
pub async fn delete_handler(State(state): State<AppState>, Path(key): Path<String>) -> CacheResult<StatusCode> {
    let repository = Arc::clone(&state.repository);
    run_blocking(move || repository.delete(&key)).await?;
    Ok(StatusCode::OK)
}

/// Health check handler.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "entries": state.repository.len(),
    }))
}
