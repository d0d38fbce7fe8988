//! HTTP error mapping for the project routes.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use pixelchunk_store::StoreError;

/// Errors surfaced by the request/response routes.
///
/// Edit-channel failures never come through here — validation, protocol,
/// and conflict outcomes are answered in-band on the WebSocket.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ProjectNotFound(_) => ApiError::NotFound("Project not found".into()),
            StoreError::SnapshotNotFound(_) => ApiError::NotFound("Snapshot not found".into()),
            StoreError::Validation(v) => ApiError::Validation(v.to_string()),
            StoreError::Storage(msg) => ApiError::Storage(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            ApiError::Storage(msg) => {
                tracing::error!("storage failure: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "storage failure".to_string())
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
