//! API error types with HTTP response mapping

use crate::services::dispatcher::DispatchError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The base-language digest does not exist or is still being written
    #[error("{0}")]
    ContentNotReady(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] polycast_common::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<DispatchError> for ApiError {
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::ContentNotReady(date) => {
                ApiError::ContentNotReady(format!("Digest content for {} is not ready", date))
            }
            DispatchError::Content(e) => ApiError::Internal(format!("Content API error: {}", e)),
            DispatchError::Database(e) => ApiError::Common(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            ApiError::ContentNotReady(msg) => {
                (StatusCode::CONFLICT, "CONTENT_NOT_READY", msg.clone())
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", msg.clone()),
            ApiError::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR", e.to_string()),
            ApiError::Common(e) => match e {
                polycast_common::Error::NotFound(msg) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone())
                }
                polycast_common::Error::InvalidInput(msg) => {
                    (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone())
                }
                other => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", other.to_string()),
            },
            ApiError::Other(e) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", e.to_string()),
        };

        if status.is_server_error() {
            tracing::error!(code, "{}", message);
        }

        (status, Json(json!({ "error": { "code": code, "message": message } }))).into_response()
    }
}
