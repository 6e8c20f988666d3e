//! API error mapping for genatlas-ac
//!
//! Every error leaving a handler carries a machine-readable code and a
//! human-readable message; no endpoint swallows an error into an empty
//! success.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use genatlas_common::Error;
use serde_json::json;
use thiserror::Error as ThisError;

/// API error type
#[derive(Debug, ThisError)]
pub enum ApiError {
    /// Core curation error, mapped by kind
    #[error(transparent)]
    Core(#[from] Error),

    /// Malformed request body or path/query parameter
    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::Core(err) => match err {
                Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
                Error::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
                Error::InvalidState(msg) => (StatusCode::BAD_REQUEST, "INVALID_STATE", msg),
                Error::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED", msg),
                Error::Upstream(msg) => (StatusCode::BAD_GATEWAY, "UPSTREAM_FAILURE", msg),
                // Inconsistencies are self-healed where detected; reaching here
                // means the healing path itself failed.
                Error::Inconsistent(msg) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
                }
                other => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    other.to_string(),
                ),
            },
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
