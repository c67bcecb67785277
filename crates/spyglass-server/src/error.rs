//! Structured API error payloads.
//!
//! Every failed REST call returns `{"error": {"code": "...", "message":
//! "..."}}` with a non-2xx status: 404 for unknown sessions, 409 for
//! operations illegal in the current state, 400 for unusable requests
//! (including unavailable adapters), 500 for store and adapter failures.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use spyglass_engine::EngineError;

/// Caller-facing API error.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unknown session or resource.
    #[error("{0}")]
    NotFound(String),
    /// Operation not legal in the current state.
    #[error("{0}")]
    Conflict(String),
    /// Request cannot be served as written.
    #[error("{0}")]
    BadRequest(String),
    /// Store or adapter failure.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "invalid_state",
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        if err.is_not_found() {
            return Self::NotFound(err.to_string());
        }
        match err {
            EngineError::InvalidState(msg) => Self::Conflict(msg),
            EngineError::AdapterUnavailable(_) => Self::BadRequest(err.to_string()),
            EngineError::Adapter(msg) => Self::Internal(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (self.status(), Json(body)).into_response()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
