//! API error handling for the HTTP surface.
//!
//! All error responses share the shape `{"error": {"text": "...",
//! "detail": "..."}}`. Not-found and empty-collection conditions map to
//! 404; everything else user-facing maps to 400.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::StashError;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Error details.
    pub error: ErrorDetail,
}

/// Error detail.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Human-readable message.
    pub text: String,
    /// Underlying error detail, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// API error type.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    text: String,
    detail: Option<String>,
}

impl ApiError {
    /// Create a new API error.
    pub fn new(status: StatusCode, text: impl Into<String>) -> Self {
        Self {
            status,
            text: text.into(),
            detail: None,
        }
    }

    /// Create a bad request (400) error.
    pub fn bad_request(text: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, text)
    }

    /// Create a not found (404) error.
    pub fn not_found(text: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, text)
    }

    /// Attach the underlying error detail.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Map a store error under a context message.
    ///
    /// Not-found and empty-collection keep their 404 mapping; any other
    /// error becomes a 400 carrying `text` with the underlying detail.
    pub fn from_store(text: &str, err: StashError) -> Self {
        match err {
            StashError::NotFound(_) => ApiError::not_found("File not found"),
            StashError::EmptyCollection => ApiError::not_found("No files found"),
            other => {
                tracing::error!("{text}: {other}");
                ApiError::bad_request(text).with_detail(other.to_string())
            }
        }
    }

    /// The HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                text: self.text,
                detail: self.detail,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.text)
    }
}

impl std::error::Error for ApiError {}

impl From<StashError> for ApiError {
    fn from(err: StashError) -> Self {
        ApiError::from_store("Unable to process request", err)
    }
}
