//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use palisade_core::EmbeddingError;
use serde::Serialize;
use thiserror::Error;

/// API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request text is empty after trimming.
    #[error("text must not be empty")]
    EmptyText,

    /// Request text exceeds the maximum length.
    #[error("text exceeds maximum length of {0} characters")]
    TextTooLong(usize),

    /// The embedding provider failed; the request cannot be judged.
    #[error("embedding provider unavailable: {0}")]
    Provider(#[from] EmbeddingError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::EmptyText => (StatusCode::BAD_REQUEST, "empty_text"),
            ApiError::TextTooLong(_) => (StatusCode::BAD_REQUEST, "text_too_long"),
            ApiError::Provider(_) => (StatusCode::SERVICE_UNAVAILABLE, "provider_unavailable"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;
