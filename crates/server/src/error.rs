//! API error types.
//!
//! Every failure a handler can produce funnels through [`ApiError`], which
//! owns the mapping to HTTP status codes. Messages of server-side faults are
//! logged in full and replaced by a generic message in the response.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use satchel_core::TokenError;
use satchel_mount::MountError;
use satchel_storage::StorageError;
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("archive error: {0}")]
    Mount(#[from] MountError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Token(TokenError::InvalidSignature) => "invalid_signature",
            Self::Token(TokenError::MalformedToken(_)) => "malformed_token",
            Self::Token(TokenError::MissingField(_)) => "missing_field",
            Self::Token(TokenError::Expired) => "expired",
            Self::Storage(StorageError::NotFound(_)) => "not_found",
            Self::Storage(_) => "storage_error",
            Self::Mount(MountError::EntryNotFound(_)) => "not_found",
            Self::Mount(_) => "archive_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Token(e) => match e {
                TokenError::InvalidSignature => StatusCode::BAD_REQUEST,
                TokenError::Expired => StatusCode::GONE,
                // The token was signed by us yet does not parse: an issuer fault
                TokenError::MalformedToken(_) | TokenError::MissingField(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Mount(MountError::EntryNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Mount(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the message may be shown to the client as is.
    pub fn is_exposable(&self) -> bool {
        !self.status_code().is_server_error()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if self.is_exposable() {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
            self.to_string()
        } else {
            tracing::error!(status = status.as_u16(), code = self.code(), error = %self, "Request failed");
            "internal error".to_string()
        };
        let body = ErrorResponse {
            code: self.code().to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
