//! Liveness and fallback endpoints.

use crate::error::ApiError;
use axum::http::{StatusCode, Uri};

/// GET / - liveness check. Always 200 with an empty body.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Fallback for unmatched routes.
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("no route for {}", uri.path()))
}
