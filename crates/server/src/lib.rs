//! HTTP gateway for satchel.
//!
//! This crate provides the HTTP surface:
//! - Signed, time-limited downloads of plain blobs
//! - Downloads of individual entries from mounted archives
//! - Liveness and Prometheus metrics endpoints

pub mod content_type;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
