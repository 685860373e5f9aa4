//! HTTP request handlers.

pub mod blob;
pub mod health;

pub use blob::*;
pub use health::*;
