//! Core domain types shared across the satchel crates.
//!
//! This crate defines:
//! - Capability tokens and their HMAC-based validator
//! - Configuration types for the server, storage, auth and mount cache
//! - Error types for token validation

pub mod config;
pub mod error;
pub mod token;

pub use error::{TokenError, TokenResult};
pub use token::{CapabilityToken, SIGNATURE_HEX_LEN, TokenVerifier};

/// Default maximum number of entries a mounted archive may declare.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Default idle time (seconds) before an unreferenced mount is evicted.
pub const DEFAULT_IDLE_TTL_SECS: u64 = 300;
