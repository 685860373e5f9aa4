//! Error types for capability token validation.

use thiserror::Error;

/// Reasons a capability token is rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Signature is not 64 lowercase hex characters, or does not match.
    #[error("invalid signature")]
    InvalidSignature,

    /// Signature verified but the payload could not be decoded.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// Signature verified but a required field is absent.
    #[error("token is missing required field: {0}")]
    MissingField(&'static str),

    /// Token expiry is at or before the current time.
    #[error("token expired")]
    Expired,
}

/// Result type alias for token operations.
pub type TokenResult<T> = std::result::Result<T, TokenError>;
