//! Archive mount error types.

use satchel_storage::StorageError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while mounting archives or streaming their entries.
#[derive(Debug, Error)]
pub enum MountError {
    #[error("archive declares {count} entries, limit is {max}")]
    TooManyEntries { count: usize, max: usize },

    #[error("entry {name} is {size} bytes uncompressed, limit is {max}")]
    EntryTooLarge { name: String, size: u64, max: u64 },

    #[error("archive parse error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("entry not found: {0}")]
    EntryNotFound(String),

    #[error("archive {0} is not mounted")]
    NotActive(String),

    #[error("entry {name} uses unsupported compression {method}")]
    UnsupportedCompression { name: String, method: String },

    #[error("entry {name} produced {actual} bytes, expected {expected}")]
    SizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("fetching archive timed out after {0:?}")]
    FetchTimeout(Duration),

    #[error("background task failed: {0}")]
    Task(String),
}

impl MountError {
    /// Whether the requested archive or entry simply does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::EntryNotFound(_) => true,
            Self::Storage(e) => e.is_not_found(),
            _ => false,
        }
    }
}

impl From<tokio::task::JoinError> for MountError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

/// Result type for mount operations.
pub type MountResult<T> = std::result::Result<T, MountError>;
