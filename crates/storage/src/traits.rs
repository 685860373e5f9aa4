//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::fmt;
use std::pin::Pin;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Metadata about a stored object.
#[derive(Clone, Debug, Default)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time (if available).
    pub last_modified: Option<time::OffsetDateTime>,
    /// Content type (if available).
    pub content_type: Option<String>,
}

/// An object opened for reading: its metadata and a body stream.
pub struct ObjectStream {
    /// Metadata reported by the backend when the object was opened.
    pub meta: ObjectMeta,
    /// The object's content.
    pub body: ByteStream,
}

impl fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStream")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Object store abstraction for content-addressed storage.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Open an object for streaming, returning its metadata and body.
    ///
    /// Returns `StorageError::NotFound` when the key does not exist.
    async fn get_stream(&self, key: &str) -> StorageResult<ObjectStream>;

    /// Put an object atomically. Blobs are written by the issuing side;
    /// the gateway itself only reads.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// List objects whose keys start with `prefix`.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Get the name of this storage backend.
    ///
    /// Returns a static string identifier for the backend type (e.g., "s3", "filesystem").
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// Called during server startup so the process never reports healthy
    /// while its storage is unreachable. The default implementation returns
    /// Ok(()), suitable for backends without a remote dependency.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
