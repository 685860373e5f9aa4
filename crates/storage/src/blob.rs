//! Blob fetching by content hash.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ObjectStore, ObjectStream};
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

/// Fetches blobs from an object store by content hash.
///
/// Blobs are normally stored under their bare hash. Older writers stored
/// them under keys that merely start with the hash (for example
/// `<hash>.zip`), so a miss on the bare key falls back to one prefix search.
#[derive(Clone)]
pub struct BlobClient {
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for BlobClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobClient")
            .field("backend", &self.store.backend_name())
            .finish()
    }
}

impl BlobClient {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Open the blob stored for `hash`.
    ///
    /// On a miss, the store is listed with `hash` as prefix and the
    /// lexicographically smallest match is fetched once. Returns
    /// `StorageError::NotFound(hash)` when neither lookup finds the blob.
    #[instrument(skip(self), fields(backend = self.store.backend_name()))]
    pub async fn fetch(&self, hash: &str) -> StorageResult<ObjectStream> {
        match self.store.get_stream(hash).await {
            Err(e) if e.is_not_found() => {}
            other => return other,
        }

        let Some(legacy_key) = self.legacy_key(hash).await? else {
            return Err(StorageError::NotFound(hash.to_string()));
        };
        debug!(hash = %hash, key = %legacy_key, "Falling back to legacy blob key");

        match self.store.get_stream(&legacy_key).await {
            // Report the hash, not the legacy key, as missing
            Err(e) if e.is_not_found() => Err(StorageError::NotFound(hash.to_string())),
            other => other,
        }
    }

    /// Stream the blob for `hash` into a new file at `dest`.
    ///
    /// Returns the number of bytes written. A partially written file is left
    /// for the caller to remove.
    #[instrument(skip(self, dest), fields(dest = %dest.as_ref().display()))]
    pub async fn download_to(&self, hash: &str, dest: impl AsRef<Path>) -> StorageResult<u64> {
        let ObjectStream { mut body, .. } = self.fetch(hash).await?;

        let mut file = tokio::fs::File::create(dest.as_ref()).await?;
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;

        Ok(written)
    }

    async fn legacy_key(&self, hash: &str) -> StorageResult<Option<String>> {
        if hash.is_empty() {
            return Ok(None);
        }
        let keys = self.store.list(hash).await?;
        Ok(keys.into_iter().filter(|k| k.as_str() != hash).min())
    }
}
