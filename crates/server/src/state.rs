//! Application state shared across handlers.

use satchel_core::TokenVerifier;
use satchel_core::config::AppConfig;
use satchel_mount::{MountCache, MountCacheConfig, MountResult};
use satchel_storage::{BlobClient, ObjectStore};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Verifies request tokens against the configured secret.
    pub verifier: Arc<TokenVerifier>,
    /// Plain blob fetching.
    pub blobs: BlobClient,
    /// Mounted archives.
    pub mounts: Arc<MountCache>,
}

impl AppState {
    /// Create state from already-built collaborators.
    pub fn new(config: AppConfig, blobs: BlobClient, mounts: Arc<MountCache>) -> Self {
        let verifier = TokenVerifier::new(config.auth.secret.as_bytes());
        Self {
            config: Arc::new(config),
            verifier: Arc::new(verifier),
            blobs,
            mounts,
        }
    }

    /// Build the blob client and mount cache over `store`.
    pub async fn build(config: AppConfig, store: Arc<dyn ObjectStore>) -> MountResult<Self> {
        let blobs = BlobClient::new(store);
        let mounts = MountCache::new(blobs.clone(), MountCacheConfig::from(&config.mounts)).await?;
        Ok(Self::new(config, blobs, Arc::new(mounts)))
    }
}
