//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Upper bound on how long a request may take to produce its response
    /// head. Streaming bodies are not cut off by this timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Responses smaller than this many bytes are never gzip-compressed.
    #[serde(default = "default_compression_min_size")]
    pub compression_min_size: u16,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// SECURITY: When enabled, ensure this endpoint is network-restricted
    /// to authorized Prometheus scraper IPs only at the infrastructure level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_compression_min_size() -> u16 {
    1024
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout_secs(),
            compression_min_size: default_compression_min_size(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    /// Get the request timeout as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to AWS_ACCESS_KEY_ID env var if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to AWS_SECRET_ACCESS_KEY env var if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        secret_access_key: Option<String>,
        /// Force path-style URLs (e.g., `endpoint/bucket/key` instead of `bucket.endpoint/key`).
        /// Required for MinIO and some S3-compatible services.
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                access_key_id,
                secret_access_key,
                ..
            } => match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                (Some(_), Some(_)) | (None, None) => Ok(()),
                _ => Err(
                    "s3 config requires both access_key_id and secret_access_key when either is set"
                        .to_string(),
                ),
            },
            _ => Ok(()),
        }
    }
}

/// Token authentication configuration.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret key shared with the token issuer.
    /// WARNING: Prefer SATCHEL_AUTH__SECRET over storing it in config files.
    #[serde(default)]
    pub secret: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Archive mount cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MountConfig {
    /// Maximum number of entries an archive may declare.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Maximum uncompressed size of any single entry in bytes (0 = unlimited).
    #[serde(default)]
    pub max_entry_size: u64,
    /// Seconds a mount with no open streams may stay idle before eviction.
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
    /// Seconds between eviction sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Directory where archives are staged while mounted.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    /// Upper bound for downloading and staging one archive.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

fn default_max_entries() -> usize {
    crate::DEFAULT_MAX_ENTRIES
}

fn default_idle_ttl_secs() -> u64 {
    crate::DEFAULT_IDLE_TTL_SECS
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./data/staging")
}

fn default_fetch_timeout_secs() -> u64 {
    120
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_entry_size: 0,
            idle_ttl_secs: default_idle_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            staging_dir: default_staging_dir(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl MountConfig {
    /// Get the idle TTL as a Duration.
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    /// Get the sweep interval as a Duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Get the fetch timeout as a Duration.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Validate mount configuration.
    pub fn validate(&self) -> Result<(), String> {
        // tokio::time::interval panics on a zero period
        if self.sweep_interval_secs == 0 {
            return Err("mounts.sweep_interval_secs cannot be 0".to_string());
        }
        if self.fetch_timeout_secs == 0 {
            return Err("mounts.fetch_timeout_secs cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Token authentication configuration (secret is required).
    #[serde(default)]
    pub auth: AuthConfig,
    /// Archive mount cache configuration.
    #[serde(default)]
    pub mounts: MountConfig,
}

impl AppConfig {
    /// Create a test configuration rooted at `root`.
    ///
    /// **For testing only.** Uses filesystem storage and a fixed secret.
    pub fn for_testing(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::Filesystem {
                path: root.join("storage"),
            },
            auth: AuthConfig {
                secret: "test-secret".to_string(),
            },
            mounts: MountConfig {
                staging_dir: root.join("staging"),
                ..MountConfig::default()
            },
        }
    }

    /// Validate the whole configuration, failing fast on unusable settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.auth.secret.is_empty() {
            return Err("auth.secret must be set".to_string());
        }
        self.storage.validate()?;
        self.mounts.validate()
    }
}
