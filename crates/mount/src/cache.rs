//! Process-wide registry of mounted archives.

use crate::error::{MountError, MountResult};
use crate::mount::{ArchiveMount, MountLimits};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use satchel_core::config::MountConfig;
use satchel_storage::BlobClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Settings for a [`MountCache`].
#[derive(Clone, Debug)]
pub struct MountCacheConfig {
    pub limits: MountLimits,
    /// How long a mount without streams may stay unused.
    pub idle_ttl: Duration,
    /// Where fetched archives are staged.
    pub staging_dir: PathBuf,
    /// Bound on downloading and staging one archive.
    pub fetch_timeout: Duration,
}

impl From<&MountConfig> for MountCacheConfig {
    fn from(config: &MountConfig) -> Self {
        Self {
            limits: MountLimits::from(config),
            idle_ttl: config.idle_ttl(),
            staging_dir: config.staging_dir.clone(),
            fetch_timeout: config.fetch_timeout(),
        }
    }
}

/// Outcome of a load, for callers that record metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// An Active mount was already registered.
    Hit,
    /// This call's candidate was registered.
    Loaded,
    /// Another concurrent load won; this call's candidate was discarded.
    Raced,
}

impl LoadOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Loaded => "loaded",
            Self::Raced => "raced",
        }
    }
}

/// Registry mapping archive hashes to mounts.
///
/// Loads are not serialized: concurrent `get` calls for an unseen hash may
/// each fetch and index the archive, after which exactly one candidate is
/// registered and the rest are destroyed. No lock is held across a fetch.
pub struct MountCache {
    mounts: DashMap<String, Arc<ArchiveMount>>,
    blobs: BlobClient,
    config: MountCacheConfig,
    evictions: AtomicU64,
}

impl std::fmt::Debug for MountCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountCache")
            .field("mounts", &self.mounts.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn remove_staged(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "Failed to remove staged archive");
    }
}

/// A staging file that is removed when dropped unless it was kept.
///
/// Loads own one from before the download starts, so a load abandoned at
/// any await point (client disconnect, request timeout) removes its file.
struct StagedArchive {
    path: PathBuf,
    keep: bool,
}

impl StagedArchive {
    fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(format!("{}.zip", Uuid::new_v4())),
            keep: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Hand the file over to the registered mount.
    fn keep(mut self) {
        self.keep = true;
    }
}

impl Drop for StagedArchive {
    fn drop(&mut self) {
        if !self.keep {
            remove_staged(&self.path);
        }
    }
}

impl MountCache {
    /// Create a cache, creating the staging directory if needed.
    pub async fn new(blobs: BlobClient, config: MountCacheConfig) -> MountResult<Self> {
        tokio::fs::create_dir_all(&config.staging_dir).await?;
        Ok(Self {
            mounts: DashMap::new(),
            blobs,
            config,
            evictions: AtomicU64::new(0),
        })
    }

    /// Number of registered mounts.
    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.mounts.contains_key(hash)
    }

    /// Entry streams open across all registered mounts.
    pub fn active_streams(&self) -> usize {
        self.mounts
            .iter()
            .map(|entry| entry.value().active_streams())
            .sum()
    }

    /// Mounts evicted by sweeps since the cache was created.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Return the Active mount for `hash`, loading it if needed.
    pub async fn get(&self, hash: &str) -> MountResult<Arc<ArchiveMount>> {
        self.get_with_outcome(hash).await.map(|(mount, _)| mount)
    }

    /// Like [`get`](Self::get), also reporting how the mount was obtained.
    #[instrument(skip(self))]
    pub async fn get_with_outcome(
        &self,
        hash: &str,
    ) -> MountResult<(Arc<ArchiveMount>, LoadOutcome)> {
        if let Some(mount) = self.lookup(hash) {
            return Ok((mount, LoadOutcome::Hit));
        }

        let (mount, staged) = self.load_candidate(hash).await?;
        let candidate = Arc::new(mount);
        // No await from here on: the slot is settled and the staging file
        // handed over or removed in one step.
        let (winner, displaced) = self.install(hash, Arc::clone(&candidate));

        let outcome = if Arc::ptr_eq(&winner, &candidate) {
            staged.keep();
            info!(hash = %hash, entries = winner.len(), "Archive mounted");
            LoadOutcome::Loaded
        } else {
            debug!(hash = %hash, "Concurrent mount won, discarding candidate");
            LoadOutcome::Raced
        };

        if let Some(displaced) = displaced {
            displaced.destroy();
            if !Arc::ptr_eq(&displaced, &candidate) {
                remove_staged(displaced.path());
            }
        }

        Ok((winner, outcome))
    }

    fn lookup(&self, hash: &str) -> Option<Arc<ArchiveMount>> {
        let mount = self.mounts.get(hash).map(|entry| Arc::clone(entry.value()))?;
        mount.touch().then_some(mount)
    }

    /// Register `candidate` unless an Active mount already holds the slot.
    /// Returns the registered mount and whichever mount lost its place.
    fn install(
        &self,
        hash: &str,
        candidate: Arc<ArchiveMount>,
    ) -> (Arc<ArchiveMount>, Option<Arc<ArchiveMount>>) {
        match self.mounts.entry(hash.to_string()) {
            Entry::Occupied(mut slot) => {
                if slot.get().touch() {
                    (Arc::clone(slot.get()), Some(candidate))
                } else {
                    let stale = slot.insert(Arc::clone(&candidate));
                    (candidate, Some(stale))
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&candidate));
                (candidate, None)
            }
        }
    }

    /// Fetch the archive into a fresh staging file and index it. The staging
    /// file goes away if anything fails or the caller stops waiting.
    async fn load_candidate(&self, hash: &str) -> MountResult<(ArchiveMount, StagedArchive)> {
        let staged = StagedArchive::new(&self.config.staging_dir);

        match self.fetch_and_load(hash, staged.path()).await {
            Ok(mount) => Ok((mount, staged)),
            Err(e) => {
                if e.is_not_found() {
                    debug!(hash = %hash, "Archive not found in store");
                } else {
                    warn!(hash = %hash, error = %e, "Failed to mount archive");
                }
                Err(e)
            }
        }
    }

    async fn fetch_and_load(&self, hash: &str, staged: &Path) -> MountResult<ArchiveMount> {
        let timeout = self.config.fetch_timeout;
        let size = tokio::time::timeout(timeout, self.blobs.download_to(hash, staged))
            .await
            .map_err(|_| MountError::FetchTimeout(timeout))??;
        debug!(hash = %hash, size, path = %staged.display(), "Archive staged");

        let hash = hash.to_string();
        let path = staged.to_path_buf();
        let limits = self.config.limits;
        tokio::task::spawn_blocking(move || ArchiveMount::load(&hash, path, &limits)).await?
    }

    /// Evict mounts idle for at least the TTL with no open streams.
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Instant::now()).await
    }

    /// [`sweep`](Self::sweep) against an explicit clock reading.
    pub async fn sweep_at(&self, now: Instant) -> usize {
        let ttl = self.config.idle_ttl;

        let candidates: Vec<String> = self
            .mounts
            .iter()
            .filter(|entry| {
                let mount = entry.value();
                mount.active_streams() == 0
                    && (!mount.is_active()
                        || now.saturating_duration_since(mount.last_accessed()) >= ttl)
            })
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = Vec::new();
        for hash in candidates {
            // Re-checked under the shard lock; a touch or lease since the
            // scan keeps the mount.
            if let Some((_, mount)) = self
                .mounts
                .remove_if(&hash, |_, mount| mount.retire_if_idle(now, ttl))
            {
                evicted.push(mount);
            }
        }

        for mount in &evicted {
            remove_staged(mount.path());
            debug!(hash = %mount.hash(), "Evicted idle archive mount");
        }
        self.evictions
            .fetch_add(evicted.len() as u64, Ordering::Relaxed);
        evicted.len()
    }

    /// Destroy every mount and remove its staged file. Synchronous so it can
    /// run from a panic hook; never fails.
    pub fn shutdown(&self) -> usize {
        let hashes: Vec<String> = self.mounts.iter().map(|e| e.key().clone()).collect();
        let mut destroyed = 0;
        for hash in hashes {
            let Some((_, mount)) = self.mounts.remove(&hash) else {
                continue;
            };
            mount.destroy();
            remove_staged(mount.path());
            destroyed += 1;
        }
        destroyed
    }

    /// [`shutdown`](Self::shutdown) on a helper thread, giving up after
    /// `timeout`. Returns `None` if the registry stayed locked, which happens
    /// when the caller is a panic hook on a thread holding a registry shard.
    pub fn shutdown_within(self: &Arc<Self>, timeout: Duration) -> Option<usize> {
        let (tx, rx) = std::sync::mpsc::channel();
        let cache = Arc::clone(self);
        std::thread::spawn(move || {
            let _ = tx.send(cache.shutdown());
        });
        rx.recv_timeout(timeout).ok()
    }

    /// Run [`sweep`](Self::sweep) every `interval` until the task is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let evicted = self.sweep().await;
                if evicted > 0 {
                    info!(evicted, remaining = self.len(), "Mount sweep evicted idle archives");
                }
            }
        })
    }
}
