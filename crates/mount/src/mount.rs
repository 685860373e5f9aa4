//! A single mounted archive.

use crate::error::{MountError, MountResult};
use crate::filename::{decode_entry_name, is_directory_marker};
use crate::stream::{EntryReader, EntryStream};
use satchel_core::config::MountConfig;
use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncSeekExt, BufReader};
use tracing::{debug, instrument, warn};
use zip::{CompressionMethod, ZipArchive};

/// Per-archive safety limits applied while loading.
#[derive(Clone, Copy, Debug)]
pub struct MountLimits {
    /// Maximum number of entries the archive may declare.
    pub max_entries: usize,
    /// Maximum uncompressed size of a single entry (0 = unlimited).
    pub max_entry_size: u64,
}

impl Default for MountLimits {
    fn default() -> Self {
        Self {
            max_entries: satchel_core::DEFAULT_MAX_ENTRIES,
            max_entry_size: 0,
        }
    }
}

impl From<&MountConfig> for MountLimits {
    fn from(config: &MountConfig) -> Self {
        Self {
            max_entries: config.max_entries,
            max_entry_size: config.max_entry_size,
        }
    }
}

/// Index record for one archive entry.
#[derive(Clone, Debug)]
pub struct EntryDescriptor {
    /// Decoded name the entry is looked up by.
    pub name: String,
    /// Position in the archive's central directory.
    pub index: usize,
    pub compression: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MountState {
    Loading,
    Active,
    Destroyed,
}

#[derive(Debug)]
struct Lifecycle {
    state: MountState,
    active_streams: usize,
    last_accessed: Instant,
}

/// One archive staged on local disk, indexed by entry name.
///
/// Entry streams lease the mount: a lease can only be taken while the mount
/// is Active, and the count of outstanding leases keeps idle eviction away.
/// The lifecycle lock is never held across I/O or an await point.
pub struct ArchiveMount {
    hash: String,
    path: PathBuf,
    entries: HashMap<String, EntryDescriptor>,
    archive: Mutex<Option<ZipArchive<std::fs::File>>>,
    lifecycle: Mutex<Lifecycle>,
}

impl std::fmt::Debug for ArchiveMount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lifecycle = self.lifecycle();
        f.debug_struct("ArchiveMount")
            .field("hash", &self.hash)
            .field("path", &self.path)
            .field("entries", &self.entries.len())
            .field("state", &lifecycle.state)
            .field("active_streams", &lifecycle.active_streams)
            .finish()
    }
}

impl ArchiveMount {
    /// Index the archive staged at `path`.
    ///
    /// Blocking; run it on the blocking pool. The declared entry count is
    /// checked before any entry is read. Directory markers are skipped,
    /// legacy-encoded names are decoded, and an entry whose legacy name does
    /// not decode is dropped. The first entry over `max_entry_size` fails the
    /// whole load. A later entry with the same decoded name replaces an
    /// earlier one.
    #[instrument(skip(path, limits), fields(path = %path.as_ref().display()))]
    pub fn load(hash: &str, path: impl AsRef<Path>, limits: &MountLimits) -> MountResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut archive = ZipArchive::new(std::fs::File::open(&path)?)?;

        let count = archive.len();
        if count > limits.max_entries {
            return Err(MountError::TooManyEntries {
                count,
                max: limits.max_entries,
            });
        }

        let mut entries = HashMap::with_capacity(count);
        for index in 0..count {
            let entry = archive.by_index_raw(index)?;
            let raw_name = entry.name();
            if is_directory_marker(raw_name) {
                continue;
            }
            let Some(name) = decode_entry_name(raw_name) else {
                debug!(hash = %hash, raw_name = %raw_name, "Dropping entry with undecodable legacy name");
                continue;
            };

            let size = entry.size();
            if limits.max_entry_size > 0 && size > limits.max_entry_size {
                return Err(MountError::EntryTooLarge {
                    name,
                    size,
                    max: limits.max_entry_size,
                });
            }

            let descriptor = EntryDescriptor {
                name: name.clone(),
                index,
                compression: entry.compression(),
                compressed_size: entry.compressed_size(),
                uncompressed_size: size,
            };
            if entries.insert(name, descriptor).is_some() {
                debug!(hash = %hash, index, "Duplicate entry name, keeping the later entry");
            }
        }

        let mount = Self {
            hash: hash.to_string(),
            path,
            entries,
            archive: Mutex::new(Some(archive)),
            lifecycle: Mutex::new(Lifecycle {
                state: MountState::Loading,
                active_streams: 0,
                last_accessed: Instant::now(),
            }),
        };
        mount.lifecycle().state = MountState::Active;
        debug!(hash = %hash, entries = mount.entries.len(), "Archive indexed");
        Ok(mount)
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Path of the staged archive on local disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> MountState {
        self.lifecycle().state
    }

    pub fn is_active(&self) -> bool {
        self.state() == MountState::Active
    }

    /// Number of entry streams currently open against this mount.
    pub fn active_streams(&self) -> usize {
        self.lifecycle().active_streams
    }

    pub fn last_accessed(&self) -> Instant {
        self.lifecycle().last_accessed
    }

    pub fn entry(&self, name: &str) -> Option<&EntryDescriptor> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Refresh the access time. Returns false if the mount is not Active.
    pub fn touch(&self) -> bool {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state != MountState::Active {
            return false;
        }
        lifecycle.last_accessed = Instant::now();
        true
    }

    /// Destroy the mount if nothing streams from it and it has been idle for
    /// at least `ttl` at `now`. An already destroyed mount with no streams
    /// also counts as retired. The check and the transition happen under
    /// one lock, so no lease can slip in between.
    pub fn retire_if_idle(&self, now: Instant, ttl: Duration) -> bool {
        let retired = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.active_streams > 0 {
                return false;
            }
            match lifecycle.state {
                MountState::Destroyed => true,
                MountState::Active
                    if now.saturating_duration_since(lifecycle.last_accessed) >= ttl =>
                {
                    lifecycle.state = MountState::Destroyed;
                    true
                }
                _ => false,
            }
        };
        if retired {
            self.release_handle();
        }
        retired
    }

    /// Mark the mount destroyed and close its archive handle.
    ///
    /// Idempotent. Returns true if this call performed the transition.
    /// Streams already open keep draining from their own file handles.
    pub fn destroy(&self) -> bool {
        let transitioned = {
            let mut lifecycle = self.lifecycle();
            let was = lifecycle.state;
            lifecycle.state = MountState::Destroyed;
            was != MountState::Destroyed
        };
        self.release_handle();
        if transitioned {
            debug!(hash = %self.hash, "Archive mount destroyed");
        }
        transitioned
    }

    fn release_handle(&self) {
        self.archive
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
    }

    /// Take a stream lease. Fails with `NotActive` unless the mount is Active.
    pub(crate) fn acquire(self: &Arc<Self>) -> MountResult<StreamLease> {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state != MountState::Active {
            return Err(MountError::NotActive(self.hash.clone()));
        }
        lifecycle.active_streams += 1;
        lifecycle.last_accessed = Instant::now();
        Ok(StreamLease {
            mount: Arc::clone(self),
        })
    }

    fn release(&self) {
        let mut lifecycle = self.lifecycle();
        debug_assert!(lifecycle.active_streams > 0, "lease released twice");
        lifecycle.active_streams = lifecycle.active_streams.saturating_sub(1);
        lifecycle.last_accessed = Instant::now();
    }

    /// Offset of the entry's data within the staged file, read through the
    /// shared archive handle.
    fn data_start(&self, index: usize) -> MountResult<u64> {
        let mut guard = self.archive.lock().unwrap_or_else(|p| p.into_inner());
        let archive = guard
            .as_mut()
            .ok_or_else(|| MountError::NotActive(self.hash.clone()))?;
        let entry = archive.by_index_raw(index)?;
        Ok(entry.data_start())
    }

    /// Open a decompressing stream over one entry.
    ///
    /// The returned stream holds a lease on the mount until it ends, fails or
    /// is dropped. A failure to locate or open the entry's data destroys the
    /// mount, since the staged copy can no longer be trusted.
    #[instrument(skip(self), fields(hash = %self.hash))]
    pub async fn open_entry_stream(self: &Arc<Self>, name: &str) -> MountResult<EntryStream> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| MountError::EntryNotFound(name.to_string()))?
            .clone();

        if !matches!(
            entry.compression,
            CompressionMethod::Stored | CompressionMethod::Deflated
        ) {
            return Err(MountError::UnsupportedCompression {
                name: entry.name,
                method: format!("{:?}", entry.compression),
            });
        }

        let lease = self.acquire()?;

        match self.open_reader(&entry).await {
            Ok(reader) => Ok(EntryStream::new(reader, lease, entry)),
            Err(MountError::NotActive(hash)) => Err(MountError::NotActive(hash)),
            Err(e) => {
                warn!(hash = %self.hash, entry = %entry.name, error = %e, "Failed to open archive entry");
                self.destroy();
                Err(e)
            }
        }
    }

    async fn open_reader(self: &Arc<Self>, entry: &EntryDescriptor) -> MountResult<EntryReader> {
        let mount = Arc::clone(self);
        let index = entry.index;
        let offset = tokio::task::spawn_blocking(move || mount.data_start(index)).await??;

        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let raw = BufReader::new(file.take(entry.compressed_size));

        let reader: EntryReader = match entry.compression {
            CompressionMethod::Deflated => {
                Box::pin(async_compression::tokio::bufread::DeflateDecoder::new(raw))
            }
            _ => Box::pin(raw),
        };
        Ok(reader)
    }
}

/// Keeps a mount's stream count raised for as long as it lives.
pub(crate) struct StreamLease {
    mount: Arc<ArchiveMount>,
}

impl StreamLease {
    pub(crate) fn mount(&self) -> &Arc<ArchiveMount> {
        &self.mount
    }
}

impl Drop for StreamLease {
    fn drop(&mut self) {
        self.mount.release();
    }
}
