//! Archive mounting for satchel.
//!
//! An archive blob is fetched once, staged on local disk and indexed by
//! entry name. Entries are then streamed, decompressed on the fly, by any
//! number of concurrent readers. [`MountCache`] owns the mounts, deduplicates
//! concurrent loads and evicts mounts that sit idle.

pub mod cache;
pub mod error;
pub mod filename;
pub mod mount;
pub mod stream;

pub use cache::{LoadOutcome, MountCache, MountCacheConfig};
pub use error::{MountError, MountResult};
pub use mount::{ArchiveMount, EntryDescriptor, MountLimits, MountState};
pub use stream::EntryStream;
