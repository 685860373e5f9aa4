//! Streams over individual archive entries.

use crate::error::MountError;
use crate::mount::{ArchiveMount, EntryDescriptor, StreamLease};
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use tracing::warn;

pub(crate) type EntryReader = Pin<Box<dyn AsyncRead + Send>>;

/// Decompressed bytes of one archive entry.
///
/// Holds a lease on its mount, released exactly once: when the stream ends,
/// when it yields an error, or when it is dropped unfinished. Read errors and
/// size mismatches destroy the mount.
pub struct EntryStream {
    inner: ReaderStream<EntryReader>,
    lease: Option<StreamLease>,
    entry: EntryDescriptor,
    delivered: u64,
}

impl EntryStream {
    pub(crate) fn new(reader: EntryReader, lease: StreamLease, entry: EntryDescriptor) -> Self {
        Self {
            inner: ReaderStream::new(reader),
            lease: Some(lease),
            entry,
            delivered: 0,
        }
    }

    /// Entry name as requested.
    pub fn name(&self) -> &str {
        &self.entry.name
    }

    /// Declared uncompressed size, which is the exact number of bytes a
    /// successful stream yields.
    pub fn uncompressed_size(&self) -> u64 {
        self.entry.uncompressed_size
    }

    /// The mount this stream reads from, while the stream is unfinished.
    pub fn mount(&self) -> Option<&Arc<ArchiveMount>> {
        self.lease.as_ref().map(StreamLease::mount)
    }

    fn fail(&mut self, err: MountError) -> MountError {
        if let Some(lease) = self.lease.take() {
            warn!(
                hash = %lease.mount().hash(),
                entry = %self.entry.name,
                error = %err,
                "Archive entry read failed, destroying mount"
            );
            lease.mount().destroy();
        }
        err
    }

    fn size_mismatch(&self) -> MountError {
        MountError::SizeMismatch {
            name: self.entry.name.clone(),
            expected: self.entry.uncompressed_size,
            actual: self.delivered,
        }
    }
}

impl Stream for EntryStream {
    type Item = Result<Bytes, MountError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.lease.is_none() {
            return Poll::Ready(None);
        }

        match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
            Some(Ok(chunk)) => {
                this.delivered += chunk.len() as u64;
                if this.delivered > this.entry.uncompressed_size {
                    let err = this.size_mismatch();
                    return Poll::Ready(Some(Err(this.fail(err))));
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(e)) => Poll::Ready(Some(Err(this.fail(MountError::Io(e))))),
            None => {
                if this.delivered != this.entry.uncompressed_size {
                    let err = this.size_mismatch();
                    return Poll::Ready(Some(Err(this.fail(err))));
                }
                this.lease.take();
                Poll::Ready(None)
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.lease.is_none() {
            return (0, Some(0));
        }
        self.inner.size_hint()
    }
}

impl std::fmt::Debug for EntryStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryStream")
            .field("entry", &self.entry.name)
            .field("size", &self.entry.uncompressed_size)
            .field("delivered", &self.delivered)
            .field("finished", &self.lease.is_none())
            .finish()
    }
}
