use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use satchel_mount::{MountCache, MountCacheConfig, MountLimits};
use satchel_storage::{
    BlobClient, FilesystemBackend, ObjectMeta, ObjectStore, ObjectStream, StorageResult,
};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Build an archive in memory. Names ending in '/' become directory entries.
#[allow(dead_code)]
pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    build_zip_with(entries, CompressionMethod::Deflated)
}

#[allow(dead_code)]
pub fn build_zip_with(entries: &[(&str, &[u8])], method: CompressionMethod) -> Vec<u8> {
    let options = SimpleFileOptions::default().compression_method(method);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in entries {
        if let Some(dir) = name.strip_suffix('/') {
            writer.add_directory(dir, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(body).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

/// Write an archive to `dir/name` and return its path.
#[allow(dead_code)]
pub fn write_zip(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, build_zip(entries)).unwrap();
    path
}

/// A mount cache over a filesystem store, both rooted in one temp dir.
#[allow(dead_code)]
pub struct CacheFixture {
    pub dir: TempDir,
    pub store: Arc<FilesystemBackend>,
    pub cache: Arc<MountCache>,
}

#[allow(dead_code)]
impl CacheFixture {
    pub async fn new() -> Self {
        Self::with_limits(MountLimits::default(), Duration::from_secs(300)).await
    }

    pub async fn with_limits(limits: MountLimits, idle_ttl: Duration) -> Self {
        Self::build(limits, idle_ttl, Duration::from_secs(10), None).await
    }

    /// A cache that reads archives from `backend` instead of the fixture's
    /// own filesystem store.
    pub async fn reading_from(backend: Arc<dyn ObjectStore>, fetch_timeout: Duration) -> Self {
        Self::build(
            MountLimits::default(),
            Duration::from_secs(300),
            fetch_timeout,
            Some(backend),
        )
        .await
    }

    async fn build(
        limits: MountLimits,
        idle_ttl: Duration,
        fetch_timeout: Duration,
        backend: Option<Arc<dyn ObjectStore>>,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FilesystemBackend::new(dir.path().join("storage")).await.unwrap());
        let config = MountCacheConfig {
            limits,
            idle_ttl,
            staging_dir: dir.path().join("staging"),
            fetch_timeout,
        };
        let backend = backend.unwrap_or_else(|| store.clone() as Arc<dyn ObjectStore>);
        let cache = MountCache::new(BlobClient::new(backend), config)
            .await
            .unwrap();
        Self {
            dir,
            store,
            cache: Arc::new(cache),
        }
    }

    pub async fn put(&self, key: &str, data: Vec<u8>) {
        self.store.put(key, Bytes::from(data)).await.unwrap();
    }

    pub fn staged_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.dir.path().join("staging"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }
}

/// Drain a stream of byte chunks into a buffer, failing on the first error.
#[allow(dead_code)]
pub async fn read_to_end<S, E>(mut stream: S) -> Result<Vec<u8>, E>
where
    S: futures::Stream<Item = Result<Bytes, E>> + Unpin,
{
    use futures::StreamExt;
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out)
}

/// Store whose objects deliver one chunk and then never finish.
#[allow(dead_code)]
pub struct StallingStore;

#[async_trait]
impl ObjectStore for StallingStore {
    async fn get_stream(&self, _key: &str) -> StorageResult<ObjectStream> {
        let first: StorageResult<Bytes> = Ok(Bytes::from_static(b"PK\x03\x04"));
        let body = futures::stream::once(async move { first }).chain(futures::stream::pending());
        Ok(ObjectStream {
            meta: ObjectMeta {
                size: 1 << 20,
                ..ObjectMeta::default()
            },
            body: Box::pin(body),
        })
    }

    async fn put(&self, _key: &str, _data: Bytes) -> StorageResult<()> {
        Ok(())
    }

    async fn list(&self, _prefix: &str) -> StorageResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn backend_name(&self) -> &'static str {
        "stalling"
    }
}
