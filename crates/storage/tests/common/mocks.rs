use async_trait::async_trait;
use bytes::Bytes;
use satchel_storage::error::{StorageError, StorageResult};
use satchel_storage::traits::{ObjectMeta, ObjectStore, ObjectStream};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory backend that counts `get_stream` and `list` calls.
#[allow(dead_code)]
#[derive(Default)]
pub struct CountingBackend {
    objects: Mutex<BTreeMap<String, Bytes>>,
    pub gets: AtomicUsize,
    pub lists: AtomicUsize,
}

#[allow(dead_code)]
impl CountingBackend {
    pub fn with_objects(objects: &[(&str, &[u8])]) -> Arc<Self> {
        let backend = Self::default();
        {
            let mut map = backend.objects.lock().unwrap();
            for (key, body) in objects {
                map.insert(key.to_string(), Bytes::copy_from_slice(body));
            }
        }
        Arc::new(backend)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for CountingBackend {
    async fn get_stream(&self, key: &str) -> StorageResult<ObjectStream> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let data = self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok(ObjectStream {
            meta: ObjectMeta {
                size: data.len() as u64,
                ..ObjectMeta::default()
            },
            body: Box::pin(futures::stream::once(async move { Ok(data) })),
        })
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "counting"
    }
}

/// Backend whose reads always fail with an I/O error.
#[allow(dead_code)]
#[derive(Default)]
pub struct FailingBackend {
    pub lists: AtomicUsize,
}

fn broken() -> StorageError {
    StorageError::Io(std::io::Error::other("backend unavailable"))
}

#[async_trait]
impl ObjectStore for FailingBackend {
    async fn get_stream(&self, _key: &str) -> StorageResult<ObjectStream> {
        Err(broken())
    }

    async fn put(&self, _key: &str, _data: Bytes) -> StorageResult<()> {
        Err(broken())
    }

    async fn list(&self, _prefix: &str) -> StorageResult<Vec<String>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        Err(broken())
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }

    async fn health_check(&self) -> StorageResult<()> {
        Err(broken())
    }
}
