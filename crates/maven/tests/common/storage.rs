use async_trait::async_trait;
use bytes::Bytes;
use quarry_core::config::WriteConfig;
use quarry_maven::{MetadataCache, MetadataGenerator};
use quarry_storage::backends::memory::{MemoryBackend, OperationCounts};
use quarry_storage::{
    ByteStream, DiskQuota, Entry, ObjectMeta, StorageProvider, StorageResult, StreamingUpload,
    WriteCoordinator,
};
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use tokio::sync::Notify;

/// Memory backend that yields to the scheduler before every listing, so
/// concurrent generators interleave deterministically.
#[derive(Clone, Default)]
pub struct YieldingBackend {
    inner: MemoryBackend,
    pause: Arc<Mutex<Option<Arc<ListPause>>>>,
}

/// Holds one listing after it has read the directory.
#[derive(Default)]
pub struct ListPause {
    pub reached: Notify,
    pub release: Notify,
}

#[allow(dead_code)]
impl YieldingBackend {
    /// Pause the next listing after its read until `release` is notified.
    pub fn pause_next_list(&self) -> Arc<ListPause> {
        let pause = Arc::new(ListPause::default());
        *self.pause.lock().unwrap() = Some(pause.clone());
        pause
    }
}

#[async_trait]
impl StorageProvider for YieldingBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn is_directory(&self, key: &str) -> StorageResult<bool> {
        self.inner.is_directory(key).await
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        self.inner.get_stream(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.inner.put(key, data).await
    }

    async fn open_write(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        self.inner.open_write(key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    async fn list(&self, dir: &str) -> StorageResult<Vec<Entry>> {
        tokio::task::yield_now().await;
        let entries = self.inner.list(dir).await;
        let pause = self.pause.lock().unwrap().take();
        if let Some(pause) = pause {
            pause.reached.notify_one();
            pause.release.notified().await;
        }
        entries
    }

    async fn usage(&self) -> StorageResult<u64> {
        self.inner.usage().await
    }

    fn backend_name(&self) -> &'static str {
        "yielding-memory"
    }
}

/// A generator over an in-memory repository with seeded files.
pub struct TestRepository {
    pub memory: MemoryBackend,
    pub writes: WriteCoordinator,
    pub generator: MetadataGenerator,
}

impl TestRepository {
    pub fn new() -> Self {
        Self::with_backend(YieldingBackend::default())
    }

    pub fn with_backend(backend: YieldingBackend) -> Self {
        let memory = backend.inner.clone();
        let config = WriteConfig {
            lock_retry_delay_ms: 1,
            lock_max_attempts: 100,
        };
        let writes = WriteCoordinator::new(
            Arc::new(backend),
            Arc::new(DiskQuota::unlimited()),
            &config,
        );
        let generator = MetadataGenerator::new(writes.clone(), Arc::new(MetadataCache::new()));
        Self {
            memory,
            writes,
            generator,
        }
    }

    /// Seed a file with a fixed modification time.
    pub async fn seed(&self, key: &str, at: OffsetDateTime) {
        self.writes
            .store_bytes(key, Bytes::from(format!("content of {key}")))
            .await
            .unwrap();
        self.memory.set_last_modified(key, at);
    }

    pub fn counts(&self) -> OperationCounts {
        self.memory.operation_counts()
    }
}

pub fn segments(path: &str) -> Vec<String> {
    path.split('/').map(str::to_string).collect()
}
