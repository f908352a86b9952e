//! In-memory storage backend.
//!
//! Used by tests and ephemeral deployments. Directories are implicit: a key
//! `a/b/c` makes `a` and `a/b` directories. Open writes hold a per-key lock
//! that mimics the native lock of the filesystem backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, Entry, ObjectMeta, StorageProvider, StreamingUpload};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use time::OffsetDateTime;

#[derive(Clone, Debug)]
struct StoredObject {
    data: Bytes,
    last_modified: OffsetDateTime,
}

#[derive(Default)]
struct Inner {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    locked: Mutex<HashSet<String>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    lists: AtomicUsize,
}

impl Inner {
    fn objects(&self) -> MutexGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn locked(&self) -> MutexGuard<'_, HashSet<String>> {
        self.locked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn store(&self, key: &str, data: Bytes) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.objects().insert(
            key.to_string(),
            StoredObject {
                data,
                last_modified: OffsetDateTime::now_utc(),
            },
        );
    }
}

/// In-memory storage.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

/// Operation counters, for asserting that cached paths skip storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OperationCounts {
    pub reads: usize,
    pub writes: usize,
    pub lists: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of operation counters.
    pub fn operation_counts(&self) -> OperationCounts {
        OperationCounts {
            reads: self.inner.reads.load(Ordering::Relaxed),
            writes: self.inner.writes.load(Ordering::Relaxed),
            lists: self.inner.lists.load(Ordering::Relaxed),
        }
    }

    /// Set a file's modification time.
    pub fn set_last_modified(&self, key: &str, at: OffsetDateTime) {
        if let Some(object) = self.inner.objects().get_mut(key) {
            object.last_modified = at;
        }
    }

    fn validate_key(key: &str) -> StorageResult<()> {
        if key.starts_with('/') || key.split('/').any(|s| s == ".." || s == ".") {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }
        Ok(())
    }

    fn dir_prefix(dir: &str) -> String {
        let dir = dir.trim_end_matches('/');
        if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        }
    }
}

#[async_trait]
impl StorageProvider for MemoryBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Self::validate_key(key)?;
        self.inner.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.inner.objects().contains_key(key))
    }

    async fn is_directory(&self, key: &str) -> StorageResult<bool> {
        Self::validate_key(key)?;
        self.inner.reads.fetch_add(1, Ordering::Relaxed);
        let prefix = Self::dir_prefix(key);
        Ok(self
            .inner
            .objects()
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(k, _)| k.starts_with(&prefix)))
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        Self::validate_key(key)?;
        self.inner.reads.fetch_add(1, Ordering::Relaxed);
        self.inner
            .objects()
            .get(key)
            .map(|object| ObjectMeta {
                size: object.data.len() as u64,
                last_modified: Some(object.last_modified),
            })
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        Self::validate_key(key)?;
        self.inner.reads.fetch_add(1, Ordering::Relaxed);
        self.inner
            .objects()
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let data = self.get(key).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(data) })))
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        Self::validate_key(key)?;
        self.inner.store(key, data);
        Ok(())
    }

    async fn open_write(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        Self::validate_key(key)?;
        if !self.inner.locked().insert(key.to_string()) {
            return Err(StorageError::Locked(key.to_string()));
        }
        Ok(Box::new(MemoryUpload {
            inner: self.inner.clone(),
            key: key.to_string(),
            buffer: BytesMut::new(),
        }))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        Self::validate_key(key)?;
        self.inner.writes.fetch_add(1, Ordering::Relaxed);
        self.inner
            .objects()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn list(&self, dir: &str) -> StorageResult<Vec<Entry>> {
        Self::validate_key(dir)?;
        self.inner.lists.fetch_add(1, Ordering::Relaxed);
        let prefix = Self::dir_prefix(dir);

        let objects = self.inner.objects();
        let mut entries: BTreeMap<String, Entry> = BTreeMap::new();
        for (key, object) in objects.range(prefix.clone()..) {
            let Some(rest) = key.strip_prefix(&prefix) else {
                break;
            };
            match rest.split_once('/') {
                Some((child, _)) => {
                    let entry = entries.entry(child.to_string()).or_insert_with(|| Entry {
                        name: child.to_string(),
                        is_directory: true,
                        size: 0,
                        last_modified: None,
                    });
                    entry.last_modified = entry.last_modified.max(Some(object.last_modified));
                }
                None => {
                    entries.insert(
                        rest.to_string(),
                        Entry {
                            name: rest.to_string(),
                            is_directory: false,
                            size: object.data.len() as u64,
                            last_modified: Some(object.last_modified),
                        },
                    );
                }
            }
        }

        if entries.is_empty() && !prefix.is_empty() {
            return Err(StorageError::NotFound(dir.to_string()));
        }
        Ok(entries.into_values().collect())
    }

    async fn usage(&self) -> StorageResult<u64> {
        Ok(self
            .inner
            .objects()
            .values()
            .map(|object| object.data.len() as u64)
            .sum())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryUpload {
    inner: Arc<Inner>,
    key: String,
    buffer: BytesMut,
}

#[async_trait]
impl StreamingUpload for MemoryUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.buffer.extend_from_slice(&data);
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<u64> {
        let data = std::mem::take(&mut self.buffer).freeze();
        let len = data.len() as u64;
        self.inner.store(&self.key, data);
        Ok(len)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}

impl Drop for MemoryUpload {
    fn drop(&mut self) {
        self.inner.locked().remove(&self.key);
    }
}
