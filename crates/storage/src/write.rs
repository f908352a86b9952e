//! Coordinated writes: per-key serialization, bounded lock retry and quota
//! accounting.
//!
//! A write first claims the key in an in-process registry, then asks the
//! backend for its native exclusive lock. Contention at either tier is retried
//! with a fixed delay up to a fixed number of attempts.

use crate::error::{StorageError, WriteError, WriteResult};
use crate::quota::DiskQuota;
use crate::traits::{ByteStream, StorageProvider, StreamingUpload};
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use futures::StreamExt;
use quarry_core::config::WriteConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// In-process registry of keys with a write in flight.
#[derive(Clone, Default)]
struct LockRegistry {
    held: Arc<DashMap<String, ()>>,
}

impl LockRegistry {
    fn try_acquire(&self, key: &str) -> Option<RegistryGuard> {
        match self.held.entry(key.to_string()) {
            MapEntry::Occupied(_) => None,
            MapEntry::Vacant(vacant) => {
                vacant.insert(());
                Some(RegistryGuard {
                    held: self.held.clone(),
                    key: key.to_string(),
                })
            }
        }
    }
}

/// Releases the registry entry when dropped.
struct RegistryGuard {
    held: Arc<DashMap<String, ()>>,
    key: String,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        self.held.remove(&self.key);
    }
}

/// Serializes writes per key and charges them against a [`DiskQuota`].
#[derive(Clone)]
pub struct WriteCoordinator {
    storage: Arc<dyn StorageProvider>,
    quota: Arc<DiskQuota>,
    registry: LockRegistry,
    retry_delay: Duration,
    max_attempts: u32,
}

impl WriteCoordinator {
    pub fn new(
        storage: Arc<dyn StorageProvider>,
        quota: Arc<DiskQuota>,
        config: &WriteConfig,
    ) -> Self {
        Self {
            storage,
            quota,
            registry: LockRegistry::default(),
            retry_delay: config.lock_retry_delay(),
            max_attempts: config.lock_max_attempts.max(1),
        }
    }

    pub fn storage(&self) -> &Arc<dyn StorageProvider> {
        &self.storage
    }

    pub fn quota(&self) -> &Arc<DiskQuota> {
        &self.quota
    }

    /// Stream `body` into `key`, replacing any existing file.
    ///
    /// Returns the number of bytes written. On any failure the partial write
    /// is discarded and its quota reservation released.
    pub async fn store(
        &self,
        key: &str,
        mut body: ByteStream,
        size_hint: Option<u64>,
    ) -> WriteResult<u64> {
        if let Some(size) = size_hint
            && !self.quota.can_hold(size)
        {
            return Err(self.quota_exceeded(size));
        }

        let (_guard, mut upload) = self.acquire(key).await?;

        let previous = match self.storage.head(key).await {
            Ok(meta) => meta.size,
            Err(StorageError::NotFound(_)) => 0,
            Err(e) => {
                discard(key, upload).await;
                return Err(e.into());
            }
        };

        let mut reserved = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    self.rollback(key, upload, reserved).await;
                    return Err(WriteError::Source(e.to_string()));
                }
            };

            let len = chunk.len() as u64;
            if !self.quota.allocate(len) {
                let error = self.quota_exceeded(len);
                self.rollback(key, upload, reserved).await;
                return Err(error);
            }
            reserved += len;

            if let Err(e) = upload.write(chunk).await {
                self.rollback(key, upload, reserved).await;
                return Err(e.into());
            }
        }

        let written = match upload.finish().await {
            Ok(written) => written,
            Err(e) => {
                self.quota.release(reserved);
                return Err(e.into());
            }
        };

        // The replaced file no longer occupies space.
        self.quota.release(previous);
        debug!(key, bytes = written, replaced = previous, "write committed");
        Ok(written)
    }

    /// Store an in-memory buffer.
    pub async fn store_bytes(&self, key: &str, data: Bytes) -> WriteResult<u64> {
        let size = data.len() as u64;
        let body: ByteStream = Box::pin(futures::stream::once(async move { Ok(data) }));
        self.store(key, body, Some(size)).await
    }

    /// Delete a file and return its size to the quota.
    pub async fn remove(&self, key: &str) -> WriteResult<u64> {
        let (_guard, upload) = self.acquire(key).await?;
        // Dropping the upload releases the native lock before deletion.
        discard(key, upload).await;

        let size = self.storage.head(key).await?.size;
        self.storage.delete(key).await?;
        self.quota.release(size);
        debug!(key, bytes = size, "file removed");
        Ok(size)
    }

    async fn acquire(&self, key: &str) -> WriteResult<(RegistryGuard, Box<dyn StreamingUpload>)> {
        for attempt in 1..=self.max_attempts {
            if let Some(guard) = self.registry.try_acquire(key) {
                match self.storage.open_write(key).await {
                    Ok(upload) => return Ok((guard, upload)),
                    Err(StorageError::Locked(_)) => {
                        debug!(key, attempt, "native lock held by another writer");
                    }
                    Err(e) => return Err(e.into()),
                }
            } else {
                debug!(key, attempt, "write already in flight");
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        warn!(
            key,
            attempts = self.max_attempts,
            "gave up acquiring write lock"
        );
        Err(WriteError::Timeout(key.to_string()))
    }

    async fn rollback(&self, key: &str, upload: Box<dyn StreamingUpload>, reserved: u64) {
        discard(key, upload).await;
        self.quota.release(reserved);
    }

    fn quota_exceeded(&self, requested: u64) -> WriteError {
        warn!(
            requested,
            remaining = self.quota.remaining(),
            "disk quota exceeded"
        );
        WriteError::QuotaExceeded {
            requested,
            remaining: self.quota.remaining(),
        }
    }
}

async fn discard(key: &str, upload: Box<dyn StreamingUpload>) {
    if let Err(e) = upload.abort().await {
        warn!(key, error = %e, "failed to abort upload");
    }
}
