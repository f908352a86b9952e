//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use time::OffsetDateTime;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Marker embedded in names of in-flight temporary files.
pub const TEMP_MARKER: &str = ".tmp.";

/// Whether a file name belongs to an in-flight write.
pub fn is_temp_name(name: &str) -> bool {
    name.contains(TEMP_MARKER)
}

/// Metadata about a stored file.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    /// File size in bytes.
    pub size: u64,
    /// Last modification time (if available).
    pub last_modified: Option<OffsetDateTime>,
}

/// A direct child of a listed directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    /// File or directory name (not the full key).
    pub name: String,
    pub is_directory: bool,
    /// Size in bytes; zero for directories.
    pub size: u64,
    pub last_modified: Option<OffsetDateTime>,
}

/// Hierarchical file storage keyed by `/`-separated paths.
///
/// Keys are relative (`releases/com/example/lib/1.0/lib-1.0.jar`) and have
/// already been validated against traversal by the caller; backends apply
/// their own checks on top.
#[async_trait]
pub trait StorageProvider: Send + Sync + 'static {
    /// Check if a file exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Check if a directory exists.
    async fn is_directory(&self, key: &str) -> StorageResult<bool>;

    /// Get a file's size and modification time without fetching content.
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta>;

    /// Get a file's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Get a file as a byte stream.
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Put a file atomically, without locking.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Open a streaming write that replaces the file on `finish`.
    ///
    /// Backends with native locks take an exclusive lock on the destination
    /// for the lifetime of the upload and fail with
    /// [`StorageError::Locked`](crate::StorageError::Locked) when another
    /// writer holds it.
    async fn open_write(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>>;

    /// Delete a file.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List the direct children of a directory, sorted by name.
    ///
    /// Returns `NotFound` when the directory does not exist. In-flight
    /// temporary files are never listed.
    async fn list(&self, dir: &str) -> StorageResult<Vec<Entry>>;

    /// Total bytes currently stored.
    async fn usage(&self) -> StorageResult<u64>;

    /// Capacity of the underlying volume, if the backend has one.
    async fn capacity(&self) -> StorageResult<Option<u64>> {
        Ok(None)
    }

    /// Get the name of this storage backend (e.g., "s3", "filesystem").
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// The default implementation returns Ok(()), suitable for backends that
    /// don't require connectivity verification.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Trait for streaming uploads.
#[async_trait]
pub trait StreamingUpload: Send {
    /// Write a chunk of data.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Finish the upload and return the total bytes written.
    async fn finish(self: Box<Self>) -> StorageResult<u64>;

    /// Abort the upload, leaving any previous file untouched.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}
