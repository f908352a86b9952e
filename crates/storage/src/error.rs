//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    /// Another writer holds the native lock on this key.
    #[error("object is locked by another writer: {0}")]
    Locked(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 error: {0}")]
    S3(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors from coordinated writes.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Lock contention outlasted the retry budget.
    #[error("timed out acquiring write lock for {0}")]
    Timeout(String),

    /// Not enough quota left for the write.
    #[error("disk quota exceeded: {requested} bytes requested, {remaining} bytes remaining")]
    QuotaExceeded { requested: u64, remaining: u64 },

    /// The source stream failed mid-write.
    #[error("source stream failed: {0}")]
    Source(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for coordinated writes.
pub type WriteResult<T> = std::result::Result<T, WriteError>;
