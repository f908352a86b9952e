//! Artifact storage for Quarry.
//!
//! This crate provides:
//! - The hierarchical [`StorageProvider`] contract
//! - Backends: local filesystem, S3-compatible and in-memory
//! - Disk quota accounting
//! - Write coordination with per-key locking and bounded retry

pub mod backends;
pub mod error;
pub mod quota;
pub mod traits;
pub mod write;

pub use backends::{filesystem::FilesystemBackend, memory::MemoryBackend, s3::S3Backend};
pub use error::{StorageError, StorageResult, WriteError, WriteResult};
pub use quota::DiskQuota;
pub use traits::{ByteStream, Entry, ObjectMeta, StorageProvider, StreamingUpload};
pub use write::WriteCoordinator;

use quarry_core::config::StorageConfig;
use std::sync::Arc;

/// Create a storage provider from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn StorageProvider>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
        } => {
            let backend = S3Backend::new(
                bucket,
                endpoint.clone(),
                region.clone(),
                prefix.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                *force_path_style,
            )
            .await?;
            Ok(Arc::new(backend))
        }
    }
}
