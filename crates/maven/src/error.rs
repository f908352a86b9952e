//! Metadata generation errors.

use quarry_storage::{StorageError, WriteError};
use thiserror::Error;

/// Metadata generation errors.
#[derive(Debug, Error)]
pub enum MavenError {
    /// The request does not name a metadata file below an artifact.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The version directory holds no build files.
    #[error("no builds found in {0}")]
    BuildsNotFound(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("failed to serialize metadata: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

impl MavenError {
    pub(crate) fn from_listing(dir: &str, err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => Self::NotFound(dir.to_string()),
            other => Self::Storage(other),
        }
    }
}

/// Result type for metadata operations.
pub type MavenResult<T> = std::result::Result<T, MavenError>;
