//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("path traversal rejected: {0}")]
    PathTraversal(String),

    #[error("invalid artifact coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("invalid quota: {0}")]
    InvalidQuota(String),

    #[error("invalid permissions: {0}")]
    InvalidPermissions(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
