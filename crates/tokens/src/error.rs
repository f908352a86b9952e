//! Token store error types.

use thiserror::Error;

/// Token store operation errors.
#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("token not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row no longer parses into a token.
    #[error("corrupt token record {alias}: {reason}")]
    Corrupt { alias: String, reason: String },

    #[error("invalid token: {0}")]
    Invalid(#[from] quarry_core::Error),
}

/// Result type for token store operations.
pub type TokenStoreResult<T> = std::result::Result<T, TokenStoreError>;
