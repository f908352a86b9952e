//! Core domain types and shared logic for the Quarry artifact repository.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Repository configuration and request path handling
//! - Artifact coordinates (group/artifact/version)
//! - Version ordering used for "latest" resolution
//! - Access tokens, permission flags and sessions
//! - Disk quota limits

pub mod config;
pub mod error;
pub mod path;
pub mod quota;
pub mod repository;
pub mod token;
pub mod version;

pub use error::{Error, Result};
pub use path::{ArtifactCoordinate, RepositoryPath};
pub use quota::QuotaLimit;
pub use repository::{Repository, RepositorySet};
pub use token::{Permission, Permissions, Session, Token};

/// File name of generated Maven metadata documents.
pub const METADATA_FILE: &str = "maven-metadata.xml";

/// Extensions treated as checksum files when scanning build directories.
pub const IGNORED_CHECKSUM_EXTENSIONS: [&str; 4] = ["md5", "sha1", "sha256", "sha512"];
