//! Maven metadata for Quarry.
//!
//! Documents are synthesized from the stored directory layout: an artifact
//! directory lists its version directories, a version directory lists its
//! build files. Generated documents are cached until a deploy under the same
//! artifact invalidates them.

pub mod build;
pub mod cache;
pub mod checksum;
pub mod document;
pub mod error;
pub mod generator;

pub use cache::{CacheStats, MetadataCache};
pub use checksum::ChecksumAlgorithm;
pub use document::MetadataDocument;
pub use error::{MavenError, MavenResult};
pub use generator::MetadataGenerator;
