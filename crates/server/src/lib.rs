//! HTTP server for the Quarry artifact repository.
//!
//! This crate provides:
//! - Artifact lookup, deploy and delete under `/{repository}/...`
//! - Generated Maven metadata, checksums and `latest` resolution
//! - Remote repository proxying with write-through caching
//! - Directory browsing and repository discovery
//! - Token management and admin endpoints

pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod proxy;
pub mod routes;
pub mod state;

pub use auth::TraceId;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
