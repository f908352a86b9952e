//! HTTP request handlers.

pub mod admin;
pub mod auth;
pub mod browse;
pub mod common;
pub mod repository;

pub use admin::*;
pub use auth::*;
pub use browse::*;
pub use common::*;
pub use repository::*;
