//! Access token persistence for Quarry.
//!
//! Tokens are stored by alias with their scope path, permission flags and
//! the SHA-256 hash of their secret. Plaintext secrets are never stored.

pub mod error;
pub mod memory;
pub mod models;
pub mod sqlite;
pub mod store;

pub use error::{TokenStoreError, TokenStoreResult};
pub use memory::MemoryTokenStore;
pub use sqlite::SqliteTokenStore;
pub use store::TokenStore;

use quarry_core::config::TokenStoreConfig;
use std::sync::Arc;

/// Create a token store from configuration.
pub async fn from_config(config: &TokenStoreConfig) -> TokenStoreResult<Arc<dyn TokenStore>> {
    match config {
        TokenStoreConfig::Sqlite { path } => {
            let store = SqliteTokenStore::new(path).await?;
            Ok(Arc::new(store) as Arc<dyn TokenStore>)
        }
        TokenStoreConfig::Memory => {
            tracing::warn!("using in-memory token store; tokens are lost on restart");
            Ok(Arc::new(MemoryTokenStore::new()) as Arc<dyn TokenStore>)
        }
    }
}
