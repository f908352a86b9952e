//! Token store trait.

use crate::error::TokenStoreResult;
use async_trait::async_trait;
use quarry_core::{Permissions, Token};

/// Persistence for access tokens, keyed by alias.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert a token, replacing any token with the same alias.
    async fn create_token(&self, token: &Token) -> TokenStoreResult<()>;

    /// Get a token by alias.
    async fn get_token(&self, alias: &str) -> TokenStoreResult<Option<Token>>;

    /// List all tokens, ordered by alias.
    async fn list_tokens(&self) -> TokenStoreResult<Vec<Token>>;

    /// Replace a token's permission flags. `NotFound` if the alias is unknown.
    async fn update_permissions(
        &self,
        alias: &str,
        permissions: Permissions,
    ) -> TokenStoreResult<()>;

    /// Delete (revoke) a token. `NotFound` if the alias is unknown.
    async fn delete_token(&self, alias: &str) -> TokenStoreResult<()>;

    /// Check store connectivity.
    async fn health_check(&self) -> TokenStoreResult<()>;
}
