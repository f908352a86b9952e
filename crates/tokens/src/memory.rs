//! In-memory token store.

use crate::error::{TokenStoreError, TokenStoreResult};
use crate::store::TokenStore;
use async_trait::async_trait;
use dashmap::DashMap;
use quarry_core::{Permissions, Token};

/// Token store held in process memory. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: DashMap<String, Token>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn create_token(&self, token: &Token) -> TokenStoreResult<()> {
        self.tokens.insert(token.alias.clone(), token.clone());
        Ok(())
    }

    async fn get_token(&self, alias: &str) -> TokenStoreResult<Option<Token>> {
        Ok(self.tokens.get(alias).map(|entry| entry.value().clone()))
    }

    async fn list_tokens(&self) -> TokenStoreResult<Vec<Token>> {
        let mut tokens: Vec<Token> = self
            .tokens
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        tokens.sort_by(|a, b| a.alias.cmp(&b.alias));
        Ok(tokens)
    }

    async fn update_permissions(
        &self,
        alias: &str,
        permissions: Permissions,
    ) -> TokenStoreResult<()> {
        let mut entry = self
            .tokens
            .get_mut(alias)
            .ok_or_else(|| TokenStoreError::NotFound(alias.to_string()))?;
        entry.permissions = permissions;
        Ok(())
    }

    async fn delete_token(&self, alias: &str) -> TokenStoreResult<()> {
        self.tokens
            .remove(alias)
            .map(|_| ())
            .ok_or_else(|| TokenStoreError::NotFound(alias.to_string()))
    }

    async fn health_check(&self) -> TokenStoreResult<()> {
        Ok(())
    }
}
