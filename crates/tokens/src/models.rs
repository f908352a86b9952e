//! Persisted token rows.

use crate::error::{TokenStoreError, TokenStoreResult};
use quarry_core::{Permissions, Token};
use sqlx::FromRow;
use time::OffsetDateTime;

/// Token record as stored. Permissions are kept as a flag string (`mw`).
#[derive(Debug, Clone, FromRow)]
pub struct TokenRow {
    pub alias: String,
    pub path: String,
    pub permissions: String,
    pub secret_hash: String,
    pub created_at: OffsetDateTime,
}

impl TokenRow {
    pub fn into_token(self) -> TokenStoreResult<Token> {
        let permissions =
            Permissions::parse(&self.permissions).map_err(|e| TokenStoreError::Corrupt {
                alias: self.alias.clone(),
                reason: e.to_string(),
            })?;
        Ok(Token {
            alias: self.alias,
            path: self.path,
            permissions,
            secret_hash: self.secret_hash,
            created_at: self.created_at,
        })
    }
}

impl From<&Token> for TokenRow {
    fn from(token: &Token) -> Self {
        Self {
            alias: token.alias.clone(),
            path: token.path.clone(),
            permissions: token.permissions.to_flags(),
            secret_hash: token.secret_hash.clone(),
            created_at: token.created_at,
        }
    }
}
