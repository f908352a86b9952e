//! Admin token initialization.

use anyhow::{Result, bail};
use quarry_core::config::AdminConfig;
use quarry_core::token::{Permissions, Token};
use quarry_tokens::TokenStore;
use time::OffsetDateTime;

/// Ensure the configured admin token exists with root scope and manager
/// permissions, rotating its secret if the configured hash changed.
pub async fn ensure_admin_token(tokens: &dyn TokenStore, config: &AdminConfig) -> Result<()> {
    // Stored hashes are lowercase hex.
    let hash = config
        .token_hash
        .strip_prefix("sha256:")
        .unwrap_or(&config.token_hash)
        .to_lowercase();
    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("invalid admin token_hash: expected 64 hex chars");
    }
    if config.alias.is_empty() || config.alias.contains(':') {
        bail!("invalid admin alias: {:?}", config.alias);
    }

    let existing = tokens.get_token(&config.alias).await?;
    if let Some(existing) = &existing
        && existing.secret_hash == hash
        && existing.is_root()
        && existing.permissions == Permissions::MANAGER
    {
        tracing::debug!(alias = %config.alias, "Admin token already exists");
        return Ok(());
    }

    let token = Token {
        alias: config.alias.clone(),
        path: Token::ROOT_PATH.to_string(),
        permissions: Permissions::MANAGER,
        secret_hash: hash,
        created_at: OffsetDateTime::now_utc(),
    };
    tokens.create_token(&token).await?;

    if existing.is_some() {
        tracing::info!(alias = %token.alias, "Admin token rotated");
    } else {
        tracing::info!(alias = %token.alias, "Admin token created");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::token::hash_secret;
    use quarry_tokens::MemoryTokenStore;

    #[tokio::test]
    async fn test_creates_admin_token() {
        let store = MemoryTokenStore::new();
        let config = AdminConfig::for_testing();
        ensure_admin_token(&store, &config).await.unwrap();

        let token = store.get_token("admin").await.unwrap().unwrap();
        assert!(token.is_root());
        assert_eq!(token.permissions, Permissions::MANAGER);
        assert!(token.verify_secret("test-admin-token"));
    }

    #[tokio::test]
    async fn test_existing_token_is_kept() {
        let store = MemoryTokenStore::new();
        let config = AdminConfig::for_testing();
        ensure_admin_token(&store, &config).await.unwrap();
        let first = store.get_token("admin").await.unwrap().unwrap();

        ensure_admin_token(&store, &config).await.unwrap();
        let second = store.get_token("admin").await.unwrap().unwrap();
        assert_eq!(first.created_at, second.created_at);
    }

    #[tokio::test]
    async fn test_changed_hash_rotates_secret() {
        let store = MemoryTokenStore::new();
        ensure_admin_token(&store, &AdminConfig::for_testing())
            .await
            .unwrap();

        let config = AdminConfig {
            alias: "admin".to_string(),
            token_hash: format!("sha256:{}", hash_secret("rotated").to_uppercase()),
        };
        ensure_admin_token(&store, &config).await.unwrap();

        let token = store.get_token("admin").await.unwrap().unwrap();
        assert!(token.verify_secret("rotated"));
        assert!(!token.verify_secret("test-admin-token"));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let store = MemoryTokenStore::new();
        let short = AdminConfig {
            alias: "admin".to_string(),
            token_hash: "abc123".to_string(),
        };
        assert!(ensure_admin_token(&store, &short).await.is_err());

        let bad_alias = AdminConfig {
            alias: "ad:min".to_string(),
            ..AdminConfig::for_testing()
        };
        assert!(ensure_admin_token(&store, &bad_alias).await.is_err());
        assert!(store.list_tokens().await.unwrap().is_empty());
    }
}
