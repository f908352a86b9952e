// Contract tests shared by every TokenStore implementation.

use quarry_core::token::hash_secret;
use quarry_core::{Permissions, Token};
use quarry_tokens::{MemoryTokenStore, SqliteTokenStore, TokenStore, TokenStoreError};
use time::OffsetDateTime;

fn token(alias: &str, path: &str, permissions: Permissions, secret: &str) -> Token {
    Token {
        alias: alias.to_string(),
        path: path.to_string(),
        permissions,
        secret_hash: hash_secret(secret),
        created_at: OffsetDateTime::now_utc().replace_nanosecond(0).unwrap(),
    }
}

async fn stores() -> Vec<(&'static str, Box<dyn TokenStore>)> {
    vec![
        ("memory", Box::new(MemoryTokenStore::new())),
        ("sqlite", Box::new(SqliteTokenStore::in_memory().await.unwrap())),
    ]
}

#[tokio::test]
async fn test_create_and_get() {
    for (name, store) in stores().await {
        let created = token("deployer", "/releases", Permissions::WRITE, "s3cret");
        store.create_token(&created).await.unwrap();

        let loaded = store.get_token("deployer").await.unwrap().unwrap();
        assert_eq!(loaded.path, "/releases", "{name}");
        assert_eq!(loaded.permissions, Permissions::WRITE, "{name}");
        assert!(loaded.verify_secret("s3cret"), "{name}");
        assert!(!loaded.verify_secret("other"), "{name}");
        assert_eq!(loaded.created_at, created.created_at, "{name}");

        assert!(store.get_token("nobody").await.unwrap().is_none(), "{name}");
    }
}

#[tokio::test]
async fn test_create_upserts_by_alias() {
    for (name, store) in stores().await {
        store
            .create_token(&token("ci", "/releases", Permissions::READ, "one"))
            .await
            .unwrap();
        store
            .create_token(&token("ci", "*", Permissions::MANAGER, "two"))
            .await
            .unwrap();

        let tokens = store.list_tokens().await.unwrap();
        assert_eq!(tokens.len(), 1, "{name}");
        assert_eq!(tokens[0].path, "*", "{name}");
        assert_eq!(tokens[0].permissions, Permissions::MANAGER, "{name}");
        assert!(tokens[0].verify_secret("two"), "{name}");
    }
}

#[tokio::test]
async fn test_list_is_ordered_by_alias() {
    for (name, store) in stores().await {
        for alias in ["zeta", "alpha", "mid"] {
            store
                .create_token(&token(alias, "/", Permissions::READ, alias))
                .await
                .unwrap();
        }
        let aliases: Vec<_> = store
            .list_tokens()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.alias)
            .collect();
        assert_eq!(aliases, ["alpha", "mid", "zeta"], "{name}");
    }
}

#[tokio::test]
async fn test_update_permissions() {
    for (name, store) in stores().await {
        store
            .create_token(&token("ci", "/snapshots", Permissions::READ, "x"))
            .await
            .unwrap();
        store
            .update_permissions("ci", Permissions::MANAGER)
            .await
            .unwrap();
        let loaded = store.get_token("ci").await.unwrap().unwrap();
        assert_eq!(loaded.permissions, Permissions::MANAGER, "{name}");

        let err = store
            .update_permissions("missing", Permissions::WRITE)
            .await
            .unwrap_err();
        assert!(matches!(err, TokenStoreError::NotFound(_)), "{name}");
    }
}

#[tokio::test]
async fn test_delete_token() {
    for (name, store) in stores().await {
        store
            .create_token(&token("ci", "/", Permissions::READ, "x"))
            .await
            .unwrap();
        store.delete_token("ci").await.unwrap();
        assert!(store.get_token("ci").await.unwrap().is_none(), "{name}");

        let err = store.delete_token("ci").await.unwrap_err();
        assert!(matches!(err, TokenStoreError::NotFound(_)), "{name}");
    }
}
