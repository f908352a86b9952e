//! SQLite token store.

use crate::error::{TokenStoreError, TokenStoreResult};
use crate::models::TokenRow;
use crate::store::TokenStore;
use async_trait::async_trait;
use quarry_core::{Permissions, Token};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// SQLite-backed token store.
pub struct SqliteTokenStore {
    pool: Pool<Sqlite>,
}

impl SqliteTokenStore {
    /// Open (creating if missing) the database at `path` and migrate it.
    pub async fn new(path: impl AsRef<Path>) -> TokenStoreResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!(path = %path.display(), "token store opened");
        Ok(store)
    }

    /// In-memory database, for tests.
    pub async fn in_memory() -> TokenStoreResult<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // One connection: every connection to `:memory:` is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> TokenStoreResult<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn create_token(&self, token: &Token) -> TokenStoreResult<()> {
        let row = TokenRow::from(token);
        sqlx::query(
            r#"
            INSERT INTO tokens (alias, path, permissions, secret_hash, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(alias) DO UPDATE SET
                path = excluded.path,
                permissions = excluded.permissions,
                secret_hash = excluded.secret_hash,
                created_at = excluded.created_at
            "#,
        )
        .bind(&row.alias)
        .bind(&row.path)
        .bind(&row.permissions)
        .bind(&row.secret_hash)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_token(&self, alias: &str) -> TokenStoreResult<Option<Token>> {
        let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE alias = ?")
            .bind(alias)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TokenRow::into_token).transpose()
    }

    async fn list_tokens(&self) -> TokenStoreResult<Vec<Token>> {
        let rows = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens ORDER BY alias")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TokenRow::into_token).collect()
    }

    async fn update_permissions(
        &self,
        alias: &str,
        permissions: Permissions,
    ) -> TokenStoreResult<()> {
        let result = sqlx::query("UPDATE tokens SET permissions = ? WHERE alias = ?")
            .bind(permissions.to_flags())
            .bind(alias)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(TokenStoreError::NotFound(alias.to_string()));
        }
        Ok(())
    }

    async fn delete_token(&self, alias: &str) -> TokenStoreResult<()> {
        let result = sqlx::query("DELETE FROM tokens WHERE alias = ?")
            .bind(alias)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(TokenStoreError::NotFound(alias.to_string()));
        }
        Ok(())
    }

    async fn health_check(&self) -> TokenStoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS tokens (
    alias TEXT PRIMARY KEY,
    path TEXT NOT NULL,
    permissions TEXT NOT NULL,
    secret_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;
