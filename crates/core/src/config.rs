//! Configuration types shared across crates.

use crate::quota::QuotaLimit;
use crate::repository::{Repository, RepositorySet};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Prepend the primary repository to request paths whose first segment
    /// is not a repository name.
    #[serde(default)]
    pub rewrite_path_to_primary: bool,
    /// Require authentication for every read, not only for hidden repositories.
    #[serde(default)]
    pub full_authentication: bool,
    /// Accept deploy requests (default: true).
    #[serde(default = "default_true")]
    pub deploy_enabled: bool,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
    /// Maximum accepted deploy body size in bytes.
    #[serde(default = "default_max_deploy_size")]
    pub max_deploy_size: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_deploy_size() -> u64 {
    512 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            rewrite_path_to_primary: false,
            full_authentication: false,
            deploy_enabled: true,
            metrics_enabled: true,
            max_deploy_size: default_max_deploy_size(),
        }
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to AWS_ACCESS_KEY_ID env var if not set.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to AWS_SECRET_ACCESS_KEY env var if not set.
        secret_access_key: Option<String>,
        /// Force path-style URLs (required for MinIO).
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/repositories"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                access_key_id,
                secret_access_key,
                ..
            } => match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                (Some(_), Some(_)) | (None, None) => Ok(()),
                _ => Err(
                    "s3 config requires both access_key_id and secret_access_key when either is set"
                        .to_string(),
                ),
            },
            _ => Ok(()),
        }
    }
}

/// Disk quota configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Storage ceiling (`"10GB"` or `"90%"`). Unlimited when unset.
    #[serde(default)]
    pub limit: Option<QuotaLimit>,
}

/// Write locking configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WriteConfig {
    /// Delay between lock acquisition attempts in milliseconds.
    #[serde(default = "default_lock_retry_delay_ms")]
    pub lock_retry_delay_ms: u64,
    /// Maximum lock acquisition attempts before a write times out.
    #[serde(default = "default_lock_max_attempts")]
    pub lock_max_attempts: u32,
}

fn default_lock_retry_delay_ms() -> u64 {
    100
}

fn default_lock_max_attempts() -> u32 {
    40
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            lock_retry_delay_ms: default_lock_retry_delay_ms(),
            lock_max_attempts: default_lock_max_attempts(),
        }
    }
}

impl WriteConfig {
    pub fn lock_retry_delay(&self) -> Duration {
        Duration::from_millis(self.lock_retry_delay_ms)
    }
}

/// Remote repository proxy configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Remote repository base URLs, tried in order.
    #[serde(default)]
    pub remotes: Vec<String>,
    /// Persist proxied artifacts locally.
    #[serde(default = "default_true")]
    pub store: bool,
    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    /// Maximum remote fetches in flight.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
}

fn default_connect_timeout_secs() -> u64 {
    3
}

fn default_read_timeout_secs() -> u64 {
    15
}

fn default_max_concurrent_fetches() -> usize {
    16
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            remotes: Vec::new(),
            store: true,
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
        }
    }
}

impl ProxyConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Validate proxy configuration.
    pub fn validate(&self) -> Result<(), String> {
        for remote in &self.remotes {
            if !remote.starts_with("http://") && !remote.starts_with("https://") {
                return Err(format!("proxy remote must be an http(s) URL: {remote}"));
            }
        }
        if self.max_concurrent_fetches == 0 {
            return Err("proxy.max_concurrent_fetches cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Token store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TokenStoreConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// Process memory; tokens are lost on restart.
    Memory,
}

impl Default for TokenStoreConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/tokens.db"),
        }
    }
}

/// Bootstrap manager token configuration.
///
/// The admin token is ensured on every start. If the configured hash differs
/// from the stored one, the stored secret is replaced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Alias of the manager token.
    #[serde(default = "default_admin_alias")]
    pub alias: String,
    /// Pre-computed hash of the admin secret (SHA256 hex, 64 characters).
    /// Generate with: `echo -n "your-secret" | sha256sum`
    pub token_hash: String,
}

fn default_admin_alias() -> String {
    "admin".to_string()
}

impl AdminConfig {
    /// Create a test configuration with a dummy token hash.
    ///
    /// **For testing only.** SHA256 of "test-admin-token".
    pub fn for_testing() -> Self {
        Self {
            alias: default_admin_alias(),
            token_hash: "17d6bfe05d1b1fb7bc499f8e3f639c7b3eda4c40f321eef8887a0c04c89a99c5"
                .to_string(),
        }
    }
}

fn default_repositories() -> Vec<Repository> {
    vec![Repository::public("releases"), Repository::public("snapshots")]
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Repositories in priority order; the first is the primary repository.
    #[serde(default = "default_repositories")]
    pub repositories: Vec<Repository>,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub write: WriteConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub tokens: TokenStoreConfig,
    /// Admin token configuration (required).
    pub admin: AdminConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses in-memory tokens and a dummy admin token.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            repositories: default_repositories(),
            quota: QuotaConfig::default(),
            write: WriteConfig {
                lock_retry_delay_ms: 10,
                lock_max_attempts: 10,
            },
            proxy: ProxyConfig::default(),
            tokens: TokenStoreConfig::Memory,
            admin: AdminConfig::for_testing(),
        }
    }

    /// The configured repositories as an ordered set.
    pub fn repository_set(&self) -> RepositorySet {
        RepositorySet::new(self.repositories.clone())
    }

    /// Validate the whole configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.storage.validate()?;
        self.proxy.validate()?;

        let repositories = self.repository_set();
        if repositories.is_empty() {
            return Err("at least one repository must be configured".to_string());
        }
        repositories.validate().map_err(|e| e.to_string())?;

        if self.write.lock_max_attempts == 0 {
            return Err("write.lock_max_attempts cannot be 0".to_string());
        }

        let hash = &self.admin.token_hash;
        if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err("admin.token_hash must be a 64 character SHA256 hex digest".to_string());
        }
        Ok(())
    }
}
