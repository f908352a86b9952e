//! Application state shared across handlers.

use crate::auth::Authorizer;
use crate::proxy::{ProxyError, ProxyResolver};
use quarry_core::RepositorySet;
use quarry_core::config::AppConfig;
use quarry_maven::{MetadataCache, MetadataGenerator};
use quarry_storage::{DiskQuota, StorageProvider, WriteCoordinator};
use quarry_tokens::TokenStore;
use std::sync::Arc;

/// Application state shared across all handlers.
///
/// Every store is owned here and injected; nothing but metrics lives in
/// statics.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Configured repositories, primary first.
    pub repositories: Arc<RepositorySet>,
    /// Storage backend.
    pub storage: Arc<dyn StorageProvider>,
    /// Serialized, quota-charged writes.
    pub writes: WriteCoordinator,
    /// Access token records.
    pub tokens: Arc<dyn TokenStore>,
    pub authorizer: Authorizer,
    pub generator: MetadataGenerator,
    /// Present when at least one remote repository is configured.
    pub proxy: Option<ProxyResolver>,
}

impl AppState {
    /// Wire the stores together. Fails only when the proxy HTTP client cannot
    /// be built.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn StorageProvider>,
        quota: Arc<DiskQuota>,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self, ProxyError> {
        let repositories = Arc::new(config.repository_set());
        let writes = WriteCoordinator::new(storage.clone(), quota, &config.write);
        let generator = MetadataGenerator::new(writes.clone(), Arc::new(MetadataCache::new()));
        let authorizer = Authorizer::new(tokens.clone(), repositories.clone());

        let proxy = if config.proxy.remotes.is_empty() {
            None
        } else {
            let proxy = ProxyResolver::new(&config.proxy, writes.clone(), generator.clone())?;
            tracing::info!(remotes = ?proxy.remotes(), store = config.proxy.store, "Proxy enabled");
            Some(proxy)
        };

        Ok(Self {
            config: Arc::new(config),
            repositories,
            storage,
            writes,
            tokens,
            authorizer,
            generator,
            proxy,
        })
    }
}
