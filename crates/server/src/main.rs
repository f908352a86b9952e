//! Quarry server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use quarry_core::config::AppConfig;
use quarry_server::bootstrap::ensure_admin_token;
use quarry_server::{AppState, create_router};
use quarry_storage::{DiskQuota, StorageProvider};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Quarry - A Maven artifact repository server
#[derive(Parser, Debug)]
#[command(name = "quarryd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "QUARRY_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Quarry v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars can provide/override everything)
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    // QUARRY_CONFIG is only the file path.
    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("QUARRY_") && key != "QUARRY_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: quarryd --config /path/to/config.toml\n  \
             2. Environment variables: QUARRY_SERVER__BIND=0.0.0.0:8080 \
             QUARRY_ADMIN__TOKEN_HASH=sha256:YOUR_TOKEN_HASH_HERE quarryd\n\n\
             See config/server.example.toml for example configuration.\n\
             Set QUARRY_CONFIG env var to specify a default config file path."
        );
    }

    if !has_config_file {
        tracing::info!("Using environment variables for configuration");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("QUARRY_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    quarry_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let storage = quarry_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    tracing::info!(backend = storage.backend_name(), "Storage backend initialized");

    // Fail fast instead of reporting healthy with unreachable storage.
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!("Storage backend connectivity verified");

    let quota = build_quota(&config, storage.as_ref()).await?;
    tracing::info!(
        limit = quota.limit(),
        used = quota.used(),
        "Disk quota initialized"
    );

    let tokens = quarry_tokens::from_config(&config.tokens)
        .await
        .context("failed to initialize token store")?;
    tracing::info!("Token store initialized");

    ensure_admin_token(tokens.as_ref(), &config.admin).await?;

    let state = AppState::new(config.clone(), storage, Arc::new(quota), tokens)
        .context("failed to initialize application state")?;
    tracing::info!(
        repositories = ?state.repositories.names().collect::<Vec<_>>(),
        "Repositories configured"
    );

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Build the disk quota from configuration, charged with what storage
/// already holds.
async fn build_quota(config: &AppConfig, storage: &dyn StorageProvider) -> Result<DiskQuota> {
    let quota = match config.quota.limit {
        Some(limit) => {
            let capacity = storage
                .capacity()
                .await
                .context("failed to query storage capacity")?;
            DiskQuota::from_limit(limit, capacity).context("invalid quota limit")?
        }
        None => DiskQuota::unlimited(),
    };

    let used = storage
        .usage()
        .await
        .context("failed to measure storage usage")?;
    Ok(quota.with_used(used))
}
