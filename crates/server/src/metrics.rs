//! Prometheus metrics for the repository server.
//!
//! Counters are recorded where requests are handled; gauges for the metadata
//! cache and disk quota are sampled from the application state at scrape
//! time.
//!
//! The `/metrics` endpoint exposes repository layout through label values and
//! should be network-restricted when enabled.

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use quarry_storage::WriteError;
use std::sync::{LazyLock, Once};

/// Global metrics registry.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Artifact lookups by outcome: `local`, `generated`, `proxied`, `missing`.
pub static LOOKUPS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("quarry_lookups_total", "Artifact lookups by outcome"),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static DEPLOYS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "quarry_deploys_total",
            "Deploy requests by outcome (stored, ignored, deleted)",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static DEPLOYED_BYTES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("quarry_deployed_bytes_total", "Total bytes stored by deploys")
        .expect("metric creation failed")
});

/// Remote fetches by outcome: `hit`, `miss`, `persisted`, `persist_skipped`,
/// `persist_failed`.
pub static PROXY_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("quarry_proxy_requests_total", "Remote proxy fetches by outcome"),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static METADATA_CACHE_HITS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "quarry_metadata_cache_hits",
        "Metadata cache hits since startup",
    )
    .expect("metric creation failed")
});

pub static METADATA_CACHE_MISSES: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "quarry_metadata_cache_misses",
        "Metadata cache misses since startup",
    )
    .expect("metric creation failed")
});

pub static METADATA_CACHE_ENTRIES: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "quarry_metadata_cache_entries",
        "Documents currently held in the metadata cache",
    )
    .expect("metric creation failed")
});

pub static QUOTA_REJECTIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "quarry_quota_rejections_total",
        "Writes rejected because the disk quota was exhausted",
    )
    .expect("metric creation failed")
});

pub static LOCK_TIMEOUTS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "quarry_lock_timeouts_total",
        "Writes that gave up waiting for the per-path write lock",
    )
    .expect("metric creation failed")
});

pub static QUOTA_USED_BYTES: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("quarry_quota_used_bytes", "Bytes charged against the disk quota")
        .expect("metric creation failed")
});

pub static QUOTA_LIMIT_BYTES: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("quarry_quota_limit_bytes", "Disk quota limit in bytes")
        .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so integration tests can build several routers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(LOOKUPS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DEPLOYS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DEPLOYED_BYTES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PROXY_REQUESTS.clone()))
            .expect("metric registration failed");

        REGISTRY
            .register(Box::new(METADATA_CACHE_HITS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(METADATA_CACHE_MISSES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(METADATA_CACHE_ENTRIES.clone()))
            .expect("metric registration failed");

        REGISTRY
            .register(Box::new(QUOTA_REJECTIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(LOCK_TIMEOUTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(QUOTA_USED_BYTES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(QUOTA_LIMIT_BYTES.clone()))
            .expect("metric registration failed");
    });
}

/// Count quota and lock failures of a coordinated write.
pub fn record_write_error(error: &WriteError) {
    match error {
        WriteError::QuotaExceeded { .. } => QUOTA_REJECTIONS.inc(),
        WriteError::Timeout(_) => LOCK_TIMEOUTS.inc(),
        _ => {}
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let cache = state.generator.cache();
    let stats = cache.stats();
    METADATA_CACHE_HITS.set(saturating_i64(stats.hits));
    METADATA_CACHE_MISSES.set(saturating_i64(stats.misses));
    METADATA_CACHE_ENTRIES.set(saturating_i64(cache.len() as u64));

    let quota = state.writes.quota();
    QUOTA_USED_BYTES.set(saturating_i64(quota.used()));
    QUOTA_LIMIT_BYTES.set(saturating_i64(quota.limit()));

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        register_metrics();
        register_metrics();
    }

    #[test]
    fn test_record_write_error() {
        register_metrics();
        let before = QUOTA_REJECTIONS.get();
        record_write_error(&WriteError::QuotaExceeded {
            requested: 1,
            remaining: 0,
        });
        assert!(QUOTA_REJECTIONS.get() > before);

        let before = LOCK_TIMEOUTS.get();
        record_write_error(&WriteError::Timeout("k".into()));
        assert!(LOCK_TIMEOUTS.get() > before);
    }
}
