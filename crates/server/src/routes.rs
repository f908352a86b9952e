//! Route configuration.

use crate::auth::{auth_middleware, error_page_middleware};
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/api/repositories", get(handlers::list_repositories))
        .route("/api/browse/{*path}", get(handlers::browse))
        .route("/api/auth/whoami", get(handlers::whoami))
        // Health check, unauthenticated for load balancers
        .route("/api/health", get(handlers::health_check))
        // Token management (all require MANAGER)
        .route(
            "/api/tokens",
            get(handlers::list_tokens).post(handlers::create_token),
        )
        .route(
            "/api/tokens/{alias}/permissions",
            put(handlers::update_permissions),
        )
        .route("/api/tokens/{alias}", delete(handlers::revoke_token))
        .route(
            "/api/metadata/cache",
            delete(handlers::purge_metadata_cache),
        );

    // Repository names come from configuration, so repository paths are
    // served by the fallback.
    let mut router = Router::new()
        .merge(api_routes)
        .fallback(handlers::repository_fallback);

    // SECURITY: When enabled, this endpoint MUST be network-restricted
    // to authorized Prometheus scraper IPs only.
    if state.config.server.metrics_enabled {
        let metrics_routes = Router::new().route("/metrics", get(metrics_handler));
        router = router.merge(metrics_routes);
    }

    // Order of execution: TraceLayer -> error pages -> Auth -> Handler
    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(middleware::from_fn(error_page_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
