//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::http::{Method, StatusCode};
use axum::routing::get;
use tower_http::compression::CompressionLayer;
use tower_http::compression::predicate::{DefaultPredicate, Predicate, SizeAbove};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        // Liveness check (load balancers, k8s)
        .route("/", get(handlers::liveness))
        // Entry names may contain '/', so the filename captures the rest of the path
        .route("/{token}/{signature}/{*filename}", get(handlers::get_blob));

    // SECURITY: When enabled, this endpoint must be network-restricted to the
    // Prometheus scraper. See crate::metrics.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    let server = &state.config.server;
    let compression = CompressionLayer::new().compress_when(
        DefaultPredicate::new().and(SizeAbove::new(server.compression_min_size)),
    );
    let cors = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_origin(Any);
    let timeout = TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, server.request_timeout());

    // Layers run outermost-last: TraceLayer sees every request first
    router
        .fallback(handlers::not_found)
        .layer(timeout)
        .layer(compression)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
