//! Prometheus metrics for the satchel gateway.
//!
//! The `/metrics` endpoint is unauthenticated so Prometheus can scrape it.
//! Metrics carry no hashes or filenames, only aggregate counts, but the
//! endpoint should still be reachable from the scraper's network only.

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static MOUNTED_ARCHIVES: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "satchel_mounted_archives",
        "Archives currently registered in the mount cache",
    )
    .expect("metric creation failed")
});

pub static ACTIVE_ENTRY_STREAMS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "satchel_active_entry_streams",
        "Archive entry streams currently open",
    )
    .expect("metric creation failed")
});

pub static MOUNT_LOADS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "satchel_mount_loads_total",
            "Mount cache lookups by outcome (hit, loaded, raced, failed)",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static MOUNT_EVICTIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "satchel_mount_evictions_total",
        "Mounts evicted by the idle sweep",
    )
    .expect("metric creation failed")
});

pub static BLOB_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "satchel_blob_requests_total",
            "Download requests by kind (plain, archive, rejected) and status",
        ),
        &["kind", "status"],
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(MOUNTED_ARCHIVES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ACTIVE_ENTRY_STREAMS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(MOUNT_LOADS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(MOUNT_EVICTIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BLOB_REQUESTS.clone()))
            .expect("metric registration failed");
    });
}

pub fn record_mount_load(outcome: &str) {
    MOUNT_LOADS.with_label_values(&[outcome]).inc();
}

pub fn record_blob_request(kind: &str, status: StatusCode) {
    BLOB_REQUESTS
        .with_label_values(&[kind, status.as_str()])
        .inc();
}

/// GET /metrics - Prometheus metrics endpoint.
///
/// Cache gauges and the eviction counter are sampled at scrape time.
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    MOUNTED_ARCHIVES.set(state.mounts.len() as i64);
    ACTIVE_ENTRY_STREAMS.set(state.mounts.active_streams() as i64);
    // The sweeper keeps its own running total; catch the counter up to it
    let evicted = state.mounts.evictions();
    let seen = MOUNT_EVICTIONS.get();
    if evicted > seen {
        MOUNT_EVICTIONS.inc_by(evicted - seen);
    }

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
