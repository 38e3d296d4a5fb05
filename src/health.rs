//! `GET /health` endpoint handler.
//!
//! Returns a [`HealthResponse`] JSON payload containing the server
//! version, uptime, worker and cache state, the fingerprint of the cached
//! record, and cumulative request and cache statistics.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::server::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub build: String,
    pub uptime_seconds: u64,
    pub worker: WorkerHealth,
    pub stats: StatsResponse,
}

#[derive(Serialize, Deserialize)]
pub struct WorkerHealth {
    pub state: String,
    pub cache: String,
    pub fingerprint: Option<String>,
    pub addressing: String,
    pub origin: String,
    pub client_source: String,
}

#[derive(Serialize, Deserialize)]
pub struct StatsResponse {
    pub requests_forwarded: u64,
    pub requests_failed: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub config_fetch_failures: u64,
    pub invalidations: u64,
    pub pushes: u64,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let store = state.worker.store();
    let current = store.current();
    let store_stats = store.stats();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: format!(
            "{} ({})",
            env!("AUTHRELAY_GIT_SHORT"),
            env!("AUTHRELAY_BUILD_PROFILE")
        ),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        worker: WorkerHealth {
            state: state.worker.state().to_string(),
            cache: label(&store.state()),
            fingerprint: current.map(|c| c.fingerprint()),
            addressing: label(&state.worker.settings().addressing),
            origin: state.origin.origin().ascii_serialization(),
            client_source: state.client_source.clone(),
        },
        stats: StatsResponse {
            requests_forwarded: state.stats.forwarded.load(Ordering::Relaxed),
            requests_failed: state.stats.failed.load(Ordering::Relaxed),
            cache_hits: store_stats.hits.load(Ordering::Relaxed),
            cache_misses: store_stats.misses.load(Ordering::Relaxed),
            config_fetch_failures: store_stats.fetch_failures.load(Ordering::Relaxed),
            invalidations: store_stats.invalidations.load(Ordering::Relaxed),
            pushes: store_stats.pushes.load(Ordering::Relaxed),
        },
    })
}

/// Serialized name of a unit enum variant.
fn label<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}
