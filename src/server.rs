//! Axum server setup, shared application state, and graceful shutdown.
//!
//! Contains [`AppState`] (the `Arc`-shared state holding the worker, the
//! network primitive, stats, and uptime), [`build_router`] for the Axum
//! router, [`build_http_client`] for the connection-pooled hyper client,
//! [`StandaloneHost`] for the worker's lifecycle hooks, and
//! [`shutdown_signal`] for SIGTERM / Ctrl+C handling.

use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::error::RelayError;
use crate::fetcher::client::ClientRegistry;
use crate::health::health_handler;
use crate::proxy;
use crate::proxy::network::Network;
use crate::worker::{LifecycleHost, MessageOutcome, Worker};

/// Path of the inbound message endpoint.
pub const MESSAGE_PATH: &str = "/_worker/message";

/// Header carrying the shared secret for the inbound message endpoint.
pub const MESSAGE_TOKEN_HEADER: &str = "x-worker-token";

#[derive(Debug)]
pub struct Stats {
    pub forwarded: AtomicU64,
    pub failed: AtomicU64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            forwarded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }
}

pub type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;
pub type HttpClient = Client<HttpsConnector, http_body_util::Full<bytes::Bytes>>;

pub struct AppState {
    pub worker: Arc<Worker>,
    pub network: Arc<dyn Network>,
    /// Page-facing origin; inbound paths are resolved against it.
    pub origin: url::Url,
    pub client_source: String,
    /// Shared secret for [`MESSAGE_PATH`]. `None` admits loopback peers only.
    pub message_token: Option<String>,
    pub start_time: Instant,
    pub stats: Stats,
}

#[must_use]
pub fn build_http_client() -> HttpClient {
    // When multiple rustls crypto providers are compiled in, rustls cannot
    // auto-detect which one to use. Explicitly install `ring`.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(30))
        .build(https)
}

pub fn build_router(state: Arc<AppState>, max_body: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(MESSAGE_PATH, post(message_handler))
        .fallback(proxy::intercept_handler)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(max_body)),
        )
        .with_state(state)
}

/// Inbound message path: push a record or invalidate the cache.
pub async fn message_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    if let Err(status) = authorize_message(state.message_token.as_deref(), peer, &headers) {
        tracing::warn!(peer = %peer, status = status.as_u16(), "inbound message refused");
        return (status, Json(serde_json::json!({ "outcome": "refused" })));
    }

    match state.worker.handle_message(payload) {
        MessageOutcome::Invalidated => (
            StatusCode::OK,
            Json(serde_json::json!({ "outcome": "invalidated" })),
        ),
        MessageOutcome::Replaced { fingerprint } => (
            StatusCode::OK,
            Json(serde_json::json!({ "outcome": "replaced", "fingerprint": fingerprint })),
        ),
        MessageOutcome::Rejected(errors) => {
            let errors: Vec<Value> = errors
                .iter()
                .map(|e| {
                    serde_json::json!({
                        "field": e.field,
                        "message": e.message,
                        "suggestion": e.suggestion,
                    })
                })
                .collect();
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({ "outcome": "rejected", "errors": errors })),
            )
        }
    }
}

/// Check that an inbound message comes from the controlling side.
///
/// With a token configured the request must carry it in
/// [`MESSAGE_TOKEN_HEADER`]; without one only loopback peers are admitted.
pub fn authorize_message(
    token: Option<&str>,
    peer: SocketAddr,
    headers: &HeaderMap,
) -> Result<(), StatusCode> {
    let Some(expected) = token else {
        return if peer.ip().is_loopback() {
            Ok(())
        } else {
            Err(StatusCode::FORBIDDEN)
        };
    };

    let presented = headers
        .get(MESSAGE_TOKEN_HEADER)
        .map(|v| Sha256::digest(v.as_bytes()))
        .ok_or(StatusCode::UNAUTHORIZED)?;
    // Digests are compared, never the raw secret.
    if presented == Sha256::digest(expected.as_bytes()) {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

/// Lifecycle hooks for a worker that is the only instance in its process.
pub struct StandaloneHost {
    clients: Arc<dyn ClientRegistry>,
}

impl StandaloneHost {
    #[must_use]
    pub fn new(clients: Arc<dyn ClientRegistry>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl LifecycleHost for StandaloneHost {
    async fn skip_waiting(&self) -> Result<(), RelayError> {
        // No older instance can be waiting in this process.
        Ok(())
    }

    async fn claim_clients(&self) -> Result<usize, RelayError> {
        self.clients.claim().await.map_err(|e| RelayError::Lifecycle {
            step: "claim",
            reason: e.to_string(),
        })
    }
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(ip: &str) -> SocketAddr {
        format!("{ip}:50000").parse().unwrap()
    }

    fn with_token(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(MESSAGE_TOKEN_HEADER, value.parse().unwrap());
        headers
    }

    #[test]
    fn without_token_only_loopback_is_admitted() {
        assert!(authorize_message(None, peer("127.0.0.1"), &HeaderMap::new()).is_ok());
        assert!(authorize_message(None, peer("[::1]"), &HeaderMap::new()).is_ok());
        assert_eq!(
            authorize_message(None, peer("10.0.0.7"), &HeaderMap::new()),
            Err(StatusCode::FORBIDDEN)
        );
    }

    #[test]
    fn token_must_match_from_any_peer() {
        let token = Some("s3cret");
        assert!(authorize_message(token, peer("10.0.0.7"), &with_token("s3cret")).is_ok());
        assert_eq!(
            authorize_message(token, peer("127.0.0.1"), &HeaderMap::new()),
            Err(StatusCode::UNAUTHORIZED)
        );
        assert_eq!(
            authorize_message(token, peer("127.0.0.1"), &with_token("guess")),
            Err(StatusCode::UNAUTHORIZED)
        );
    }
}
