//! HTTP front of the interception worker.
//!
//! The [`intercept_handler`] function is the Axum fallback that receives
//! every request not addressed to the host's own endpoints, turns it into
//! an [`InterceptedRequest`](request::InterceptedRequest), and hands it to
//! the [`Worker`](crate::worker::Worker). Submodules hold the request model
//! ([`request`]), the transformation policy ([`policy`]), header handling
//! ([`headers`]), and the network primitive ([`network`]).

pub mod headers;
pub mod network;
pub mod policy;
pub mod request;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

use crate::error::RelayError;
use crate::server::AppState;
use crate::worker::FetchOutcome;
use request::{CacheMode, Destination, InterceptedRequest, RequestMode};

/// Header carrying the id of the page that issued the request.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

pub async fn intercept_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    req_headers: HeaderMap,
    body: Bytes,
) -> Response {
    let correlation_id = req_headers
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);

    if headers::has_looped(&req_headers) {
        tracing::error!(
            correlation_id = %correlation_id,
            path = %uri.path(),
            "request looped back through the proxy, check --origin"
        );
        return StatusCode::LOOP_DETECTED.into_response();
    }

    let request = intercepted_from_parts(&state.origin, method, &uri, req_headers, body);

    tracing::info!(
        correlation_id = %correlation_id,
        client_id = request.client_id.as_deref().unwrap_or("-"),
        method = %request.method,
        url = %request.url,
        destination = request.destination.as_str(),
        "request intercepted"
    );

    let result = match state.worker.handle_fetch(request).await {
        FetchOutcome::Responded(result) => result,
        FetchOutcome::Default(request) => state.network.fetch(request.into_outgoing()).await,
    };

    match result {
        Ok(response) => {
            state.stats.forwarded.fetch_add(1, Ordering::Relaxed);
            let mut resp_headers = response.headers;
            headers::strip_response_hop_by_hop(&mut resp_headers);
            let mut builder = Response::builder().status(response.status);
            for (key, value) in &resp_headers {
                builder = builder.header(key, value);
            }
            builder
                .header("x-correlation-id", &correlation_id)
                .body(axum::body::Body::from(response.body))
                .unwrap_or_else(|e| {
                    tracing::error!(
                        correlation_id = %correlation_id,
                        error = %e,
                        "failed to build response"
                    );
                    StatusCode::BAD_GATEWAY.into_response()
                })
        }
        Err(e) => {
            tracing::warn!(
                correlation_id = %correlation_id,
                error = %e,
                "network fetch failed"
            );
            state.stats.failed.fetch_add(1, Ordering::Relaxed);
            match e {
                RelayError::NetworkTimeout { .. } => StatusCode::GATEWAY_TIMEOUT.into_response(),
                _ => StatusCode::BAD_GATEWAY.into_response(),
            }
        }
    }
}

/// Build the fetch-event view of an inbound HTTP request.
///
/// The URL is the page-facing origin joined with the request path and
/// query. Fetch metadata comes from the `Sec-Fetch-*` headers browsers
/// send, and the cache directive from `Cache-Control`.
#[must_use]
pub fn intercepted_from_parts(
    origin: &url::Url,
    method: Method,
    uri: &Uri,
    mut headers: HeaderMap,
    body: Bytes,
) -> InterceptedRequest {
    let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
    let url = format!("{}{path_and_query}", origin.origin().ascii_serialization());

    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let client_id = header(CLIENT_ID_HEADER).filter(|id| !id.is_empty());
    let destination = header("sec-fetch-dest").map(Destination::new).unwrap_or_default();
    let mode = header("sec-fetch-mode").map_or(RequestMode::Cors, |m| RequestMode::parse(&m));
    let cache = header("cache-control").map_or(CacheMode::Default, |cc| cache_mode_from(&cc));
    let referrer = header("referer").unwrap_or_else(|| "about:client".to_string());
    let referrer_policy = header("referrer-policy").unwrap_or_default();

    headers.remove(CLIENT_ID_HEADER);

    let mut request = InterceptedRequest::new(method, url)
        .with_headers(headers)
        .with_body(body)
        .with_cache(cache)
        .with_mode(mode)
        .with_destination(destination);
    request.client_id = client_id;
    request.referrer = referrer;
    request.referrer_policy = referrer_policy;
    request
}

fn cache_mode_from(cache_control: &str) -> CacheMode {
    let directives: Vec<String> = cache_control
        .split(',')
        .map(|d| d.trim().to_ascii_lowercase())
        .collect();
    let has = |name: &str| directives.iter().any(|d| d == name);

    if has("only-if-cached") {
        CacheMode::OnlyIfCached
    } else if has("no-store") {
        CacheMode::NoStore
    } else if has("no-cache") {
        CacheMode::NoCache
    } else {
        CacheMode::Default
    }
}
