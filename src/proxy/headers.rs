//! Header construction, credential encoding, and hop-by-hop stripping.
//!
//! [`basic_authorization`] builds the `Authorization: Basic` value from a
//! configuration record. [`build_upstream_headers`] prepares the header map
//! for the network primitive: hop-by-hop headers are removed, `Host` is
//! rewritten for the target, and the fetch metadata that has a header
//! equivalent (cache directive, referrer, credentials policy) is applied.

use std::sync::LazyLock;

use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, COOKIE, HOST, REFERER, VIA};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::request::{CredentialsMode, OutgoingRequest};
use crate::config::model::ProxyConfig;

/// Token added to `Via` on every upstream request; seeing it inbound means a loop.
pub const VIA_TOKEN: &str = "1.1 authrelay";

static HOP_BY_HOP: LazyLock<Vec<HeaderName>> = LazyLock::new(|| {
    [
        "connection",
        "keep-alive",
        "transfer-encoding",
        "te",
        "trailer",
        "upgrade",
        "proxy-authorization",
        "proxy-authenticate",
    ]
    .iter()
    .filter_map(|name| name.parse::<HeaderName>().ok())
    .collect()
});

/// Base64 credentials: `username` alone, or `username:password`.
#[must_use]
pub fn basic_credentials(username: &str, password: Option<&str>) -> String {
    let raw = match password {
        Some(password) => format!("{username}:{password}"),
        None => username.to_string(),
    };
    STANDARD.encode(raw)
}

/// `Basic <credentials>` for records that carry a username.
#[must_use]
pub fn basic_authorization(config: &ProxyConfig) -> Option<HeaderValue> {
    let username = config.username.as_deref()?;
    let encoded = basic_credentials(username, config.password.as_deref());
    let mut value = HeaderValue::from_str(&format!("Basic {encoded}")).ok()?;
    value.set_sensitive(true);
    Some(value)
}

/// Append `Authorization` without touching existing values.
pub fn append_authorization(headers: &mut HeaderMap, value: HeaderValue) {
    headers.append(AUTHORIZATION, value);
}

/// Strip hop-by-hop headers and `content-length` from an upstream response.
///
/// The body has already been fully collected by the network primitive, so
/// `transfer-encoding` and `content-length` from the origin are no longer
/// accurate. Axum will set the correct `content-length` based on the actual
/// body bytes.
pub fn strip_response_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove(hyper::header::CONTENT_LENGTH);
}

/// Whether an inbound request already went through this proxy.
#[must_use]
pub fn has_looped(headers: &HeaderMap) -> bool {
    headers
        .get_all(VIA)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.split(',').any(|hop| hop.trim() == VIA_TOKEN))
}

pub fn build_upstream_headers(request: &OutgoingRequest, target_url: &url::Url) -> HeaderMap {
    let mut headers = request.headers.clone();

    for header_name in HOP_BY_HOP.iter() {
        headers.remove(header_name);
    }
    headers.remove(hyper::header::CONTENT_LENGTH);

    // Rewrite Host
    if let Some(host) = target_url.host_str() {
        let host_value = target_url
            .port()
            .map_or_else(|| host.to_string(), |port| format!("{host}:{port}"));
        if let Ok(val) = HeaderValue::from_str(&host_value) {
            headers.insert(HOST, val);
        }
    }

    if request.credentials == CredentialsMode::Omit {
        headers.remove(COOKIE);
    }

    if !headers.contains_key(CACHE_CONTROL) {
        if let Some(directive) = request.cache.cache_control() {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static(directive));
        }
    }

    if !headers.contains_key(REFERER) && request.referrer_policy != "no-referrer" {
        let referrer = url::Url::parse(&request.referrer)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"));
        if let Some(val) = referrer.and_then(|u| HeaderValue::from_str(u.as_str()).ok()) {
            headers.insert(REFERER, val);
        }
    }

    let via = headers
        .get(VIA)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| VIA_TOKEN.to_string(), |existing| format!("{existing}, {VIA_TOKEN}"));
    if let Ok(val) = HeaderValue::from_str(&via) {
        headers.insert(VIA, val);
    }

    headers
}
