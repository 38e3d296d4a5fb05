//! The network primitive outgoing requests are delivered through.
//!
//! [`Network`] is the seam between the worker and the transport. The
//! HTTP host uses [`HyperNetwork`], a pooled hyper client bounded by a
//! per-request timeout. Failures propagate to the caller unchanged; there
//! is no retry.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use sha2::{Digest, Sha256, Sha384, Sha512};

use super::headers::build_upstream_headers;
use super::request::{OutgoingRequest, RedirectMode};
use crate::error::RelayError;
use crate::server::HttpClient;

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: OutgoingRequest) -> Result<FetchResponse, RelayError>;
}

pub struct HyperNetwork {
    client: HttpClient,
    timeout: Duration,
}

impl HyperNetwork {
    #[must_use]
    pub const fn new(client: HttpClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl Network for HyperNetwork {
    #[allow(clippy::cast_possible_truncation)]
    async fn fetch(&self, request: OutgoingRequest) -> Result<FetchResponse, RelayError> {
        let target = url::Url::parse(&request.url).map_err(|e| RelayError::UriParse {
            source: Box::new(e),
        })?;
        let headers = build_upstream_headers(&request, &target);

        let mut builder = hyper::Request::builder()
            .method(request.method.clone())
            .uri(target.as_str());
        for (key, value) in &headers {
            builder = builder.header(key, value);
        }
        let upstream = builder
            .body(Full::new(request.body.clone()))
            .map_err(|e| RelayError::HttpRequest {
                source: Box::new(e),
            })?;

        let start = Instant::now();
        let response = tokio::time::timeout(self.timeout, self.client.request(upstream))
            .await
            .map_err(|_| RelayError::NetworkTimeout {
                url: request.url.clone(),
                timeout_ms: self.timeout.as_millis() as u64,
            })?
            .map_err(|e| RelayError::Network {
                url: request.url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| RelayError::Network {
                url: request.url.clone(),
                reason: format!("body read error: {e}"),
            })?
            .to_bytes();

        tracing::debug!(
            url = %request.url,
            status = status.as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "upstream responded"
        );

        if request.redirect == RedirectMode::Error && status.is_redirection() {
            return Err(RelayError::Network {
                url: request.url,
                reason: format!("redirect ({status}) not allowed by redirect mode 'error'"),
            });
        }

        if !request.integrity.is_empty() && !verify_integrity(&request.integrity, &body) {
            return Err(RelayError::Network {
                url: request.url,
                reason: "response does not match integrity metadata".into(),
            });
        }

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}

/// Check a subresource-integrity string (`sha256-…`, `sha384-…`, `sha512-…`).
///
/// Only the strongest algorithm present is considered; any matching digest
/// among its entries passes. Metadata without a supported algorithm passes.
#[must_use]
pub fn verify_integrity(integrity: &str, body: &[u8]) -> bool {
    let entries: Vec<(&str, &str)> = integrity
        .split_whitespace()
        .filter_map(|token| token.split('?').next()?.split_once('-'))
        .filter(|(alg, _)| matches!(*alg, "sha256" | "sha384" | "sha512"))
        .collect();

    let Some(strongest) = ["sha512", "sha384", "sha256"]
        .into_iter()
        .find(|alg| entries.iter().any(|(a, _)| a == alg))
    else {
        return true;
    };

    let actual = match strongest {
        "sha512" => STANDARD.encode(Sha512::digest(body)),
        "sha384" => STANDARD.encode(Sha384::digest(body)),
        _ => STANDARD.encode(Sha256::digest(body)),
    };

    entries
        .iter()
        .filter(|(alg, _)| *alg == strongest)
        .any(|(_, digest)| *digest == actual)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sri(alg: &str, body: &[u8]) -> String {
        let digest = match alg {
            "sha512" => STANDARD.encode(Sha512::digest(body)),
            "sha384" => STANDARD.encode(Sha384::digest(body)),
            _ => STANDARD.encode(Sha256::digest(body)),
        };
        format!("{alg}-{digest}")
    }

    #[test]
    fn matching_digest_passes() {
        assert!(verify_integrity(&sri("sha256", b"hello"), b"hello"));
        assert!(verify_integrity(&sri("sha384", b"hello"), b"hello"));
    }

    #[test]
    fn mismatching_digest_fails() {
        assert!(!verify_integrity(&sri("sha256", b"hello"), b"tampered"));
    }

    #[test]
    fn strongest_algorithm_wins() {
        let metadata = format!("{} sha512-bogus", sri("sha256", b"hello"));
        assert!(!verify_integrity(&metadata, b"hello"));
    }

    #[test]
    fn unknown_algorithms_are_ignored() {
        assert!(verify_integrity("md5-abcdef", b"anything"));
    }
}
