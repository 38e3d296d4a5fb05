//! Per-request transformation policy.
//!
//! [`plan`] decides, from the intercepted request and the current
//! configuration record, whether the URL is rewritten, whether Basic
//! credentials are appended, and which cache directive, credentials policy,
//! and network mode the outgoing request uses. The result is a [`Plan`]
//! that [`Plan::apply`] turns into an [`OutgoingRequest`].
//!
//! Two addressing modes exist. In **URL-rewrite** mode a request is in
//! scope when its URL starts with `proxyBaseUrl`, and that prefix is
//! replaced by `baseUrl`. In **passthrough** mode a request is in scope
//! when its URL already starts with `baseUrl`, and only headers and mode
//! change. [`AddressingMode::Auto`] picks per record.

use axum::http::HeaderValue;
use serde::Serialize;
use url::Url;

use super::headers::{append_authorization, basic_authorization};
use super::request::{CacheMode, CredentialsMode, InterceptedRequest, OutgoingRequest, RequestMode};
use crate::config::model::ProxyConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AddressingMode {
    /// URL-rewrite when the record has a `proxyBaseUrl`, passthrough otherwise
    #[default]
    Auto,
    /// Only requests under `proxyBaseUrl` are proxied, with the prefix replaced
    Rewrite,
    /// Only requests already under `baseUrl` are proxied, URL unchanged
    Passthrough,
}

#[derive(Debug, Clone, Default)]
pub struct PolicySettings {
    pub addressing: AddressingMode,
    /// Origin of the intercepting process. `None` treats every target as cross-origin.
    pub origin: Option<Url>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    OutOfScope,
    Passthrough,
    Rewrite { url: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub url: Option<String>,
    pub authorization: Option<HeaderValue>,
    pub cache: Option<CacheMode>,
    pub credentials: Option<CredentialsMode>,
    pub mode: Option<RequestMode>,
}

impl Plan {
    /// Nothing to change: the original request goes out untouched.
    #[must_use]
    pub const fn is_passthrough(&self) -> bool {
        self.url.is_none()
            && self.authorization.is_none()
            && self.cache.is_none()
            && self.credentials.is_none()
            && self.mode.is_none()
    }

    #[must_use]
    pub fn apply(self, request: InterceptedRequest) -> OutgoingRequest {
        let mut outgoing = request.into_outgoing();
        if let Some(url) = self.url {
            outgoing.url = url;
        }
        if let Some(value) = self.authorization {
            append_authorization(&mut outgoing.headers, value);
        }
        if let Some(cache) = self.cache {
            outgoing.cache = cache;
        }
        if let Some(credentials) = self.credentials {
            outgoing.credentials = credentials;
        }
        if let Some(mode) = self.mode {
            outgoing.mode = mode;
        }
        outgoing
    }
}

/// Decide how `request` goes out under `config`.
#[must_use]
pub fn plan(
    request: &InterceptedRequest,
    config: Option<&ProxyConfig>,
    settings: &PolicySettings,
) -> Plan {
    let mut plan = Plan::default();
    let config = config.filter(|c| !c.is_inert());

    let target = config.and_then(|config| match scope(&request.url, config, settings) {
        Scope::OutOfScope => None,
        Scope::Passthrough => Some((config, request.url.clone(), false)),
        Scope::Rewrite { url } => Some((config, url, true)),
    });

    if let Some((config, target_url, rewritten)) = target {
        let injecting = match basic_authorization(config) {
            Some(value) => {
                plan.authorization = Some(value);
                plan.credentials = Some(CredentialsMode::Include);
                true
            }
            None => false,
        };
        if (injecting || rewritten) && !is_same_origin(&target_url, settings.origin.as_ref()) {
            plan.mode = Some(RequestMode::Cors);
        }
        if rewritten {
            plan.url = Some(target_url);
        }
    }

    // only-if-cached throws for anything but same-origin, so decide on the
    // original mode plus whatever this plan is about to switch it to.
    if request.cache == CacheMode::OnlyIfCached {
        let leaves_same_origin = request.mode != RequestMode::SameOrigin
            || plan.mode.is_some_and(|m| m != RequestMode::SameOrigin)
            || config.is_some_and(ProxyConfig::injects_credentials);
        if leaves_same_origin {
            plan.cache = Some(CacheMode::Default);
        }
    }

    plan
}

/// Whether `url` is proxied under `config`, and where it goes.
#[must_use]
pub fn scope(url: &str, config: &ProxyConfig, settings: &PolicySettings) -> Scope {
    let rewrite = match settings.addressing {
        AddressingMode::Auto => config.proxy_base_url.is_some(),
        AddressingMode::Rewrite => true,
        AddressingMode::Passthrough => false,
    };

    if rewrite {
        let Some(prefix) = config.proxy_base_url.as_deref().filter(|p| !p.is_empty()) else {
            return Scope::OutOfScope;
        };
        return prefix_candidates(prefix, settings.origin.as_ref())
            .iter()
            .find_map(|candidate| strip_path_prefix(url, candidate))
            .map(|rest| format!("{}{rest}", config.base_url))
            .filter(|rewritten| same_origin_as(rewritten, &config.base_url))
            .map_or(Scope::OutOfScope, |url| Scope::Rewrite { url });
    }

    if !config.base_url.is_empty()
        && strip_path_prefix(url, &config.base_url).is_some()
        && same_origin_as(url, &config.base_url)
    {
        Scope::Passthrough
    } else {
        Scope::OutOfScope
    }
}

/// Strip `prefix` only where it ends on a path boundary, so `/api` matches
/// `/api/x` and `/api?q` but not `/api.evil.com` or `/api@evil.com`.
fn strip_path_prefix<'a>(url: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = url.strip_prefix(prefix)?;
    let on_boundary = rest.is_empty()
        || prefix.ends_with('/')
        || rest.starts_with(['/', '?', '#']);
    on_boundary.then_some(rest)
}

/// Whether `url` still points at the origin of `base_url`.
fn same_origin_as(url: &str, base_url: &str) -> bool {
    match (Url::parse(url), Url::parse(base_url)) {
        (Ok(url), Ok(base)) => url.origin() == base.origin(),
        _ => false,
    }
}

/// The prefix as written, plus its absolute form when it is origin-relative.
fn prefix_candidates(prefix: &str, origin: Option<&Url>) -> Vec<String> {
    let mut candidates = Vec::with_capacity(2);
    if prefix.starts_with('/') {
        if let Some(origin) = origin {
            candidates.push(format!("{}{prefix}", origin.origin().ascii_serialization()));
        }
    }
    candidates.push(prefix.to_string());
    candidates
}

fn is_same_origin(target: &str, origin: Option<&Url>) -> bool {
    let (Some(origin), Ok(target)) = (origin, Url::parse(target)) else {
        return false;
    };
    target.origin() == origin.origin()
}
