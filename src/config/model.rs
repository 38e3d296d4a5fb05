//! Serde data structures for the proxy configuration record.
//!
//! [`ProxyConfig`] is the single piece of shared state the worker caches.
//! It is delivered by the controlling client over the reply channel, pushed
//! through the inbound message path, or read from a record file by the
//! bundled file-backed client. Wire names are camelCase.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProxyConfig {
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

// Hand-written so the password never reaches a log line.
impl std::fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("base_url", &self.base_url)
            .field("proxy_base_url", &self.proxy_base_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ProxyConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            proxy_base_url: None,
            username: None,
            password: None,
        }
    }

    #[must_use]
    pub fn with_proxy_base_url(mut self, prefix: impl Into<String>) -> Self {
        self.proxy_base_url = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: Option<&str>) -> Self {
        self.username = Some(username.into());
        self.password = password.map(str::to_string);
        self
    }

    /// Whether requests in scope get an `Authorization` header.
    #[must_use]
    pub const fn injects_credentials(&self) -> bool {
        self.username.is_some()
    }

    /// An empty `baseUrl` leaves the proxy inert.
    #[must_use]
    pub fn is_inert(&self) -> bool {
        self.base_url.is_empty()
    }

    /// Short SHA-256 digest of the canonical JSON form, safe to log.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let digest = format!("{:x}", Sha256::digest(&canonical));
        digest[..12].to_string()
    }
}
