//! Intercepted and outgoing request models.
//!
//! [`InterceptedRequest`] is what a fetch event carries: the originating
//! client id, the HTTP essentials, and the fetch metadata (cache directive,
//! credentials policy, network mode, redirect policy, referrer, integrity,
//! destination). [`OutgoingRequest`] is what reaches the network primitive.

use axum::http::{HeaderMap, Method};
use bytes::Bytes;

/// Declares a fetch-metadata enum with its wire spelling.
macro_rules! fetch_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? } default $default:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl $name {
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }

            /// Parse the wire spelling; unknown values fall back to the default.
            #[must_use]
            pub fn parse(value: &str) -> Self {
                match value.trim().to_ascii_lowercase().as_str() {
                    $($wire => Self::$variant,)+
                    _ => Self::$default,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

fetch_enum!(
    /// Request cache directive.
    CacheMode {
        Default => "default",
        NoStore => "no-store",
        Reload => "reload",
        NoCache => "no-cache",
        ForceCache => "force-cache",
        OnlyIfCached => "only-if-cached",
    } default Default
);

fetch_enum!(
    /// Whether cookies and HTTP auth travel with the request.
    CredentialsMode {
        Omit => "omit",
        SameOrigin => "same-origin",
        Include => "include",
    } default SameOrigin
);

fetch_enum!(
    /// Network mode.
    RequestMode {
        SameOrigin => "same-origin",
        NoCors => "no-cors",
        Cors => "cors",
        Navigate => "navigate",
    } default Cors
);

fetch_enum!(
    RedirectMode {
        Follow => "follow",
        Error => "error",
        Manual => "manual",
    } default Follow
);

impl CacheMode {
    /// Request `Cache-Control` directive that conveys this mode upstream.
    #[must_use]
    pub const fn cache_control(self) -> Option<&'static str> {
        match self {
            Self::Default | Self::ForceCache => None,
            Self::NoStore => Some("no-store"),
            Self::Reload | Self::NoCache => Some("no-cache"),
            Self::OnlyIfCached => Some("only-if-cached"),
        }
    }
}

/// Request destination, e.g. `document`, `script`, `image`, or empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Destination(String);

impl Destination {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().to_ascii_lowercase())
    }

    #[must_use]
    pub fn script() -> Self {
        Self::new("script")
    }

    #[must_use]
    pub fn is_script(&self) -> bool {
        self.0 == "script"
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub client_id: Option<String>,
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub cache: CacheMode,
    pub credentials: CredentialsMode,
    pub mode: RequestMode,
    pub redirect: RedirectMode,
    pub referrer: String,
    pub referrer_policy: String,
    pub integrity: String,
    pub destination: Destination,
}

impl InterceptedRequest {
    /// A request with the metadata a plain `fetch(url)` would carry.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            client_id: None,
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            cache: CacheMode::Default,
            credentials: CredentialsMode::SameOrigin,
            mode: RequestMode::Cors,
            redirect: RedirectMode::Follow,
            referrer: "about:client".to_string(),
            referrer_policy: String::new(),
            integrity: String::new(),
            destination: Destination::default(),
        }
    }

    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub const fn with_cache(mut self, cache: CacheMode) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Forward as-is.
    #[must_use]
    pub fn into_outgoing(self) -> OutgoingRequest {
        OutgoingRequest {
            method: self.method,
            url: self.url,
            headers: self.headers,
            body: self.body,
            cache: self.cache,
            credentials: self.credentials,
            mode: self.mode,
            redirect: self.redirect,
            referrer: self.referrer,
            referrer_policy: self.referrer_policy,
            integrity: self.integrity,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub cache: CacheMode,
    pub credentials: CredentialsMode,
    pub mode: RequestMode,
    pub redirect: RedirectMode,
    pub referrer: String,
    pub referrer_policy: String,
    pub integrity: String,
}
