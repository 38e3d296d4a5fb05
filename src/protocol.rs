//! Message shapes exchanged between the worker and its controlling client.
//!
//! Two paths exist:
//!
//! - **request/reply** (worker ⇒ client ⇒ worker), used on a cache miss:
//!   the worker posts [`ClientMessage::GetConfiguration`] with a transferred
//!   reply port, and the client answers once on that port with either an
//!   error object or the [`ProxyConfig`] record verbatim ([`ConfigReply`]).
//! - **inbound** (client ⇒ worker), asynchronous to any fetch: a tagged
//!   [`WorkerMessage`] that either invalidates the cache or pushes a record.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::model::ProxyConfig;
use crate::config::validation::validate;
use crate::error::{format_errors, ValidationError};

/// Requests the worker sends to the controlling client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage {
    GetConfiguration,
}

impl ClientMessage {
    /// Wire tag posted as the message data.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::GetConfiguration => "get-configuration",
        }
    }
}

impl std::fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    #[error("client reported an error: {0}")]
    Client(String),

    #[error("reply is not a configuration record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("reply record is invalid:\n{}", format_errors(.0))]
    Invalid(Vec<ValidationError>),
}

/// A reply received on the one-shot channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigReply {
    Error(String),
    Config(ProxyConfig),
}

impl ConfigReply {
    /// Interpret a raw reply payload.
    ///
    /// Any truthy `error` field marks the reply as an error; otherwise the
    /// whole payload must deserialize into a [`ProxyConfig`].
    pub fn decode(payload: Value) -> Result<Self, ReplyError> {
        if let Some(error) = payload.get("error").filter(|v| is_truthy(v)) {
            let reason = error
                .as_str()
                .map_or_else(|| error.to_string(), str::to_string);
            return Ok(Self::Error(reason));
        }
        let config: ProxyConfig = serde_json::from_value(payload)?;
        Ok(Self::Config(config))
    }

    /// Reduce to a cacheable record, rejecting errors and incomplete records.
    pub fn into_config(self) -> Result<ProxyConfig, ReplyError> {
        match self {
            Self::Error(reason) => Err(ReplyError::Client(reason)),
            Self::Config(config) => {
                validate(&config).map_err(ReplyError::Invalid)?;
                Ok(config)
            }
        }
    }

    /// Encode for the wire, as the controlling client would send it.
    #[must_use]
    pub fn encode(&self) -> Value {
        match self {
            Self::Error(reason) => serde_json::json!({ "error": reason }),
            Self::Config(config) => serde_json::to_value(config).unwrap_or(Value::Null),
        }
    }
}

/// Falsy values: `null`, `false`, `0`, `""`. Everything else is truthy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Messages the controlling client may post to the worker at any time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerMessage {
    Invalidate,
    SetConfig { config: ProxyConfig },
}

impl WorkerMessage {
    /// Decode an inbound payload.
    ///
    /// Payloads that are not a recognizable tagged message are treated as an
    /// invalidation signal.
    #[must_use]
    pub fn decode(payload: Value) -> Self {
        match serde_json::from_value::<Self>(payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, "unrecognized worker message, treating as invalidate");
                Self::Invalidate
            }
        }
    }
}
