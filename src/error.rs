//! Unified error types for authrelay.
//!
//! Defines [`RelayError`] (the main crate error enum) and
//! [`ValidationError`] for configuration record failures. Both use
//! `thiserror` for `Display` and `Error` derives. Configuration-path
//! failures inside the worker never surface as `RelayError`; they are
//! logged and degrade to "no proxying".

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ValidationError {
    pub(crate) fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
            suggestion: None,
        }
    }

    #[must_use]
    pub(crate) fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "  {}: {}", self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

pub(crate) fn format_errors(errors: &[ValidationError]) -> String {
    use std::fmt::Write;
    let mut buf = String::new();
    for (i, e) in errors.iter().enumerate() {
        if i > 0 {
            buf.push('\n');
        }
        // write! to String is infallible (only fails on OOM which is unrecoverable)
        let _ = write!(buf, "{e}");
    }
    buf
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RelayError {
    #[error("Config file not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    #[error("Config parse error in {path}:\n  {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Config validation failed:\n{}", format_errors(.errors))]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Unsupported config format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("Invalid URL: {source}")]
    UriParse {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("HTTP request failed: {source}")]
    HttpRequest {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Network fetch to {url} failed: {reason}")]
    Network { url: String, reason: String },

    #[error("Network fetch to {url} timed out after {timeout_ms}ms")]
    NetworkTimeout { url: String, timeout_ms: u64 },

    #[error("Worker lifecycle step '{step}' failed: {reason}")]
    Lifecycle { step: &'static str, reason: String },

    #[error("File already exists: {}", path.display())]
    FileExists { path: PathBuf },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Health check failed with status {0}")]
    HealthCheckFailed(hyper::StatusCode),
}
