//! Concrete [`ConfigSource`](super::ConfigSource) implementations.
//!
//! Provides file-based sources (YAML, JSON, TOML) gated by feature flags
//! and the [`parse_config_str`] helper for format-specific deserialization.

pub mod file_source;

#[cfg(feature = "yaml")]
pub mod yaml;

#[cfg(feature = "json")]
pub mod json;

#[cfg(feature = "toml")]
pub mod toml_source;

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::config::model::ProxyConfig;
use crate::config::ConfigSource;
use crate::error::RelayError;

/// Parse a config string based on file extension.
pub fn parse_config_str(
    ext: &str,
    content: &str,
    path_display: &str,
) -> Result<ProxyConfig, RelayError> {
    match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => serde_yml::from_str(content).map_err(|e| RelayError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "json")]
        "json" => serde_json::from_str(content).map_err(|e| RelayError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "toml")]
        "toml" => toml::from_str(content).map_err(|e| RelayError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        other => Err(RelayError::UnsupportedFormat(other.to_string())),
    }
}

/// Compute a lowercase hex-encoded SHA-256 digest.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Pick the file source matching the extension of `path`.
pub fn for_path(path: &Path) -> Result<Box<dyn ConfigSource>, RelayError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => Ok(Box::new(yaml::new(path.to_path_buf()))),

        #[cfg(feature = "json")]
        "json" => Ok(Box::new(json::new(path.to_path_buf()))),

        #[cfg(feature = "toml")]
        "toml" => Ok(Box::new(toml_source::new(path.to_path_buf()))),

        other => Err(RelayError::UnsupportedFormat(other.to_string())),
    }
}
