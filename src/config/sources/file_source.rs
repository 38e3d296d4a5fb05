//! Generic async file-based record source with SHA256 versioning.
//!
//! [`FileSource`] implements [`ConfigSource`] for any file format by
//! accepting a deserialization function at construction time. It re-reads
//! the file on every load, so edits are picked up by the next
//! `get-configuration` round-trip without restarting the host.

use std::path::PathBuf;

use async_trait::async_trait;

use super::sha256_hex;
use crate::config::model::ProxyConfig;
use crate::config::validation::validate;
use crate::config::{ConfigSource, ConfigVersion};
use crate::error::RelayError;

type Deserialize = fn(&str) -> Result<ProxyConfig, Box<dyn std::error::Error + Send + Sync>>;

pub struct FileSource {
    path: PathBuf,
    name: &'static str,
    deserialize: Deserialize,
}

impl FileSource {
    #[must_use]
    pub fn new(path: PathBuf, name: &'static str, deserialize: Deserialize) -> Self {
        Self {
            path,
            name,
            deserialize,
        }
    }

    async fn read_content(&self) -> Result<String, RelayError> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RelayError::ConfigFileNotFound {
                    path: self.path.clone(),
                }
            } else {
                RelayError::Io(e)
            }
        })
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn load(&self) -> Result<(ProxyConfig, ConfigVersion), RelayError> {
        let content = self.read_content().await?;

        let config = (self.deserialize)(&content).map_err(|e| RelayError::ConfigParse {
            path: self.path.display().to_string(),
            source: e,
        })?;

        if let Err(errors) = validate(&config) {
            return Err(RelayError::ConfigValidation { errors });
        }

        let hash = sha256_hex(content.as_bytes());
        Ok((config, ConfigVersion::Hash(hash)))
    }
}
