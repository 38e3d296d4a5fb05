//! Configuration record model, validation, and file-backed sources.
//!
//! Defines the [`ConfigSource`] trait used by the bundled controlling
//! client to obtain a [`ProxyConfig`](model::ProxyConfig) record, and the
//! [`ConfigVersion`] used to report which record revision was served.
//! Submodules provide the data model, validation logic, and concrete
//! file sources.

pub mod model;
pub mod sources;
pub mod validation;

use async_trait::async_trait;

use crate::error::RelayError;
use model::ProxyConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigVersion {
    Hash(String),
}

impl ConfigVersion {
    #[must_use]
    pub fn short(&self) -> &str {
        match self {
            Self::Hash(h) => h.get(..8).unwrap_or(h),
        }
    }
}

// async_trait is required here because ConfigSource is used as Box<dyn ConfigSource>
// and native async fn in traits (Rust 1.75+) does not support dyn dispatch.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn load(&self) -> Result<(ProxyConfig, ConfigVersion), RelayError>;
}
