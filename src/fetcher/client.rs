//! Controlling-client handles and the file-backed stand-in client.
//!
//! The host environment owns the pages that control this worker. It exposes
//! them through a [`ClientRegistry`] that resolves a client id to a
//! [`ControllingClient`] handle. [`FileClients`] is the registry used by the
//! bundled HTTP host: every client id resolves to a client that answers
//! `get-configuration` from a record file.

use std::sync::Arc;

use async_trait::async_trait;

use super::channel::ReplyPort;
use crate::config::ConfigSource;
use crate::protocol::{ClientMessage, ConfigReply};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("client '{0}' is gone")]
    Gone(String),

    #[error("client '{client_id}' rejected the message: {reason}")]
    Rejected { client_id: String, reason: String },
}

/// A handle to one controlling page.
pub trait ControllingClient: Send + Sync {
    fn id(&self) -> &str;

    /// Post `message` as data and hand over `transfer` out of band.
    fn post_message(&self, message: ClientMessage, transfer: ReplyPort) -> Result<(), ClientError>;
}

#[async_trait]
pub trait ClientRegistry: Send + Sync {
    /// Resolve a client id. `Ok(None)` means the id is unknown.
    async fn get(&self, client_id: &str) -> Result<Option<Arc<dyn ControllingClient>>, ClientError>;

    /// Take control of every existing client. Returns how many were claimed.
    async fn claim(&self) -> Result<usize, ClientError>;
}

/// Registry whose clients all answer from the same record source.
///
/// Client handles are built per lookup and keep no connection open, so the
/// registry holds no per-id state and there is never anything to claim.
pub struct FileClients {
    source: Arc<dyn ConfigSource>,
}

impl FileClients {
    #[must_use]
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self { source }
    }

    #[must_use]
    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }
}

#[async_trait]
impl ClientRegistry for FileClients {
    async fn get(&self, client_id: &str) -> Result<Option<Arc<dyn ControllingClient>>, ClientError> {
        if client_id.is_empty() {
            return Ok(None);
        }
        Ok(Some(Arc::new(FileClient {
            id: client_id.to_string(),
            source: Arc::clone(&self.source),
        })))
    }

    async fn claim(&self) -> Result<usize, ClientError> {
        Ok(0)
    }
}

struct FileClient {
    id: String,
    source: Arc<dyn ConfigSource>,
}

impl ControllingClient for FileClient {
    fn id(&self) -> &str {
        &self.id
    }

    fn post_message(&self, message: ClientMessage, transfer: ReplyPort) -> Result<(), ClientError> {
        match message {
            ClientMessage::GetConfiguration => {
                let source = Arc::clone(&self.source);
                let client_id = self.id.clone();
                // Answer asynchronously, like a page's message handler would.
                tokio::spawn(async move {
                    let reply = match source.load().await {
                        Ok((config, version)) => {
                            tracing::debug!(
                                client_id = %client_id,
                                source = source.name(),
                                version = version.short(),
                                "serving configuration"
                            );
                            ConfigReply::Config(config)
                        }
                        Err(e) => {
                            tracing::warn!(
                                client_id = %client_id,
                                source = source.name(),
                                error = %e,
                                "configuration unavailable"
                            );
                            ConfigReply::Error(e.to_string())
                        }
                    };
                    if transfer.post(reply.encode()).is_err() {
                        tracing::debug!(client_id = %client_id, "worker stopped waiting for reply");
                    }
                });
                Ok(())
            }
        }
    }
}
