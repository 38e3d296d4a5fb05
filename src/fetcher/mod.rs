//! Configuration retrieval from the controlling client.
//!
//! On a cache miss the [`ConfigStore`](crate::store::ConfigStore) asks a
//! [`ConfigFetcher`] for a record. [`ChannelFetcher`] implements the
//! one-shot round-trip: resolve the client, open a private reply channel,
//! post `get-configuration` with the port transferred out of band, and
//! await exactly one reply. Every failure is absorbed and reported as
//! `None`; nothing is retried.

pub mod channel;
pub mod client;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::model::ProxyConfig;
use crate::protocol::{ClientMessage, ConfigReply};
use channel::ReplyChannel;
use client::ClientRegistry;

/// Default bound on the reply wait.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait ConfigFetcher: Send + Sync {
    async fn fetch(&self, client_id: &str) -> Option<ProxyConfig>;
}

pub struct ChannelFetcher {
    clients: Arc<dyn ClientRegistry>,
    reply_timeout: Option<Duration>,
}

impl ChannelFetcher {
    #[must_use]
    pub fn new(clients: Arc<dyn ClientRegistry>) -> Self {
        Self {
            clients,
            reply_timeout: Some(DEFAULT_REPLY_TIMEOUT),
        }
    }

    /// `None` waits for the reply indefinitely.
    #[must_use]
    pub const fn with_reply_timeout(mut self, reply_timeout: Option<Duration>) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }
}

#[async_trait]
impl ConfigFetcher for ChannelFetcher {
    async fn fetch(&self, client_id: &str) -> Option<ProxyConfig> {
        let client = match self.clients.get(client_id).await {
            Ok(Some(client)) => client,
            Ok(None) => {
                tracing::debug!(client_id = %client_id, "client not found");
                return None;
            }
            Err(e) => {
                tracing::debug!(client_id = %client_id, error = %e, "client resolution failed");
                return None;
            }
        };

        let (channel, port) = ReplyChannel::open();
        if let Err(e) = client.post_message(ClientMessage::GetConfiguration, port) {
            tracing::warn!(client_id = %client_id, error = %e, "failed to request configuration");
            return None;
        }

        let payload = match channel.await_reply(self.reply_timeout).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(client_id = %client_id, error = %e, "no configuration reply");
                return None;
            }
        };

        match ConfigReply::decode(payload).and_then(ConfigReply::into_config) {
            Ok(config) => {
                tracing::info!(
                    client_id = %client_id,
                    fingerprint = %config.fingerprint(),
                    "configuration received"
                );
                Some(config)
            }
            Err(e) => {
                tracing::warn!(client_id = %client_id, error = %e, "configuration rejected");
                None
            }
        }
    }
}
