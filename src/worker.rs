//! The interception worker: lifecycle, inbound messages, and fetch events.
//!
//! A [`Worker`] owns one [`ConfigStore`] and the network primitive. The
//! host delivers three kinds of events to it:
//!
//! - lifecycle: [`Worker::install`] forces immediate activation and
//!   [`Worker::activate`] claims every existing client;
//! - messages: [`Worker::handle_message`] invalidates or replaces the
//!   cached record;
//! - fetches: [`Worker::handle_fetch`] either declines (script
//!   destinations) or responds with the proxied outcome.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::config::validation::validate;
use crate::error::{RelayError, ValidationError};
use crate::protocol::WorkerMessage;
use crate::proxy::network::{FetchResponse, Network};
use crate::proxy::policy::{self, PolicySettings};
use crate::proxy::request::InterceptedRequest;
use crate::store::ConfigStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
        };
        f.write_str(name)
    }
}

/// Lifecycle hooks provided by the hosting environment.
#[async_trait]
pub trait LifecycleHost: Send + Sync {
    /// Activate without waiting for older instances to finish.
    async fn skip_waiting(&self) -> Result<(), RelayError>;

    /// Take control of every existing client. Returns how many were claimed.
    async fn claim_clients(&self) -> Result<usize, RelayError>;
}

#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted; the host applies its default handling.
    Default(InterceptedRequest),
    Responded(Result<FetchResponse, RelayError>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Invalidated,
    Replaced { fingerprint: String },
    Rejected(Vec<ValidationError>),
}

pub struct Worker {
    store: Arc<ConfigStore>,
    network: Arc<dyn Network>,
    settings: PolicySettings,
    state: Mutex<WorkerState>,
}

impl Worker {
    #[must_use]
    pub fn new(store: Arc<ConfigStore>, network: Arc<dyn Network>, settings: PolicySettings) -> Self {
        Self {
            store,
            network,
            settings,
            state: Mutex::new(WorkerState::Parsed),
        }
    }

    pub async fn install(&self, host: &dyn LifecycleHost) -> Result<(), RelayError> {
        self.transition(WorkerState::Installing);
        host.skip_waiting().await?;
        self.transition(WorkerState::Installed);
        Ok(())
    }

    pub async fn activate(&self, host: &dyn LifecycleHost) -> Result<usize, RelayError> {
        self.transition(WorkerState::Activating);
        let claimed = host.claim_clients().await?;
        self.transition(WorkerState::Activated);
        tracing::info!(claimed, "worker activated");
        Ok(claimed)
    }

    pub fn handle_message(&self, payload: Value) -> MessageOutcome {
        match WorkerMessage::decode(payload) {
            WorkerMessage::Invalidate => {
                self.store.invalidate();
                tracing::info!("configuration invalidated");
                MessageOutcome::Invalidated
            }
            WorkerMessage::SetConfig { config } => {
                if let Err(errors) = validate(&config) {
                    tracing::warn!(errors = errors.len(), "pushed configuration rejected");
                    return MessageOutcome::Rejected(errors);
                }
                let fingerprint = config.fingerprint();
                self.store.set(config);
                tracing::info!(fingerprint = %fingerprint, "configuration replaced");
                MessageOutcome::Replaced { fingerprint }
            }
        }
    }

    pub async fn handle_fetch(&self, request: InterceptedRequest) -> FetchOutcome {
        // Intercepting the fetch of this worker's own script can deadlock a
        // reinstall, so scripts always get the host's default handling.
        if request.destination.is_script() {
            tracing::debug!(url = %request.url, "script request not intercepted");
            return FetchOutcome::Default(request);
        }
        FetchOutcome::Responded(self.proxy_fetch(request).await)
    }

    /// Apply the policy and deliver the request.
    pub async fn proxy_fetch(&self, request: InterceptedRequest) -> Result<FetchResponse, RelayError> {
        let config = self.store.get(request.client_id.as_deref()).await;
        let plan = policy::plan(&request, config.as_deref(), &self.settings);

        if plan.is_passthrough() {
            tracing::debug!(url = %request.url, "forwarding unmodified");
        } else {
            tracing::debug!(
                url = %request.url,
                target = plan.url.as_deref().unwrap_or(&request.url),
                credentials = plan.authorization.is_some(),
                mode = plan.mode.map_or("unchanged", |m| m.as_str()),
                cache_downgraded = plan.cache.is_some(),
                "forwarding transformed"
            );
        }

        self.network.fetch(plan.apply(request)).await
    }

    #[must_use]
    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    #[must_use]
    pub const fn settings(&self) -> &PolicySettings {
        &self.settings
    }

    fn transition(&self, next: WorkerState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(from = %*state, to = %next, "worker state");
        *state = next;
    }
}
