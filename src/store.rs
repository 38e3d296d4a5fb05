//! Process-local configuration cache.
//!
//! [`ConfigStore`] holds at most one [`ProxyConfig`] record. It is
//! populated lazily through a [`ConfigFetcher`] on the first request that
//! carries a client id, replaced wholesale by pushed records, and cleared by
//! invalidation. Nothing is persisted: a restarted process always starts
//! [`CacheState::Uncached`], and callers must treat a cold cache as a normal
//! state rather than an error.
//!
//! The slot lock is never held across an `.await`. Concurrent misses may
//! each run a round-trip; whichever resolves last wins.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::config::model::ProxyConfig;
use crate::fetcher::ConfigFetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    Uncached,
    Cached,
}

#[derive(Debug, Default)]
pub struct StoreStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub fetch_failures: AtomicU64,
    pub invalidations: AtomicU64,
    pub pushes: AtomicU64,
}

pub struct ConfigStore {
    slot: Mutex<Option<Arc<ProxyConfig>>>,
    fetcher: Arc<dyn ConfigFetcher>,
    stats: StoreStats,
}

impl ConfigStore {
    #[must_use]
    pub fn new(fetcher: Arc<dyn ConfigFetcher>) -> Self {
        Self {
            slot: Mutex::new(None),
            fetcher,
            stats: StoreStats::default(),
        }
    }

    /// Return the cached record, fetching it from `client_id` on a miss.
    pub async fn get(&self, client_id: Option<&str>) -> Option<Arc<ProxyConfig>> {
        if let Some(config) = self.current() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Some(config);
        }

        let client_id = client_id.filter(|id| !id.is_empty())?;
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        let Some(config) = self.fetcher.fetch(client_id).await else {
            self.stats.fetch_failures.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let config = Arc::new(config);
        *self.lock() = Some(Arc::clone(&config));
        Some(config)
    }

    /// Replace the cached record unconditionally.
    pub fn set(&self, config: ProxyConfig) {
        self.stats.pushes.fetch_add(1, Ordering::Relaxed);
        *self.lock() = Some(Arc::new(config));
    }

    /// Clear the cached record. Idempotent.
    pub fn invalidate(&self) {
        self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        *self.lock() = None;
    }

    #[must_use]
    pub fn current(&self) -> Option<Arc<ProxyConfig>> {
        self.lock().clone()
    }

    #[must_use]
    pub fn state(&self) -> CacheState {
        if self.lock().is_some() {
            CacheState::Cached
        } else {
            CacheState::Uncached
        }
    }

    #[must_use]
    pub const fn stats(&self) -> &StoreStats {
        &self.stats
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Arc<ProxyConfig>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
