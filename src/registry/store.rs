//! Relay registry implementation
//!
//! The central registry that owns one relay per upstream URL.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::config::{RegistryConfig, MIN_CLEANUP_INTERVAL};
use super::error::RegistryError;
use crate::error::Result;
use crate::relay::Relay;
use crate::stats::RelayStats;

/// Central registry for all relays
///
/// Keys are normalized upstream URLs, so `HTTP://Cam/a` and `http://cam/a`
/// share a relay.
pub struct RelayRegistry {
    /// Map of upstream URL to its relay
    relays: Mutex<HashMap<String, Arc<Relay>>>,

    /// Configuration
    config: RegistryConfig,

    /// Parent of every relay's task tokens
    shutdown: CancellationToken,
}

impl RelayRegistry {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            relays: Mutex::new(HashMap::new()),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Get the running relay for `url`, creating and starting it if needed
    ///
    /// Must be called from within a Tokio runtime. Concurrent callers for the
    /// same URL always get the same relay.
    pub fn get_or_create(&self, url: &str) -> Result<Arc<Relay>> {
        let url = parse_upstream(url)?;
        let key = url.to_string();

        let mut relays = self.relays.lock();
        if self.shutdown.is_cancelled() {
            return Err(RegistryError::ShuttingDown.into());
        }
        if let Some(relay) = relays.get(&key) {
            return Ok(Arc::clone(relay));
        }

        let relay = Arc::new(Relay::with_shutdown(
            url,
            self.config.relay.clone(),
            self.shutdown.child_token(),
        )?);
        relay.start();
        relays.insert(key.clone(), Arc::clone(&relay));

        tracing::info!(url = %key, relays = relays.len(), "Relay created");

        Ok(relay)
    }

    /// Get the relay for `url` if one exists
    pub fn get(&self, url: &str) -> Option<Arc<Relay>> {
        let key = parse_upstream(url).ok()?.to_string();
        self.relays.lock().get(&key).cloned()
    }

    /// Stop and drop the relay for `url`; returns whether one existed
    pub async fn remove(&self, url: &str) -> bool {
        let Ok(url) = parse_upstream(url) else {
            return false;
        };
        let removed = self.relays.lock().remove(url.as_str());
        let Some(relay) = removed else {
            return false;
        };

        relay.stop().await;
        tracing::info!(url = %url, "Relay removed");
        true
    }

    /// Stop relays that have had no viewers for longer than the idle timeout
    ///
    /// Returns the number of relays stopped. Does nothing when no idle
    /// timeout is configured.
    pub async fn cleanup(&self) -> usize {
        let Some(idle_timeout) = self.config.idle_timeout else {
            return 0;
        };

        let idle: Vec<(String, Arc<Relay>)> = {
            let mut relays = self.relays.lock();
            let keys: Vec<String> = relays
                .iter()
                .filter(|(_, relay)| {
                    relay.viewer_count() == 0
                        && relay.idle_for().is_some_and(|idle| idle > idle_timeout)
                })
                .map(|(key, _)| key.clone())
                .collect();

            keys.into_iter()
                .filter_map(|key| relays.remove(&key).map(|relay| (key, relay)))
                .collect()
        };

        let stopped = idle.len();
        for (key, relay) in idle {
            relay.stop().await;
            tracing::info!(url = %key, "Idle relay removed by cleanup");
        }
        stopped
    }

    /// Spawn background cleanup task
    ///
    /// The task ends when the registry is shut down.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = registry.config.cleanup_interval.max(MIN_CLEANUP_INTERVAL);
        let shutdown = registry.shutdown.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        registry.cleanup().await;
                    }
                }
            }
        })
    }

    /// Stop every relay and refuse new ones
    pub async fn shutdown_all(&self) {
        self.shutdown.cancel();
        let relays: Vec<Arc<Relay>> = self.relays.lock().drain().map(|(_, relay)| relay).collect();

        let count = relays.len();
        futures::future::join_all(relays.iter().map(|relay| relay.stop())).await;

        tracing::info!(relays = count, "All relays stopped");
    }

    /// Whether `shutdown_all` has been called
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Upstream URLs with a relay
    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.relays.lock().keys().cloned().collect();
        urls.sort();
        urls
    }

    /// Status of every relay, keyed by upstream URL
    pub fn stats(&self) -> HashMap<String, RelayStats> {
        let relays: Vec<(String, Arc<Relay>)> = self
            .relays
            .lock()
            .iter()
            .map(|(key, relay)| (key.clone(), Arc::clone(relay)))
            .collect();

        relays
            .into_iter()
            .map(|(key, relay)| (key, relay.get_status()))
            .collect()
    }

    /// Get total number of relays
    pub fn relay_count(&self) -> usize {
        self.relays.lock().len()
    }
}

impl Default for RelayRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_upstream(url: &str) -> std::result::Result<Url, RegistryError> {
    let parsed = Url::parse(url).map_err(|e| RegistryError::InvalidUrl(url.to_string(), e))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(RegistryError::UnsupportedScheme(url.to_string())),
    }
}
