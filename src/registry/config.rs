//! Registry configuration

use std::time::Duration;

use crate::relay::RelayConfig;

/// Shortest allowed cleanup interval
pub const MIN_CLEANUP_INTERVAL: Duration = Duration::from_millis(10);

/// Registry configuration options
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    /// Settings applied to every relay the registry creates
    pub relay: RelayConfig,

    /// Stop and drop relays that have had no viewers for this long (None = never)
    pub idle_timeout: Option<Duration>,

    /// How often the cleanup task runs
    pub cleanup_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            relay: RelayConfig::default(),
            idle_timeout: None, // Relays live until shutdown
            cleanup_interval: Duration::from_secs(30),
        }
    }
}

impl RegistryConfig {
    /// Set the per-relay settings
    pub fn relay(mut self, relay: RelayConfig) -> Self {
        self.relay = relay;
        self
    }

    /// Stop relays after they have been without viewers for `timeout`
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Set cleanup interval (never below [`MIN_CLEANUP_INTERVAL`])
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval.max(MIN_CLEANUP_INTERVAL);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();

        assert_eq!(config.relay, RelayConfig::default());
        assert!(config.idle_timeout.is_none());
        assert_eq!(config.cleanup_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_idle_timeout() {
        let config = RegistryConfig::default()
            .idle_timeout(Duration::from_secs(120))
            .cleanup_interval(Duration::from_secs(5));

        assert_eq!(config.idle_timeout, Some(Duration::from_secs(120)));
        assert_eq!(config.cleanup_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_builder_cleanup_interval_nonzero() {
        let config = RegistryConfig::default().cleanup_interval(Duration::ZERO);

        assert_eq!(config.cleanup_interval, MIN_CLEANUP_INTERVAL);
    }

    #[test]
    fn test_builder_relay() {
        let config = RegistryConfig::default().relay(RelayConfig::default().frame_rate(5));

        assert_eq!(config.relay.frame_rate, 5);
    }
}
