//! Relay configuration

use std::time::Duration;

use crate::cache::CacheConfig;

/// Relay configuration options
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Settings for the owned frame cache
    pub cache: CacheConfig,

    /// Target output frame rate (frames/second, at least 1)
    pub frame_rate: u32,

    /// Envelopes each viewer may have pending
    pub viewer_queue_capacity: usize,

    /// Sleep between polls when no frame is due or available
    pub idle_poll_interval: Duration,

    /// Pause after a failed distribution iteration
    pub error_pause: Duration,

    /// How long `stop` waits for the distribution task
    pub stop_timeout: Duration,

    /// How long a viewer waits for the next envelope
    pub viewer_timeout: Duration,

    /// Consecutive empty waits before a viewer gives up
    pub max_consecutive_timeouts: u32,

    /// How long a new viewer waits for the first envelope
    pub warmup_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            frame_rate: 15,
            viewer_queue_capacity: 50,
            idle_poll_interval: Duration::from_millis(100),
            error_pause: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(5),
            viewer_timeout: Duration::from_secs(15),
            max_consecutive_timeouts: 10,
            warmup_timeout: Duration::from_secs(15),
        }
    }
}

impl RelayConfig {
    /// Minimum spacing between distributed frames
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.max(1)
    }

    /// Set the frame cache settings
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Set the output frame rate
    pub fn frame_rate(mut self, fps: u32) -> Self {
        self.frame_rate = fps.max(1);
        self
    }

    /// Set the per-viewer queue capacity
    pub fn viewer_queue_capacity(mut self, capacity: usize) -> Self {
        self.viewer_queue_capacity = capacity;
        self
    }

    /// Set the idle poll interval
    pub fn idle_poll_interval(mut self, interval: Duration) -> Self {
        self.idle_poll_interval = interval;
        self
    }

    /// Set the stop timeout
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Set the viewer wait timeout and how many consecutive misses are tolerated
    pub fn viewer_timeouts(mut self, timeout: Duration, max_consecutive: u32) -> Self {
        self.viewer_timeout = timeout;
        self.max_consecutive_timeouts = max_consecutive.max(1);
        self
    }

    /// Set the warm-up timeout
    pub fn warmup_timeout(mut self, timeout: Duration) -> Self {
        self.warmup_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();

        assert_eq!(config.frame_rate, 15);
        assert_eq!(config.viewer_queue_capacity, 50);
        assert_eq!(config.idle_poll_interval, Duration::from_millis(100));
        assert_eq!(config.viewer_timeout, Duration::from_secs(15));
        assert_eq!(config.max_consecutive_timeouts, 10);
        assert_eq!(config.warmup_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_frame_interval() {
        assert_eq!(
            RelayConfig::default().frame_rate(10).frame_interval(),
            Duration::from_millis(100)
        );
        assert_eq!(
            RelayConfig::default().frame_rate(30).frame_interval(),
            Duration::from_nanos(33_333_333)
        );
    }

    #[test]
    fn test_builder_frame_rate_nonzero() {
        let config = RelayConfig::default().frame_rate(0);

        assert_eq!(config.frame_rate, 1);
        assert_eq!(config.frame_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_builder_chaining() {
        let config = RelayConfig::default()
            .frame_rate(25)
            .viewer_queue_capacity(4)
            .idle_poll_interval(Duration::from_millis(10))
            .stop_timeout(Duration::from_secs(1))
            .viewer_timeouts(Duration::from_secs(2), 0)
            .warmup_timeout(Duration::from_secs(3));

        assert_eq!(config.frame_rate, 25);
        assert_eq!(config.viewer_queue_capacity, 4);
        assert_eq!(config.idle_poll_interval, Duration::from_millis(10));
        assert_eq!(config.stop_timeout, Duration::from_secs(1));
        assert_eq!(config.viewer_timeout, Duration::from_secs(2));
        assert_eq!(config.max_consecutive_timeouts, 1);
        assert_eq!(config.warmup_timeout, Duration::from_secs(3));
    }
}
