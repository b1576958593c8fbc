//! Reconnect backoff
//!
//! Delays grow geometrically from `min` by `multiplier` per consecutive
//! failure and are clamped to `max`. A successful connection resets the delay
//! to `min`.

use std::time::Duration;

/// Floor on any reconnect delay
pub const MIN_BACKOFF: Duration = Duration::from_millis(10);

/// Backoff tuning
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay after the first failure
    pub min: Duration,
    /// Upper bound on any delay
    pub max: Duration,
    /// Growth factor per consecutive failure (at least 1.0)
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 1.5,
        }
    }
}

impl BackoffConfig {
    /// Set the minimum delay (never below [`MIN_BACKOFF`])
    pub fn min(mut self, min: Duration) -> Self {
        self.min = min.max(MIN_BACKOFF);
        self.max = self.max.max(min);
        self
    }

    /// Set the maximum delay (never below the minimum)
    pub fn max(mut self, max: Duration) -> Self {
        self.max = max.max(self.min);
        self
    }

    /// Set the multiplier (values below 1.0 or NaN are treated as 1.0)
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier >= 1.0 { multiplier } else { 1.0 };
        self
    }
}

/// Backoff state for one ingestion task
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(mut config: BackoffConfig) -> Self {
        config.min = config.min.max(MIN_BACKOFF);
        config.max = config.max.max(config.min);
        Self {
            current: config.min,
            config,
            failures: 0,
        }
    }

    /// Delay that the next failure will wait
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Consecutive failures since the last reset
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failure and return how long to wait before retrying
    pub fn on_failure(&mut self) -> Duration {
        let delay = self.current;
        self.failures = self.failures.saturating_add(1);

        let scaled = self.current.as_secs_f64() * self.config.multiplier;
        self.current = Duration::try_from_secs_f64(scaled)
            .unwrap_or(self.config.max)
            .min(self.config.max);

        delay
    }

    /// Connection succeeded
    pub fn reset(&mut self) {
        self.current = self.config.min;
        self.failures = 0;
    }
}
