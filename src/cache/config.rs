//! Frame cache configuration

use std::time::Duration;

use super::backoff::BackoffConfig;

/// Frame cache configuration options
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// How long a frame stays in the cache
    pub retention: Duration,

    /// Minimum age before a frame may be served
    pub serve_delay: Duration,

    /// Hard ceiling for the parse buffer while waiting for an end marker
    pub max_buffer_size: usize,

    /// Tail size the parse buffer is trimmed to once it passes the ceiling
    pub buffer_trim_size: usize,

    /// Bytes read from the upstream body per read call
    pub read_chunk_size: usize,

    /// Connect timeout, also bounds the wait for response headers
    pub connect_timeout: Duration,

    /// Maximum wait for any single body read before reconnecting
    pub read_timeout: Duration,

    /// How long `stop` waits for the ingestion task
    pub stop_timeout: Duration,

    /// Reconnect backoff
    pub backoff: BackoffConfig,

    /// User-Agent sent upstream
    pub user_agent: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(15),
            serve_delay: Duration::from_secs(2),
            max_buffer_size: 4 * 1024 * 1024, // 4MB
            buffer_trim_size: 1024 * 1024,    // 1MB
            read_chunk_size: 4096,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
            stop_timeout: Duration::from_secs(5),
            backoff: BackoffConfig::default(),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl CacheConfig {
    /// Set the retention window
    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Set the serve delay
    pub fn serve_delay(mut self, delay: Duration) -> Self {
        self.serve_delay = delay;
        self
    }

    /// Set the parse buffer ceiling and the tail kept when trimming
    ///
    /// The trim size is capped at the ceiling.
    pub fn buffer_limits(mut self, max_size: usize, trim_size: usize) -> Self {
        self.max_buffer_size = max_size;
        self.buffer_trim_size = trim_size.min(max_size);
        self
    }

    /// Set the read chunk size (at least one byte)
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-read timeout
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the stop timeout
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Set the reconnect backoff
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the User-Agent header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();

        assert_eq!(config.retention, Duration::from_secs(15));
        assert_eq!(config.serve_delay, Duration::from_secs(2));
        assert_eq!(config.max_buffer_size, 4 * 1024 * 1024);
        assert_eq!(config.buffer_trim_size, 1024 * 1024);
        assert_eq!(config.read_chunk_size, 4096);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.user_agent.starts_with("mjpeg-relay/"));
    }

    #[test]
    fn test_builder_buffer_limits_capped() {
        let config = CacheConfig::default().buffer_limits(1024, 4096);

        assert_eq!(config.max_buffer_size, 1024);
        assert_eq!(config.buffer_trim_size, 1024);
    }

    #[test]
    fn test_builder_read_chunk_size_nonzero() {
        let config = CacheConfig::default().read_chunk_size(0);

        assert_eq!(config.read_chunk_size, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = CacheConfig::default()
            .retention(Duration::from_secs(30))
            .serve_delay(Duration::from_millis(500))
            .connect_timeout(Duration::from_secs(3))
            .read_timeout(Duration::from_secs(4))
            .stop_timeout(Duration::from_secs(1))
            .user_agent("test-agent");

        assert_eq!(config.retention, Duration::from_secs(30));
        assert_eq!(config.serve_delay, Duration::from_millis(500));
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.read_timeout, Duration::from_secs(4));
        assert_eq!(config.stop_timeout, Duration::from_secs(1));
        assert_eq!(config.user_agent, "test-agent");
    }
}
