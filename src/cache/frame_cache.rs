//! Frame cache for one upstream camera
//!
//! Owns the single upstream connection, keeps a rolling window of recent
//! frames and serves the newest frame that is older than the serve delay.
//! Serving slightly behind live smooths out wireless jitter and reconnects.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Result;
use crate::stats::CacheStats;

use super::config::CacheConfig;
use super::frame::CachedFrame;
use super::ingest::{Ingest, IngestState};
use super::store::FrameStore;

/// State shared between the cache handle and its ingestion task
pub(crate) struct CacheShared {
    store: Mutex<FrameStore>,
    state: AtomicU8,
    frames_received: AtomicU64,
    frames_served: AtomicU64,
    upstream_errors: AtomicU64,
    connections: AtomicU64,
}

impl CacheShared {
    fn new(retention: Duration) -> Self {
        Self {
            store: Mutex::new(FrameStore::new(retention)),
            state: AtomicU8::new(IngestState::Stopped.as_u8()),
            frames_received: AtomicU64::new(0),
            frames_served: AtomicU64::new(0),
            upstream_errors: AtomicU64::new(0),
            connections: AtomicU64::new(0),
        }
    }

    pub(crate) fn set_state(&self, state: IngestState) {
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }

    pub(crate) fn state(&self) -> IngestState {
        IngestState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// Returns the new error total
    pub(crate) fn record_error(&self) -> u64 {
        self.upstream_errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Append a fully demultiplexed frame; returns its sequence number
    pub(crate) fn record_frame(&self, data: Bytes) -> u64 {
        let now = Instant::now();
        let mut store = self.store.lock();
        let sequence = store.push(data, now);
        let received = self.frames_received.fetch_add(1, Ordering::Relaxed) + 1;

        if received % 100 == 0 {
            tracing::debug!(
                frames = store.len(),
                bytes = store.size(),
                received = received,
                served = self.frames_served.load(Ordering::Relaxed),
                "Cache stats"
            );
        }

        sequence
    }
}

struct IngestTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Caches frames from one upstream MJPEG source
///
/// # Example
/// ```no_run
/// use mjpeg_relay::{CacheConfig, FrameCache};
///
/// # async fn example() -> mjpeg_relay::Result<()> {
/// let url = "http://10.0.0.6:8000/stream0.mjpg".parse().unwrap();
/// let cache = FrameCache::new(url, CacheConfig::default())?;
/// cache.start();
///
/// if let Some(frame) = cache.get_frame_to_serve() {
///     println!("frame #{} ({} bytes)", frame.sequence, frame.len());
/// }
///
/// cache.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct FrameCache {
    url: Url,
    config: Arc<CacheConfig>,
    client: reqwest::Client,
    shared: Arc<CacheShared>,
    shutdown: CancellationToken,
    task: Mutex<Option<IngestTask>>,
}

impl FrameCache {
    /// Create a stopped cache for `url`
    pub fn new(url: Url, config: CacheConfig) -> Result<Self> {
        Self::with_shutdown(url, config, CancellationToken::new())
    }

    /// Create a stopped cache whose ingestion also ends when `shutdown` fires
    pub fn with_shutdown(url: Url, config: CacheConfig, shutdown: CancellationToken) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            url,
            shared: Arc::new(CacheShared::new(config.retention)),
            config: Arc::new(config),
            client,
            shutdown,
            task: Mutex::new(None),
        })
    }

    /// Upstream URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Cache configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Launch the ingestion task; no-op if already running
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }

        let token = self.shutdown.child_token();
        self.shared.set_state(IngestState::Connecting);
        let ingest = Ingest::new(
            self.url.clone(),
            Arc::clone(&self.config),
            self.client.clone(),
            Arc::clone(&self.shared),
            token.clone(),
        );
        let handle = tokio::spawn(ingest.run());
        *task = Some(IngestTask { token, handle });

        tracing::info!(
            url = %self.url,
            serve_delay_ms = self.config.serve_delay.as_millis() as u64,
            retention_secs = self.config.retention.as_secs(),
            "Frame cache started"
        );
    }

    /// Stop ingestion and wait (bounded) for the task to exit
    ///
    /// No-op if not running. Returns after `stop_timeout` even if the task is
    /// still winding down.
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        let Some(task) = task else {
            return;
        };
        task.token.cancel();

        match tokio::time::timeout(self.config.stop_timeout, task.handle).await {
            Ok(_) => tracing::info!(url = %self.url, "Frame cache stopped"),
            Err(_) => tracing::warn!(
                url = %self.url,
                timeout_ms = self.config.stop_timeout.as_millis() as u64,
                "Ingestion task did not exit in time"
            ),
        }
        self.shared.set_state(IngestState::Stopped);
    }

    /// Whether the ingestion task has been started and not stopped
    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Current ingestion state
    pub fn state(&self) -> IngestState {
        self.shared.state()
    }

    /// Newest frame at least `serve_delay` old, if any
    ///
    /// Expired frames are purged first, so a stalled upstream eventually
    /// yields `None`.
    pub fn get_frame_to_serve(&self) -> Option<CachedFrame> {
        let now = Instant::now();
        let mut store = self.shared.store.lock();
        store.purge(now);

        let frame = store.frame_to_serve(now, self.config.serve_delay).cloned();
        if frame.is_some() {
            self.shared.frames_served.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// Snapshot of cache statistics
    pub fn get_cache_status(&self) -> CacheStats {
        let now = Instant::now();
        let store = self.shared.store.lock();

        CacheStats {
            running: self.is_running(),
            state: self.shared.state(),
            frames_in_cache: store.len(),
            bytes_in_cache: store.size(),
            frames_received: self.shared.frames_received.load(Ordering::Relaxed),
            frames_served: self.shared.frames_served.load(Ordering::Relaxed),
            upstream_errors: self.shared.upstream_errors.load(Ordering::Relaxed),
            connections: self.shared.connections.load(Ordering::Relaxed),
            retention: self.config.retention,
            serve_delay: self.config.serve_delay,
            oldest_frame_age: store.oldest().map(|f| f.age_at(now)),
            newest_frame_age: store.newest().map(|f| f.age_at(now)),
        }
    }

    /// Record a frame as if it had just arrived from upstream
    #[cfg(test)]
    pub(crate) fn record_frame(&self, data: Bytes) -> u64 {
        self.shared.record_frame(data)
    }
}

impl Drop for FrameCache {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.token.cancel();
        }
    }
}
