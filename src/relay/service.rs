//! Relay: one frame cache fanned out to many viewers
//!
//! A single distribution task pulls the newest servable frame from the cache
//! at most once per frame interval, wraps it in the multipart envelope and
//! offers it to every viewer queue. Registration and fan-out share one lock,
//! so a joining viewer either gets the previous envelope as its seed or the
//! new one from fan-out, never neither.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::cache::FrameCache;
use crate::error::Result;
use crate::stats::RelayStats;

use super::config::RelayConfig;
use super::envelope::Envelope;
use super::viewer::{Offer, Viewer, ViewerQueue};

/// Viewer set and the envelope new viewers are seeded with
struct ViewerSet {
    queues: HashMap<u64, Arc<ViewerQueue>>,
    last_envelope: Option<Envelope>,
    /// When the set last became empty
    idle_since: Option<Instant>,
}

/// Outcome of one fan-out pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FanOut {
    pub delivered: usize,
    pub dropped: usize,
    pub evicted: usize,
}

/// What one distribution iteration did
enum Tick {
    /// An envelope was distributed
    Sent,
    /// The previous frame is too recent; wait this long
    Throttled(Duration),
    /// The cache had nothing old enough to serve
    Empty,
}

/// State shared between the relay handle, its task and its viewers
pub(crate) struct RelayShared {
    config: RelayConfig,
    cache: FrameCache,
    viewers: Mutex<ViewerSet>,
    has_envelope: watch::Sender<bool>,
    next_viewer_id: AtomicU64,
    frames_distributed: AtomicU64,
    envelopes_dropped: AtomicU64,
    viewers_evicted: AtomicU64,
    #[cfg(test)]
    fail_next_tick: std::sync::atomic::AtomicBool,
}

impl RelayShared {
    /// Remove a viewer; returns whether it was registered
    pub(crate) fn unregister(&self, id: u64) -> bool {
        let mut set = self.viewers.lock();
        let removed = set.queues.remove(&id);
        if set.queues.is_empty() && set.idle_since.is_none() {
            set.idle_since = Some(Instant::now());
        }
        let remaining = set.queues.len();
        drop(set);

        match removed {
            Some(queue) => {
                queue.close();
                tracing::info!(
                    url = %self.cache.url(),
                    viewer = id,
                    viewers = remaining,
                    "Viewer removed"
                );
                true
            }
            None => false,
        }
    }

    /// Offer an envelope to every viewer; evict those that cannot take it
    pub(crate) fn distribute(&self, envelope: Envelope) -> FanOut {
        let mut outcome = FanOut::default();
        let mut set = self.viewers.lock();
        set.last_envelope = Some(envelope.clone());

        let mut casualties = Vec::new();
        for (id, queue) in set.queues.iter() {
            match queue.offer(envelope.clone()) {
                Offer::Delivered => outcome.delivered += 1,
                Offer::DroppedOldest => {
                    outcome.delivered += 1;
                    outcome.dropped += 1;
                }
                Offer::Rejected => casualties.push(*id),
            }
        }

        for id in casualties {
            if let Some(queue) = set.queues.remove(&id) {
                queue.close();
                outcome.evicted += 1;
                tracing::warn!(
                    url = %self.cache.url(),
                    viewer = id,
                    "Removed slow viewer"
                );
            }
        }
        if set.queues.is_empty() && set.idle_since.is_none() {
            set.idle_since = Some(Instant::now());
        }
        drop(set);

        self.has_envelope.send_if_modified(|has| !std::mem::replace(has, true));
        self.frames_distributed.fetch_add(1, Ordering::Relaxed);
        self.envelopes_dropped
            .fetch_add(outcome.dropped as u64, Ordering::Relaxed);
        self.viewers_evicted
            .fetch_add(outcome.evicted as u64, Ordering::Relaxed);

        outcome
    }

    /// One pass of the distribution loop
    fn tick(&self, last_sent: &mut Option<Instant>) -> Tick {
        #[cfg(test)]
        if self.fail_next_tick.swap(false, Ordering::Relaxed) {
            panic!("distribution tick failed");
        }

        let interval = self.config.frame_interval();
        if let Some(last) = *last_sent {
            let elapsed = last.elapsed();
            if elapsed < interval {
                return Tick::Throttled(interval - elapsed);
            }
        }

        let Some(frame) = self.cache.get_frame_to_serve() else {
            return Tick::Empty;
        };

        let envelope = Envelope::from_frame(&frame);
        *last_sent = Some(Instant::now());
        self.distribute(envelope);
        Tick::Sent
    }

    async fn run(self: Arc<Self>, token: CancellationToken) {
        let poll = self.config.idle_poll_interval;
        let mut last_sent = None;

        while !token.is_cancelled() {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| self.tick(&mut last_sent)));
            let pause = match outcome {
                Ok(Tick::Sent) => continue,
                Ok(Tick::Throttled(remaining)) => remaining.min(poll),
                Ok(Tick::Empty) => poll,
                Err(_) => {
                    tracing::error!(
                        url = %self.cache.url(),
                        "Distribution iteration panicked, continuing"
                    );
                    self.config.error_pause
                }
            };

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        tracing::debug!(url = %self.cache.url(), "Distribution task exited");
    }
}

struct DistributionTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Relays one upstream camera to any number of viewers
///
/// # Example
/// ```no_run
/// use mjpeg_relay::{Relay, RelayConfig};
///
/// # async fn example() -> mjpeg_relay::Result<()> {
/// let url = "http://10.0.0.6:8000/stream0.mjpg".parse().unwrap();
/// let relay = Relay::new(url, RelayConfig::default())?;
/// relay.start();
///
/// let mut viewer = relay.add_viewer();
/// while let Some(envelope) = viewer.next_envelope().await {
///     // write envelope.data to the viewer connection
/// #   let _ = envelope;
/// }
///
/// relay.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct Relay {
    shared: Arc<RelayShared>,
    shutdown: CancellationToken,
    task: Mutex<Option<DistributionTask>>,
}

impl Relay {
    /// Create a stopped relay for `url`
    pub fn new(url: Url, config: RelayConfig) -> Result<Self> {
        Self::with_shutdown(url, config, CancellationToken::new())
    }

    /// Create a stopped relay whose tasks also end when `shutdown` fires
    pub fn with_shutdown(url: Url, config: RelayConfig, shutdown: CancellationToken) -> Result<Self> {
        let cache = FrameCache::with_shutdown(url, config.cache.clone(), shutdown.child_token())?;
        let (has_envelope, _) = watch::channel(false);

        Ok(Self {
            shared: Arc::new(RelayShared {
                config,
                cache,
                viewers: Mutex::new(ViewerSet {
                    queues: HashMap::new(),
                    last_envelope: None,
                    idle_since: Some(Instant::now()),
                }),
                has_envelope,
                next_viewer_id: AtomicU64::new(1),
                frames_distributed: AtomicU64::new(0),
                envelopes_dropped: AtomicU64::new(0),
                viewers_evicted: AtomicU64::new(0),
                #[cfg(test)]
                fail_next_tick: std::sync::atomic::AtomicBool::new(false),
            }),
            shutdown,
            task: Mutex::new(None),
        })
    }

    /// Upstream URL
    pub fn url(&self) -> &Url {
        self.shared.cache.url()
    }

    /// Relay configuration
    pub fn config(&self) -> &RelayConfig {
        &self.shared.config
    }

    /// The owned frame cache
    pub fn cache(&self) -> &FrameCache {
        &self.shared.cache
    }

    /// Start the frame cache and the distribution task; no-op if running
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }

        self.shared.cache.start();

        let token = self.shutdown.child_token();
        let handle = tokio::spawn(Arc::clone(&self.shared).run(token.clone()));
        *task = Some(DistributionTask { token, handle });

        tracing::info!(
            url = %self.url(),
            fps = self.shared.config.frame_rate,
            "Relay started"
        );
    }

    /// Stop distribution, then the cache, then wait (bounded) for the task
    ///
    /// Every viewer is closed. No-op if not running.
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        let Some(task) = task else {
            return;
        };
        task.token.cancel();
        self.shared.cache.stop().await;

        if tokio::time::timeout(self.shared.config.stop_timeout, task.handle)
            .await
            .is_err()
        {
            tracing::warn!(url = %self.url(), "Distribution task did not exit in time");
        }

        let mut set = self.shared.viewers.lock();
        for queue in set.queues.values() {
            queue.close();
        }
        set.queues.clear();
        if set.idle_since.is_none() {
            set.idle_since = Some(Instant::now());
        }
        drop(set);

        tracing::info!(url = %self.url(), "Relay stopped");
    }

    /// Whether the distribution task is running
    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Register a new viewer, seeded with the most recent envelope if any
    ///
    /// On a relay that is not running the viewer comes back already closed
    /// and unregistered, so its consumer disconnects at once.
    pub fn add_viewer(&self) -> Viewer {
        let id = self.shared.next_viewer_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(ViewerQueue::new(id, self.shared.config.viewer_queue_capacity));

        // Checked under the viewer lock: a concurrent stop closes every
        // registered queue after taking the task
        let mut set = self.shared.viewers.lock();
        if !self.is_running() {
            drop(set);
            queue.close();
            tracing::debug!(url = %self.url(), viewer = id, "Viewer refused, relay not running");
            return self.viewer_for(queue);
        }

        set.queues.insert(id, Arc::clone(&queue));
        set.idle_since = None;
        if let Some(envelope) = &set.last_envelope {
            // Best effort: a full brand-new queue just starts unseeded
            queue.try_push(envelope.clone());
        }
        let viewers = set.queues.len();
        drop(set);

        tracing::info!(url = %self.url(), viewer = id, viewers = viewers, "Viewer added");

        self.viewer_for(queue)
    }

    fn viewer_for(&self, queue: Arc<ViewerQueue>) -> Viewer {
        Viewer::new(
            queue,
            Arc::downgrade(&self.shared),
            self.shared.config.viewer_timeout,
            self.shared.config.max_consecutive_timeouts,
        )
    }

    /// Unregister a viewer; idempotent
    pub fn remove_viewer(&self, viewer: &Viewer) {
        self.shared.unregister(viewer.id());
    }

    /// Number of registered viewers
    pub fn viewer_count(&self) -> usize {
        self.shared.viewers.lock().queues.len()
    }

    /// Most recently distributed envelope
    pub fn last_envelope(&self) -> Option<Envelope> {
        self.shared.viewers.lock().last_envelope.clone()
    }

    /// How long the relay has had no viewers, if it has none
    pub fn idle_for(&self) -> Option<Duration> {
        self.shared
            .viewers
            .lock()
            .idle_since
            .map(|since| since.elapsed())
    }

    /// Wait until the relay has distributed at least one envelope
    ///
    /// Gives up after the configured warm-up timeout. Returns `false` on
    /// timeout or if the relay is not running.
    pub async fn wait_for_first_envelope(&self) -> bool {
        self.wait_for_first_envelope_within(self.shared.config.warmup_timeout)
            .await
    }

    /// Like [`wait_for_first_envelope`](Self::wait_for_first_envelope) with an explicit limit
    pub async fn wait_for_first_envelope_within(&self, limit: Duration) -> bool {
        let token = self.task.lock().as_ref().map(|t| t.token.clone());
        let Some(token) = token else {
            return false;
        };
        let mut has_envelope = self.shared.has_envelope.subscribe();

        tokio::select! {
            _ = token.cancelled() => false,
            result = tokio::time::timeout(limit, has_envelope.wait_for(|has| *has)) => {
                matches!(result, Ok(Ok(_)))
            }
        }
    }

    /// Snapshot of relay and cache statistics
    pub fn get_status(&self) -> RelayStats {
        let cache = self.shared.cache.get_cache_status();
        let set = self.shared.viewers.lock();

        RelayStats {
            running: self.is_running(),
            viewer_count: set.queues.len(),
            last_envelope_available: set.last_envelope.is_some(),
            frames_distributed: self.shared.frames_distributed.load(Ordering::Relaxed),
            envelopes_dropped: self.shared.envelopes_dropped.load(Ordering::Relaxed),
            viewers_evicted: self.shared.viewers_evicted.load(Ordering::Relaxed),
            idle_for: set.idle_since.map(|since| since.elapsed()),
            cache,
        }
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<RelayShared> {
        &self.shared
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("url", &self.url().as_str())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.token.cancel();
        }
    }
}
