//! Viewer sessions
//!
//! Each viewer owns a bounded queue of pending envelopes. The relay pushes
//! into it without ever blocking; when the queue is full the oldest pending
//! envelope is dropped to make room, and a viewer that still cannot accept
//! the envelope is evicted.
//!
//! The consumer half ([`Viewer`]) waits on its queue with a timeout and keeps
//! a count of consecutive empty waits so the HTTP layer can hang up on a dead
//! feed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::envelope::Envelope;
use super::service::RelayShared;

/// Result of offering an envelope to a viewer queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Offer {
    /// Enqueued with room to spare
    Delivered,
    /// Enqueued after discarding the oldest pending envelope
    DroppedOldest,
    /// Could not be enqueued; the viewer should be evicted
    Rejected,
}

/// Relay-side half of a viewer session
#[derive(Debug)]
pub(crate) struct ViewerQueue {
    id: u64,
    capacity: usize,
    pending: Mutex<VecDeque<Envelope>>,
    closed: AtomicBool,
    notify: Notify,
}

impl ViewerQueue {
    pub(crate) fn new(id: u64, capacity: usize) -> Self {
        Self {
            id,
            capacity,
            pending: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Enqueue only if there is room; never blocks, never drops
    pub(crate) fn try_push(&self, envelope: Envelope) -> bool {
        let mut pending = self.pending.lock();
        if self.is_closed() || pending.len() >= self.capacity {
            return false;
        }
        pending.push_back(envelope);
        drop(pending);

        self.notify.notify_one();
        true
    }

    /// Enqueue, dropping the single oldest pending envelope if full
    pub(crate) fn offer(&self, envelope: Envelope) -> Offer {
        let mut pending = self.pending.lock();
        if self.is_closed() {
            return Offer::Rejected;
        }

        let outcome = if pending.len() < self.capacity {
            Offer::Delivered
        } else if pending.pop_front().is_some() && pending.len() < self.capacity {
            Offer::DroppedOldest
        } else {
            return Offer::Rejected;
        };
        pending.push_back(envelope);
        drop(pending);

        self.notify.notify_one();
        outcome
    }

    pub(crate) fn pop(&self) -> Option<Envelope> {
        self.pending.lock().pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Mark the session dead and wake its consumer
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// What a viewer's wait produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerEvent {
    /// The next envelope to write to the connection
    Envelope(Envelope),
    /// Nothing arrived within the viewer timeout
    Missed {
        /// Consecutive misses so far
        consecutive: u32,
    },
    /// Too many consecutive misses; the consumer should disconnect
    TimedOut,
    /// The session was evicted or the relay stopped
    Closed,
}

/// Consumer half of a viewer session
///
/// Dropping the viewer removes it from its relay.
///
/// # Example
/// ```no_run
/// use mjpeg_relay::{Relay, RelayConfig};
///
/// # async fn example(relay: &Relay) {
/// let mut viewer = relay.add_viewer();
/// if !relay.wait_for_first_envelope().await {
///     return; // upstream not ready, hang up
/// }
/// while let Some(envelope) = viewer.next_envelope().await {
///     // write envelope.data to the HTTP response body
/// #   let _ = envelope;
/// }
/// # }
/// ```
#[derive(Debug)]
pub struct Viewer {
    queue: Arc<ViewerQueue>,
    relay: Weak<RelayShared>,
    timeout: Duration,
    max_consecutive_timeouts: u32,
    consecutive_timeouts: u32,
}

impl Viewer {
    pub(crate) fn new(
        queue: Arc<ViewerQueue>,
        relay: Weak<RelayShared>,
        timeout: Duration,
        max_consecutive_timeouts: u32,
    ) -> Self {
        Self {
            queue,
            relay,
            timeout,
            max_consecutive_timeouts,
            consecutive_timeouts: 0,
        }
    }

    /// Session ID, unique within the relay
    pub fn id(&self) -> u64 {
        self.queue.id()
    }

    /// Envelopes waiting to be read
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Whether the session has been evicted or the relay stopped
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Consecutive waits that ended without an envelope
    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }

    /// Take the next pending envelope without waiting
    pub fn try_recv(&mut self) -> Option<Envelope> {
        let envelope = self.queue.pop();
        if envelope.is_some() {
            self.consecutive_timeouts = 0;
        }
        envelope
    }

    /// Wait up to the viewer timeout for the next envelope
    ///
    /// Pending envelopes are still delivered after the session is closed;
    /// `Closed` is returned once the queue is drained.
    pub async fn recv(&mut self) -> ViewerEvent {
        let deadline = tokio::time::Instant::now() + self.timeout;

        loop {
            if let Some(envelope) = self.try_recv() {
                return ViewerEvent::Envelope(envelope);
            }
            if self.queue.is_closed() {
                return ViewerEvent::Closed;
            }

            if tokio::time::timeout_at(deadline, self.queue.notify.notified())
                .await
                .is_err()
            {
                self.consecutive_timeouts += 1;
                if self.consecutive_timeouts >= self.max_consecutive_timeouts {
                    tracing::debug!(
                        viewer = self.id(),
                        misses = self.consecutive_timeouts,
                        "Viewer timed out waiting for frames"
                    );
                    return ViewerEvent::TimedOut;
                }
                return ViewerEvent::Missed {
                    consecutive: self.consecutive_timeouts,
                };
            }
        }
    }

    /// Next envelope, riding out misses; `None` once the viewer should disconnect
    pub async fn next_envelope(&mut self) -> Option<Envelope> {
        loop {
            match self.recv().await {
                ViewerEvent::Envelope(envelope) => return Some(envelope),
                ViewerEvent::Missed { .. } => continue,
                ViewerEvent::TimedOut | ViewerEvent::Closed => return None,
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn queue(&self) -> &Arc<ViewerQueue> {
        &self.queue
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        if let Some(relay) = self.relay.upgrade() {
            relay.unregister(self.queue.id());
        }
    }
}
