//! Cached frame type

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

/// One complete JPEG image taken from the upstream stream
///
/// Cheap to clone: the payload is reference counted and never mutated after
/// the frame is recorded.
#[derive(Debug, Clone)]
pub struct CachedFrame {
    /// JPEG bytes, SOI through EOI inclusive
    pub data: Bytes,
    /// Arrival time
    pub timestamp: Instant,
    /// Per-cache counter, strictly increasing
    pub sequence: u64,
}

impl CachedFrame {
    pub fn new(data: Bytes, timestamp: Instant, sequence: u64) -> Self {
        Self {
            data,
            timestamp,
            sequence,
        }
    }

    /// Size of the JPEG payload in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Age of the frame relative to `now` (zero if `now` is earlier)
    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.timestamp)
    }
}
