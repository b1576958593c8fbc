//! Time-windowed frame store
//!
//! Frames are kept in arrival order and bounded by age rather than count.
//! Expired frames are purged when a new frame is pushed and whenever the
//! owner asks for a frame to serve; there is no separate timer.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use super::frame::CachedFrame;

/// Rolling window of recent frames
#[derive(Debug)]
pub struct FrameStore {
    /// Retention window
    retention: Duration,
    /// Frames, oldest at the front
    frames: VecDeque<CachedFrame>,
    /// Sequence number for the next frame
    next_sequence: u64,
    /// Total payload bytes currently held
    size: usize,
}

impl FrameStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            frames: VecDeque::new(),
            next_sequence: 0,
            size: 0,
        }
    }

    /// Record a frame that arrived at `now`, then purge expired frames
    ///
    /// Returns the sequence number assigned to the frame. Timestamps never go
    /// backwards even if `now` does.
    pub fn push(&mut self, data: Bytes, now: Instant) -> u64 {
        let timestamp = match self.frames.back() {
            Some(last) => now.max(last.timestamp),
            None => now,
        };
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.size += data.len();
        self.frames
            .push_back(CachedFrame::new(data, timestamp, sequence));
        self.purge(now);

        sequence
    }

    /// Remove frames older than the retention window; returns how many
    pub fn purge(&mut self, now: Instant) -> usize {
        let mut removed = 0;
        while let Some(oldest) = self.frames.front() {
            if oldest.age_at(now) <= self.retention {
                break;
            }
            if let Some(old) = self.frames.pop_front() {
                self.size -= old.len();
                removed += 1;
            }
        }
        removed
    }

    /// Newest frame that is at least `delay` old at `now`
    pub fn frame_to_serve(&self, now: Instant, delay: Duration) -> Option<&CachedFrame> {
        self.frames
            .iter()
            .rev()
            .find(|frame| frame.age_at(now) >= delay)
    }

    /// Number of frames retained
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total payload bytes retained
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn oldest(&self) -> Option<&CachedFrame> {
        self.frames.front()
    }

    pub fn newest(&self) -> Option<&CachedFrame> {
        self.frames.back()
    }

    /// Retention window
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Iterate retained frames, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &CachedFrame> {
        self.frames.iter()
    }
}
