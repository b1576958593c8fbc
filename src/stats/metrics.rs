//! Statistics for caches and relays
//!
//! Plain snapshots for health/diagnostics endpoints. Taking one has no side
//! effects on the component it describes.

use std::time::Duration;

use crate::cache::IngestState;

/// Frame cache statistics
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// Whether the ingestion task is running
    pub running: bool,
    /// Current ingestion state
    pub state: IngestState,
    /// Frames currently retained
    pub frames_in_cache: usize,
    /// Payload bytes currently retained
    pub bytes_in_cache: usize,
    /// Frames received from upstream since creation
    pub frames_received: u64,
    /// Frames handed out by `get_frame_to_serve`
    pub frames_served: u64,
    /// Failed upstream connection attempts or broken streams
    pub upstream_errors: u64,
    /// Successful upstream connections
    pub connections: u64,
    /// Configured retention window
    pub retention: Duration,
    /// Configured serve delay
    pub serve_delay: Duration,
    /// Age of the oldest retained frame
    pub oldest_frame_age: Option<Duration>,
    /// Age of the newest retained frame
    pub newest_frame_age: Option<Duration>,
}

impl CacheStats {
    /// Time span covered by the retained frames
    pub fn buffered_span(&self) -> Duration {
        match (self.oldest_frame_age, self.newest_frame_age) {
            (Some(oldest), Some(newest)) => oldest.saturating_sub(newest),
            _ => Duration::ZERO,
        }
    }

    /// Whether the upstream looks healthy: connected and fresh frames arriving
    pub fn is_live(&self, max_frame_age: Duration) -> bool {
        self.state == IngestState::Streaming
            && self
                .newest_frame_age
                .is_some_and(|age| age <= max_frame_age)
    }
}

/// Relay statistics
#[derive(Debug, Clone, PartialEq)]
pub struct RelayStats {
    /// Whether the distribution task is running
    pub running: bool,
    /// Registered viewers
    pub viewer_count: usize,
    /// Whether a most-recent envelope exists for joiners
    pub last_envelope_available: bool,
    /// Envelopes produced by the distribution loop
    pub frames_distributed: u64,
    /// Envelopes discarded from full viewer queues
    pub envelopes_dropped: u64,
    /// Viewers removed for falling behind
    pub viewers_evicted: u64,
    /// Time since the viewer set became empty, if it is empty
    pub idle_for: Option<Duration>,
    /// Underlying cache statistics
    pub cache: CacheStats,
}
