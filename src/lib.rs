//! Caching MJPEG relay
//!
//! Pulls a single Motion-JPEG stream from an unreliable upstream camera and
//! fans it out to any number of viewers. Each upstream URL gets exactly one
//! connection no matter how many viewers are attached.
//!
//! # Architecture
//!
//! ```text
//!   upstream camera (HTTP, concatenated JPEGs)
//!            │
//!            ▼
//!   ┌──────────────────┐  ingestion task: demux SOI/EOI, timestamp,
//!   │    FrameCache    │  retain a rolling time window, reconnect
//!   └────────┬─────────┘  with exponential backoff
//!            │ get_frame_to_serve()  (newest frame older than serve delay)
//!            ▼
//!   ┌──────────────────┐  distribution task: rate limit, wrap in the
//!   │      Relay       │  multipart envelope, fan out with
//!   └────────┬─────────┘  drop-oldest-then-evict backpressure
//!            │
//!     ┌──────┼──────┐
//!     ▼      ▼      ▼
//!  [Viewer][Viewer][Viewer]  bounded per-viewer queues, drained by the
//!                            HTTP layer
//! ```
//!
//! [`RelayRegistry`] owns one [`Relay`] per upstream URL and is handed to the
//! HTTP front end at startup.
//!
//! # Zero-Copy Design
//!
//! Frames and envelopes are `bytes::Bytes`, so every viewer queue shares the
//! same allocation for a distributed frame.

pub mod cache;
pub mod error;
pub mod registry;
pub mod relay;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{BackoffConfig, CacheConfig, CachedFrame, FrameCache, IngestState};
pub use error::{Error, Result};
pub use registry::{RegistryConfig, RegistryError, RelayRegistry};
pub use relay::{
    Envelope, Relay, RelayConfig, Viewer, ViewerEvent, MULTIPART_CONTENT_TYPE, NO_CACHE_HEADERS,
};
pub use stats::{CacheStats, RelayStats};
