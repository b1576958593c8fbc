//! Frame ingestion and caching
//!
//! This module provides:
//! - SOI/EOI demultiplexing of a raw MJPEG byte stream
//! - A time-windowed store of recent frames
//! - Bounded exponential reconnect backoff
//! - The [`FrameCache`] that ties them to one upstream connection

pub mod backoff;
pub mod config;
pub mod demux;
pub mod frame;
pub mod frame_cache;
pub mod ingest;
pub mod store;

pub use backoff::{Backoff, BackoffConfig};
pub use config::CacheConfig;
pub use demux::MjpegDemuxer;
pub use frame::CachedFrame;
pub use frame_cache::FrameCache;
pub use ingest::IngestState;
pub use store::FrameStore;
