//! Frame distribution to viewers
//!
//! A [`Relay`] owns one [`FrameCache`](crate::cache::FrameCache) and a
//! distribution task that paces cached frames out to every connected
//! [`Viewer`] as multipart envelopes.

pub mod config;
pub mod envelope;
pub mod service;
pub mod viewer;

pub use config::RelayConfig;
pub use envelope::{encode, Envelope, BOUNDARY, MULTIPART_CONTENT_TYPE, NO_CACHE_HEADERS};
pub use service::Relay;
pub use viewer::{Viewer, ViewerEvent};
