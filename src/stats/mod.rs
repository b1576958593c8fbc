//! Diagnostics snapshots

pub mod metrics;

pub use metrics::{CacheStats, RelayStats};
