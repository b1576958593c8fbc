//! Relay registry
//!
//! The registry owns one [`Relay`](crate::relay::Relay) per upstream URL. It
//! is created once at startup and handed to the HTTP front end, which asks it
//! for the relay of each requested camera.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<RelayRegistry>
//!                     ┌─────────────────────────┐
//!                     │ relays: HashMap<Url,    │
//!                     │   Arc<Relay> {          │
//!                     │     cache,              │
//!                     │     viewers,            │
//!                     │   }                     │
//!                     │ >                       │
//!                     └───────────┬─────────────┘
//!                                 │ get_or_create(url)
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!   [HTTP handler]          [HTTP handler]          [HTTP handler]
//!   relay.add_viewer()      relay.add_viewer()      relay.get_status()
//! ```
//!
//! The first request for a URL creates and starts its relay under the
//! registry lock, so concurrent requests never open two upstream connections.

pub mod config;
pub mod error;
pub mod store;

pub use config::RegistryConfig;
pub use error::RegistryError;
pub use store::RelayRegistry;
