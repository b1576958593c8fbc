//! Error types
//!
//! Upstream failures never reach relay callers; they are counted and retried
//! inside the frame cache. The variants here are what the ingestion loop logs
//! and what the registry returns for bad lookups.

use std::time::Duration;

use crate::registry::RegistryError;

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug)]
pub enum Error {
    /// HTTP client error (connect, TLS, body read)
    Http(reqwest::Error),
    /// I/O error while reading the upstream body
    Io(std::io::Error),
    /// Upstream answered with a non-success status
    UpstreamStatus(reqwest::StatusCode),
    /// Upstream ended the response body
    UpstreamClosed,
    /// Operation did not complete within the allotted time
    Timeout(Duration),
    /// Relay registry error
    Registry(RegistryError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {}", e),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::UpstreamStatus(status) => write!(f, "Upstream returned status {}", status),
            Error::UpstreamClosed => write!(f, "Upstream closed the stream"),
            Error::Timeout(after) => write!(f, "Timed out after {:?}", after),
            Error::Registry(e) => write!(f, "Registry error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Registry(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}
