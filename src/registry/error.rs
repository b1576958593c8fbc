//! Registry error types

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Upstream URL could not be parsed
    InvalidUrl(String, url::ParseError),
    /// Upstream URL is not http or https
    UnsupportedScheme(String),
    /// The registry has been shut down
    ShuttingDown,
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::InvalidUrl(url, e) => write!(f, "Invalid upstream URL {}: {}", url, e),
            RegistryError::UnsupportedScheme(url) => {
                write!(f, "Unsupported upstream scheme: {}", url)
            }
            RegistryError::ShuttingDown => write!(f, "Registry is shutting down"),
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::InvalidUrl(_, e) => Some(e),
            _ => None,
        }
    }
}
