//! services/host/src/error.rs
//!
//! Defines the primary error type for the host service.

use crate::config::ConfigError;

/// The primary error type for the `host` service.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Binding the listener or serving failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Startup problems with no more specific variant, e.g. a bad CORS origin.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}
