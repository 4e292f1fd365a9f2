//! Common error types for chirp

use thiserror::Error;

/// Common result type for chirp operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the chirp crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed resource identifier
    #[error("Invalid resource location '{0}': {1}")]
    InvalidLocation(String, String),

    /// Sound registration document could not be parsed
    #[error("Invalid sound registration for namespace '{namespace}': {source}")]
    Registration {
        namespace: String,
        #[source]
        source: serde_json::Error,
    },

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),
}
