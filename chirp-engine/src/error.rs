//! Error types for chirp-engine
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for chirp-engine
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Audio decoding errors (malformed headers, corrupt framing, codec failure)
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio device / backend errors
    #[error("Audio device error: {0}")]
    Device(String),

    /// Command thread unavailable or unresponsive
    #[error("Command thread error: {0}")]
    CommandThread(String),

    /// Resource could not be located by the resource provider
    #[error("Resource not found: {0}")]
    Resource(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from shared chirp types (registry, config discovery)
    #[error(transparent)]
    Common(#[from] chirp_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using chirp-engine Error
pub type Result<T> = std::result::Result<T, Error>;
