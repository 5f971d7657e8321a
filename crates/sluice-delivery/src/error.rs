//! Delivery errors.

use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while delivering a file.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// The source file could not be opened.
    #[error("Cannot open '{path}': {source}")]
    Open {
        /// File being delivered.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The endpoint answered with a non-success status.
    #[error("Endpoint returned {status}: {body}")]
    Status {
        /// Response status.
        status: StatusCode,
        /// Leading part of the response body.
        body: String,
    },

    /// The request failed before a response arrived (connect, timeout, reset, ...).
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// An attribute cannot be expressed as an HTTP header.
    #[error("Attribute '{name}' cannot be sent as an HTTP header")]
    InvalidHeader {
        /// Attribute key.
        name: String,
    },

    /// The attempt was aborted by cancellation.
    #[error("Delivery cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl DeliveryError {
    /// Whether the failure is transient and the file should be queued for retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Status { .. } | Self::Transport(_))
    }
}

/// Result type for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;
