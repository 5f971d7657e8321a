//! Error types for the directory watcher.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while watching and dispatching files.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system watching error.
    #[error("File watching error: {0}")]
    Watch(String),

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The watch root could not be registered.
    #[error("Cannot watch root directory '{path}': {reason}")]
    RootUnavailable {
        /// Watch root.
        path: PathBuf,
        /// Backend error text.
        reason: String,
    },

    /// A discovered file is larger than the configured limit.
    #[error("File '{path}' exceeds maximum size limit: {size} > {limit}")]
    FileTooLarge {
        /// Offending file.
        path: PathBuf,
        /// Size on disk in bytes.
        size: u64,
        /// Configured limit in bytes.
        limit: u64,
    },

    /// A path is not below the watch root.
    #[error("Path '{0}' is outside the watch root")]
    OutsideRoot(PathBuf),

    /// A default-metadata file exists but could not be parsed.
    #[error("Failed to parse metadata file '{path}': {reason}")]
    MetadataParse {
        /// Metadata file.
        path: PathBuf,
        /// Parser error text.
        reason: String,
    },

    /// A default-metadata file name has an extension with no known format.
    #[error("Unsupported metadata file format: {0}")]
    UnsupportedMetadataFormat(String),

    /// Metadata could not be serialized for a file's attributes.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The file handler rejected a file.
    #[error("Handler error: {0}")]
    Handler(String),

    /// The backend event stream ended while the watcher was still running.
    #[error("File event stream closed unexpectedly")]
    EventStreamClosed,

    /// `start` was called twice.
    #[error("Directory watcher is already started")]
    AlreadyStarted,
}

/// Result type for watcher operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Convert notify errors to our error type.
impl From<notify::Error> for Error {
    fn from(err: notify::Error) -> Self {
        Error::Watch(err.to_string())
    }
}

/// Convert handler errors to our error type.
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Handler(format!("{:#}", err))
    }
}
