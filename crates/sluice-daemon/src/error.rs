//! Daemon errors.

use thiserror::Error;

/// Errors that end the daemon.
#[derive(Error, Debug)]
pub enum DaemonError {
    /// Invalid or unparseable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The directory watcher failed.
    #[error("Watcher error: {0}")]
    Watch(#[from] sluice_watch::Error),

    /// The delivery client could not be set up.
    #[error("Delivery error: {0}")]
    Delivery(#[from] sluice_delivery::DeliveryError),
}

impl DaemonError {
    /// Whether the error stems from configuration rather than runtime failure.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::Watch(sluice_watch::Error::Config(_))
                | Self::Delivery(sluice_delivery::DeliveryError::Config(_))
        )
    }
}

/// Result type for daemon operations.
pub type Result<T> = std::result::Result<T, DaemonError>;
