//! Delivery client configuration.

use crate::error::{DeliveryError, Result};
use reqwest::Url;
use std::time::Duration;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a whole request, upload included.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(300);

/// Default interval between retry passes.
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(60);

/// Bytes of an error response body kept for logging.
pub const ERROR_BODY_LIMIT: usize = 512;

/// Delivery client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryConfig {
    /// Ingestion endpoint receiving `POST` requests.
    pub endpoint: String,

    /// Maximum time to establish a connection.
    pub connect_timeout: Duration,

    /// Maximum time for the whole request, including streaming the body.
    pub response_timeout: Duration,

    /// Interval between retry passes over the queue.
    pub retry_period: Duration,

    /// Remove source files once they have been delivered.
    pub delete_after_delivery: bool,
}

impl DeliveryConfig {
    /// Configuration for `endpoint` with default timeouts.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            retry_period: DEFAULT_RETRY_PERIOD,
            delete_after_delivery: true,
        }
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the overall request timeout.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the retry period.
    pub fn with_retry_period(mut self, period: Duration) -> Self {
        self.retry_period = period;
        self
    }

    /// Keep or remove files after delivery.
    pub fn with_delete_after_delivery(mut self, delete: bool) -> Self {
        self.delete_after_delivery = delete;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.endpoint).map_err(|e| {
            DeliveryError::Config(format!("Invalid endpoint '{}': {}", self.endpoint, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(DeliveryError::Config(format!(
                "Endpoint must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.connect_timeout.is_zero() || self.response_timeout.is_zero() {
            return Err(DeliveryError::Config(
                "Timeouts must be greater than 0".to_string(),
            ));
        }

        if self.retry_period.is_zero() {
            return Err(DeliveryError::Config(
                "Retry period must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
