//! HTTP delivery client and retry worker.

use crate::config::{DeliveryConfig, ERROR_BODY_LIMIT};
use crate::error::{DeliveryError, Result};
use crate::retry_queue::RetryQueue;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Body, Client};
use sluice_core::{Attributes, FileHandler, CONTENT_TYPE_OCTET_STREAM, FILENAME_KEY};
use std::path::Path;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Streams files to the ingestion endpoint and retries failures in the background.
pub struct DeliveryClient {
    http: Client,
    config: DeliveryConfig,
    queue: RetryQueue,
}

impl DeliveryClient {
    /// Create a client for the configured endpoint.
    pub fn new(config: DeliveryConfig) -> Result<Self> {
        config.validate()?;

        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.response_timeout)
            .build()
            .map_err(|e| DeliveryError::Client(e.to_string()))?;

        Ok(Self {
            http,
            config,
            queue: RetryQueue::new(),
        })
    }

    /// Configured endpoint.
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Deliveries waiting to be retried.
    pub fn retry_queue(&self) -> &RetryQueue {
        &self.queue
    }

    /// Deliver one file.
    ///
    /// Retryable failures are recorded in the retry queue before the error is returned.
    /// A success clears any queued record and, if configured, removes the file.
    pub async fn deliver(
        &self,
        cancel: &CancellationToken,
        path: &Path,
        attributes: &Attributes,
    ) -> Result<()> {
        let result = self.send(cancel, path, attributes).await;

        match &result {
            Ok(()) => {
                if let Some(failed) = self.queue.remove(path) {
                    info!(
                        "Delivered {} after {} failed attempts",
                        path.display(),
                        failed.attempts
                    );
                } else {
                    info!("Delivered {}", path.display());
                }

                if self.config.delete_after_delivery {
                    if let Err(e) = tokio::fs::remove_file(path).await {
                        warn!("Delivered {} but could not remove it: {}", path.display(), e);
                    }
                }
            }
            Err(e) if e.is_retryable() => {
                let attempts = self.queue.record(path, attributes, e.to_string());
                warn!(
                    "Delivery of {} failed (attempt {}), queued for retry: {}",
                    path.display(),
                    attempts,
                    e
                );
            }
            Err(DeliveryError::Cancelled) => {
                debug!("Delivery of {} cancelled", path.display());
            }
            Err(e) => {
                warn!("Delivery of {} failed: {}", path.display(), e);
            }
        }

        result
    }

    async fn send(
        &self,
        cancel: &CancellationToken,
        path: &Path,
        attributes: &Attributes,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(DeliveryError::Cancelled);
        }

        let headers = request_headers(path, attributes)?;
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|source| DeliveryError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let request = self
            .http
            .post(&self.config.endpoint)
            .headers(headers)
            .body(Body::wrap_stream(ReaderStream::new(file)));

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(DeliveryError::Cancelled),
            response = request.send() => response?,
        };

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = tokio::select! {
            _ = cancel.cancelled() => String::new(),
            body = response.bytes() => body
                .map(|bytes| {
                    let end = bytes.len().min(ERROR_BODY_LIMIT);
                    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
                })
                .unwrap_or_default(),
        };

        Err(DeliveryError::Status { status, body })
    }

    /// Retry queued deliveries every retry period until `cancel` fires.
    ///
    /// The first pass runs one period after start.
    pub async fn run_retry_worker(&self, cancel: CancellationToken) {
        let period = self.config.retry_period;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Retry worker started, period {:?}", period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.retry_pending(&cancel).await;
        }

        info!("Retry worker stopped with {} deliveries pending", self.queue.len());
    }

    /// One pass over a snapshot of the retry queue. Returns the number delivered.
    ///
    /// Records whose file no longer exists are abandoned.
    pub async fn retry_pending(&self, cancel: &CancellationToken) -> usize {
        let pending = self.queue.snapshot();
        if pending.is_empty() {
            return 0;
        }

        debug!("Retrying {} failed deliveries", pending.len());
        let mut delivered = 0;

        for failed in pending {
            if cancel.is_cancelled() {
                break;
            }

            match tokio::fs::try_exists(&failed.path).await {
                Ok(true) => {}
                Ok(false) => {
                    self.abandon(&failed.path);
                    continue;
                }
                Err(e) => {
                    warn!("Cannot check {}: {}", failed.path.display(), e);
                    continue;
                }
            }

            match self.deliver(cancel, &failed.path, &failed.attributes).await {
                Ok(()) => delivered += 1,
                // Removed between the existence check and the open.
                Err(DeliveryError::Open { .. }) => self.abandon(&failed.path),
                Err(_) => {}
            }
        }

        delivered
    }

    fn abandon(&self, path: &Path) {
        if let Some(failed) = self.queue.remove(path) {
            warn!(
                "Abandoning delivery of {}: file no longer exists ({} failed attempts since {}, last error: {})",
                path.display(),
                failed.attempts,
                failed.first_failed_at.to_rfc3339(),
                failed.last_error
            );
        }
    }
}

#[async_trait]
impl FileHandler for DeliveryClient {
    async fn handle_file(
        &self,
        cancel: &CancellationToken,
        path: &Path,
        attributes: &Attributes,
    ) -> anyhow::Result<()> {
        self.deliver(cancel, path, attributes).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http-delivery"
    }
}

/// Request headers for a delivery: content type, file name and one header per attribute.
fn request_headers(path: &Path, attributes: &Attributes) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(CONTENT_TYPE_OCTET_STREAM),
    );

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    headers.insert(
        HeaderName::from_static(FILENAME_KEY),
        header_value(FILENAME_KEY, &file_name)?,
    );

    for (key, value) in attributes {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
            DeliveryError::InvalidHeader { name: key.clone() }
        })?;
        headers.insert(name, header_value(key, value)?);
    }

    Ok(headers)
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_bytes(value.as_bytes()).map_err(|_| DeliveryError::InvalidHeader {
        name: name.to_string(),
    })
}
