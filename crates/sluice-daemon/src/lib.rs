//! # Sluice Daemon
//!
//! Wires the directory watcher to the delivery client and runs both under one
//! cancellation token.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;

pub use config::{DaemonConfig, DEFAULT_ENDPOINT, DEFAULT_WATCH_DIR};
pub use error::{DaemonError, Result};

use sluice_delivery::DeliveryClient;
use sluice_watch::DirWatcher;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Build the pipeline from `config` and run it until `cancel` fires or the watcher fails.
pub async fn run(config: DaemonConfig, cancel: CancellationToken) -> Result<()> {
    let client = Arc::new(DeliveryClient::new(config.delivery_config())?);
    let watcher = DirWatcher::with_notify(config.watcher_config(), client.clone())?;

    info!(
        "Delivering files from {} to {}",
        watcher.root().display(),
        client.endpoint()
    );

    run_pipeline(watcher, client, cancel).await
}

/// Run an assembled pipeline: the retry worker in the background and the watcher in the
/// foreground. Whichever way the watcher ends, everything is shut down before returning.
pub async fn run_pipeline(
    watcher: DirWatcher,
    client: Arc<DeliveryClient>,
    cancel: CancellationToken,
) -> Result<()> {
    let retry_worker = {
        let client = client.clone();
        let cancel = cancel.child_token();
        tokio::spawn(async move { client.run_retry_worker(cancel).await })
    };

    let result = watcher.start(cancel.clone()).await;

    cancel.cancel();
    if let Err(e) = watcher.stop() {
        warn!("Error stopping watcher: {}", e);
    }
    if let Err(e) = retry_worker.await {
        warn!("Retry worker ended abnormally: {}", e);
    }

    let pending = client.retry_queue().len();
    if pending > 0 {
        warn!("{} deliveries still pending at shutdown", pending);
    }

    result.map_err(DaemonError::from)
}
