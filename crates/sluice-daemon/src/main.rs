// Sluice - directory ingress daemon
//
// Watches a directory tree, attaches cascading default metadata to every file that
// appears in it, and streams each file to the configured ingestion endpoint, retrying
// failed deliveries in the background.

use anyhow::{Context, Result};
use sluice_daemon::DaemonConfig;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit codes for different scenarios
mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const CONFIG_ERROR: i32 = 1;
    pub const RUNTIME_ERROR: i32 = 2;
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    info!("Starting sluice v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration() {
        Ok(config) => {
            info!("Configuration loaded from environment variables");
            config
        }
        Err(e) => {
            error!("{:#}", e);
            process::exit(exit_codes::CONFIG_ERROR);
        }
    };

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    match sluice_daemon::run(config, cancel).await {
        Ok(()) => {
            info!("Shutdown complete");
            process::exit(exit_codes::SUCCESS);
        }
        Err(e) if e.is_config() => {
            error!("Invalid configuration: {}", e);
            process::exit(exit_codes::CONFIG_ERROR);
        }
        Err(e) => {
            error!("Sluice stopped: {}", e);
            process::exit(exit_codes::RUNTIME_ERROR);
        }
    }
}

/// Read `SLUICE_*` variables and log the effective settings.
fn load_configuration() -> Result<DaemonConfig> {
    let config = DaemonConfig::from_env().context("Failed to load configuration")?;

    info!(
        "Watching {} and delivering to {}",
        config.watch_dir.display(),
        config.endpoint
    );
    match config.rescan_interval {
        Some(interval) if config.delete_after_delivery => {
            info!("Rescanning every {}s", interval.as_secs())
        }
        Some(_) => warn!("Periodic rescan disabled because delivered files are kept"),
        None => info!("Periodic rescan disabled"),
    }

    Ok(config)
}

/// Cancel `cancel` on SIGINT or SIGTERM.
async fn shutdown_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Cannot listen for SIGINT: {}", e);
                return;
            }
            info!("Received SIGINT, shutting down");
        }
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }

    cancel.cancel();
}
