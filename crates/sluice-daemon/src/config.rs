//! Daemon configuration from environment variables.

use crate::error::{DaemonError, Result};
use sluice_delivery::DeliveryConfig;
use sluice_watch::WatcherConfig;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default watch root.
pub const DEFAULT_WATCH_DIR: &str = "/data/ingress";

/// Default ingestion endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080/api/v1/ingress";

/// Daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Watch root.
    pub watch_dir: PathBuf,
    /// Ingestion endpoint.
    pub endpoint: String,
    /// Largest file delivered, in bytes.
    pub max_file_size: u64,
    /// Interval between retry passes.
    pub retry_period: Duration,
    /// HTTP connect timeout.
    pub connect_timeout: Duration,
    /// Overall HTTP request timeout.
    pub response_timeout: Duration,
    /// Concurrent deliveries started by the watcher.
    pub workers: usize,
    /// Remove files once delivered.
    pub delete_after_delivery: bool,
    /// Wait before re-reading a changed metadata file.
    pub metadata_settle: Duration,
    /// How long a file must stop growing before it is delivered.
    pub file_settle: Duration,
    /// Interval between full rescans of the watch root. `None` disables them.
    ///
    /// Ignored when delivered files are kept, since every rescan would deliver them again.
    pub rescan_interval: Option<Duration>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from(DEFAULT_WATCH_DIR),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_file_size: sluice_watch::DEFAULT_MAX_FILE_SIZE,
            retry_period: sluice_delivery::DEFAULT_RETRY_PERIOD,
            connect_timeout: sluice_delivery::DEFAULT_CONNECT_TIMEOUT,
            response_timeout: sluice_delivery::DEFAULT_RESPONSE_TIMEOUT,
            workers: sluice_watch::DEFAULT_MAX_CONCURRENT_DISPATCHES,
            delete_after_delivery: true,
            metadata_settle: sluice_watch::DEFAULT_METADATA_SETTLE_DELAY,
            file_settle: sluice_watch::DEFAULT_FILE_SETTLE_TIME,
            rescan_interval: Some(sluice_watch::DEFAULT_RESCAN_INTERVAL),
        }
    }
}

impl DaemonConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// Unset or empty variables take their defaults; set but malformed ones are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            watch_dir: var("SLUICE_WATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.watch_dir),
            endpoint: var("SLUICE_ENDPOINT").unwrap_or(defaults.endpoint),
            max_file_size: parse_var(&var, "SLUICE_MAX_FILE_SIZE")?
                .unwrap_or(defaults.max_file_size),
            retry_period: parse_var(&var, "SLUICE_RETRY_PERIOD_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_period),
            connect_timeout: parse_var(&var, "SLUICE_CONNECT_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            response_timeout: parse_var(&var, "SLUICE_RESPONSE_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.response_timeout),
            workers: parse_var(&var, "SLUICE_WORKERS")?.unwrap_or(defaults.workers),
            delete_after_delivery: parse_bool_var(&var, "SLUICE_DELETE_AFTER_DELIVERY")?
                .unwrap_or(defaults.delete_after_delivery),
            metadata_settle: parse_var(&var, "SLUICE_METADATA_SETTLE_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.metadata_settle),
            file_settle: parse_var(&var, "SLUICE_FILE_SETTLE_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.file_settle),
            rescan_interval: match parse_var::<u64, _>(&var, "SLUICE_RESCAN_INTERVAL_SECS")? {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => defaults.rescan_interval,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Watcher half of the configuration.
    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig::new(&self.watch_dir)
            .with_max_file_size(self.max_file_size)
            .with_max_concurrent_dispatches(self.workers)
            .with_metadata_settle_delay(self.metadata_settle)
            .with_file_settle_time(self.file_settle)
            .with_rescan_interval(self.rescan_interval.filter(|_| self.delete_after_delivery))
    }

    /// Delivery half of the configuration.
    pub fn delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig::new(&self.endpoint)
            .with_connect_timeout(self.connect_timeout)
            .with_response_timeout(self.response_timeout)
            .with_retry_period(self.retry_period)
            .with_delete_after_delivery(self.delete_after_delivery)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.watcher_config()
            .validate()
            .map_err(|e| DaemonError::Config(e.to_string()))?;
        self.delivery_config()
            .validate()
            .map_err(|e| DaemonError::Config(e.to_string()))?;
        Ok(())
    }
}

fn parse_var<T, F>(var: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    var(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| DaemonError::Config(format!("Invalid {}='{}': {}", name, raw, e)))
        })
        .transpose()
}

fn parse_bool_var<F>(var: &F, name: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    var(name)
        .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(DaemonError::Config(format!(
                "Invalid {}='{}': expected true or false",
                name, raw
            ))),
        })
        .transpose()
}
