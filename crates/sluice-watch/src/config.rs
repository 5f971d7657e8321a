//! Configuration for the directory watcher.

use crate::error::{Error, Result};
use crate::metadata::MetadataFormat;
use std::path::PathBuf;
use std::time::Duration;

/// Default upper bound for a dispatched file (2 GiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Default wait before re-reading a metadata file that just changed.
pub const DEFAULT_METADATA_SETTLE_DELAY: Duration = Duration::from_millis(50);

/// Interval between size checks while a file settles.
pub const FILE_SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default time a file's size must hold still before it is dispatched.
pub const DEFAULT_FILE_SETTLE_TIME: Duration = Duration::from_secs(1);

/// Default interval between full rescans of the watch root.
pub const DEFAULT_RESCAN_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Default number of handler calls allowed in flight.
pub const DEFAULT_MAX_CONCURRENT_DISPATCHES: usize = 4;

/// Ordered list of recognised default-metadata file names.
///
/// Earlier names win when a directory contains more than one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFileNames(Vec<String>);

impl MetadataFileNames {
    /// Use a custom list of names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    /// Whether `file_name` is one of the recognised names.
    pub fn contains(&self, file_name: &str) -> bool {
        self.0.iter().any(|name| name == file_name)
    }

    /// Names in lookup order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of names.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for MetadataFileNames {
    fn default() -> Self {
        Self::new([".default_metadata.yaml", ".default_metadata.json"])
    }
}

/// Directory watcher configuration.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Watch root. Metadata ascent stops below it.
    pub root: PathBuf,

    /// Files larger than this many bytes are never dispatched.
    pub max_file_size: u64,

    /// Recognised default-metadata file names.
    pub metadata_files: MetadataFileNames,

    /// Wait before re-reading a metadata file after a change event, so multi-pass
    /// writers have finished.
    pub metadata_settle_delay: Duration,

    /// Maximum number of handler calls in flight.
    pub max_concurrent_dispatches: usize,

    /// How long a file's size must stay unchanged before it is dispatched.
    /// Every file gets at least one size check one poll interval apart.
    pub file_settle_time: Duration,

    /// Interval between full rescans that pick up files no event reported.
    /// `None` disables rescanning.
    pub rescan_interval: Option<Duration>,
}

impl WatcherConfig {
    /// Create a configuration with defaults for everything but the root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            metadata_files: MetadataFileNames::default(),
            metadata_settle_delay: DEFAULT_METADATA_SETTLE_DELAY,
            max_concurrent_dispatches: DEFAULT_MAX_CONCURRENT_DISPATCHES,
            file_settle_time: DEFAULT_FILE_SETTLE_TIME,
            rescan_interval: Some(DEFAULT_RESCAN_INTERVAL),
        }
    }

    /// Set the maximum file size.
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Set the recognised metadata file names.
    pub fn with_metadata_files(mut self, names: MetadataFileNames) -> Self {
        self.metadata_files = names;
        self
    }

    /// Set the metadata settle delay.
    pub fn with_metadata_settle_delay(mut self, delay: Duration) -> Self {
        self.metadata_settle_delay = delay;
        self
    }

    /// Set the number of concurrent handler calls.
    pub fn with_max_concurrent_dispatches(mut self, max: usize) -> Self {
        self.max_concurrent_dispatches = max;
        self
    }

    /// Set the file settle time.
    pub fn with_file_settle_time(mut self, settle: Duration) -> Self {
        self.file_settle_time = settle;
        self
    }

    /// Set or disable the periodic rescan.
    pub fn with_rescan_interval(mut self, interval: Option<Duration>) -> Self {
        self.rescan_interval = interval;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(Error::Config("Watch root cannot be empty".to_string()));
        }

        if self.max_file_size == 0 {
            return Err(Error::Config(
                "Maximum file size must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrent_dispatches == 0 {
            return Err(Error::Config(
                "Concurrent dispatches must be greater than 0".to_string(),
            ));
        }

        if self.rescan_interval == Some(Duration::ZERO) {
            return Err(Error::Config(
                "Rescan interval must be greater than 0".to_string(),
            ));
        }

        if self.metadata_files.is_empty() {
            return Err(Error::Config(
                "At least one metadata file name is required".to_string(),
            ));
        }

        for name in self.metadata_files.iter() {
            MetadataFormat::from_file_name(name)?;
        }

        Ok(())
    }
}
