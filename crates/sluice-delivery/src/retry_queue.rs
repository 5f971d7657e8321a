//! Pending retries, at most one per file.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sluice_core::Attributes;
use std::path::{Path, PathBuf};

/// A delivery that failed and is waiting to be retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDelivery {
    /// File to deliver.
    pub path: PathBuf,
    /// Attributes to deliver it with.
    pub attributes: Attributes,
    /// Number of failed attempts so far.
    pub attempts: u32,
    /// When the first attempt failed.
    pub first_failed_at: DateTime<Utc>,
    /// When the latest attempt failed.
    pub last_failed_at: DateTime<Utc>,
    /// Reason for the latest failure.
    pub last_error: String,
}

/// Concurrent map of failed deliveries keyed by file path.
#[derive(Debug, Default)]
pub struct RetryQueue {
    entries: DashMap<PathBuf, FailedDelivery>,
}

impl RetryQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed attempt, replacing any earlier record for the same path.
    ///
    /// The attempt count and first-failure time carry over. Returns the attempt count.
    pub fn record(&self, path: &Path, attributes: &Attributes, error: impl Into<String>) -> u32 {
        let now = Utc::now();
        match self.entries.entry(path.to_path_buf()) {
            Entry::Occupied(mut occupied) => {
                let failed = occupied.get_mut();
                failed.attributes = attributes.clone();
                failed.attempts = failed.attempts.saturating_add(1);
                failed.last_failed_at = now;
                failed.last_error = error.into();
                failed.attempts
            }
            Entry::Vacant(vacant) => {
                vacant.insert(FailedDelivery {
                    path: path.to_path_buf(),
                    attributes: attributes.clone(),
                    attempts: 1,
                    first_failed_at: now,
                    last_failed_at: now,
                    last_error: error.into(),
                });
                1
            }
        }
    }

    /// Record for `path`, if any.
    pub fn get(&self, path: &Path) -> Option<FailedDelivery> {
        self.entries.get(path).map(|entry| entry.value().clone())
    }

    /// Whether `path` has a pending retry.
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Drop the record for `path`.
    pub fn remove(&self, path: &Path) -> Option<FailedDelivery> {
        self.entries.remove(path).map(|(_, failed)| failed)
    }

    /// Copy of all records, oldest failure first.
    pub fn snapshot(&self) -> Vec<FailedDelivery> {
        let mut pending: Vec<FailedDelivery> =
            self.entries.iter().map(|entry| entry.value().clone()).collect();
        pending.sort_by(|a, b| {
            a.first_failed_at
                .cmp(&b.first_failed_at)
                .then_with(|| a.path.cmp(&b.path))
        });
        pending
    }

    /// Number of pending retries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
