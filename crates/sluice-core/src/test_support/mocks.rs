//! Mock implementations for testing
//!
//! [`RecordingHandler`] stands in for the delivery client. It records every call, can be
//! told to fail, and lets async tests wait until a number of files have arrived.

use crate::attributes::Attributes;
use crate::handler::FileHandler;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// One recorded `handle_file` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandledFile {
    /// Path the handler was called with.
    pub path: PathBuf,
    /// Attributes the handler was called with.
    pub attributes: Attributes,
    /// Size of the file on disk when the handler saw it.
    pub size: Option<u64>,
}

/// Handler that records calls instead of delivering anything.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    handled: Mutex<Vec<HandledFile>>,
    fail: AtomicBool,
    notify: Notify,
}

impl RecordingHandler {
    /// Create a handler that accepts every file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent calls fail (calls are still recorded).
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of all recorded calls, in call order.
    pub fn handled(&self) -> Vec<HandledFile> {
        self.handled.lock().clone()
    }

    /// Recorded calls for one path.
    pub fn calls_for(&self, path: &Path) -> Vec<HandledFile> {
        self.handled
            .lock()
            .iter()
            .filter(|call| call.path == path)
            .cloned()
            .collect()
    }

    /// Number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.handled.lock().len()
    }

    /// Wait until at least `count` calls were recorded or `timeout` elapsed.
    ///
    /// Returns whether the count was reached.
    pub async fn wait_for_calls(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if self.call_count() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.call_count() >= count;
            }
        }
    }
}

#[async_trait]
impl FileHandler for RecordingHandler {
    async fn handle_file(
        &self,
        _cancel: &CancellationToken,
        path: &Path,
        attributes: &Attributes,
    ) -> anyhow::Result<()> {
        let size = tokio::fs::metadata(path).await.ok().map(|meta| meta.len());
        self.handled.lock().push(HandledFile {
            path: path.to_path_buf(),
            attributes: attributes.clone(),
            size,
        });
        self.notify.notify_waiters();

        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("recording handler configured to fail");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
