//! In-memory watch backend for tests.

use crate::{
    error::{Error, Result},
    events::{BackendMessage, FsEvent},
    traits::WatchBackend,
};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Backend driven by the test: events are injected with [`MockBackend::emit`] and
/// registrations are recorded instead of reaching the OS.
#[derive(Debug)]
pub struct MockBackend {
    sender: Mutex<Option<mpsc::UnboundedSender<BackendMessage>>>,
    watched: Mutex<BTreeSet<PathBuf>>,
    watch_calls: Mutex<Vec<PathBuf>>,
    failing: Mutex<HashSet<PathBuf>>,
}

impl MockBackend {
    /// Create a mock backend and the receiver for its events.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BackendMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Mutex::new(Some(sender)),
                watched: Mutex::new(BTreeSet::new()),
                watch_calls: Mutex::new(Vec::new()),
                failing: Mutex::new(HashSet::new()),
            },
            receiver,
        )
    }

    /// Inject a file event. Returns `false` once the backend is closed.
    pub fn emit(&self, event: FsEvent) -> bool {
        self.send(BackendMessage::Event(event))
    }

    /// Inject a backend error.
    pub fn emit_error(&self, message: impl Into<String>) -> bool {
        self.send(BackendMessage::Error(message.into()))
    }

    /// Drop the event sender without marking anything as closed, simulating a backend
    /// that died underneath the watcher.
    pub fn disconnect(&self) {
        self.sender.lock().take();
    }

    /// Make `watch` fail for this path.
    pub fn fail_watch_for(&self, path: impl Into<PathBuf>) {
        self.failing.lock().insert(path.into());
    }

    /// Paths with a live registration.
    pub fn watched(&self) -> Vec<PathBuf> {
        self.watched.lock().iter().cloned().collect()
    }

    /// Whether `path` has a live registration.
    pub fn is_watching(&self, path: &Path) -> bool {
        self.watched.lock().contains(path)
    }

    /// Every path `watch` was called with, in order, including failed calls.
    pub fn watch_calls(&self) -> Vec<PathBuf> {
        self.watch_calls.lock().clone()
    }

    /// Whether `close` has been called (or the sender was disconnected).
    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    fn send(&self, message: BackendMessage) -> bool {
        match self.sender.lock().as_ref() {
            Some(sender) => sender.send(message).is_ok(),
            None => false,
        }
    }
}

impl WatchBackend for MockBackend {
    fn backend_type(&self) -> &'static str {
        "mock"
    }

    fn watch(&self, path: &Path) -> Result<()> {
        self.watch_calls.lock().push(path.to_path_buf());
        if self.failing.lock().contains(path) {
            return Err(Error::Watch(format!(
                "mock refused to watch '{}'",
                path.display()
            )));
        }
        self.watched.lock().insert(path.to_path_buf());
        Ok(())
    }

    fn unwatch(&self, path: &Path) -> Result<()> {
        if self.watched.lock().remove(path) {
            Ok(())
        } else {
            Err(Error::Watch(format!("'{}' is not watched", path.display())))
        }
    }

    fn close(&self) -> Result<()> {
        self.sender.lock().take();
        Ok(())
    }
}
