//! Notify-based watch backend.

use crate::{
    error::{Error, Result},
    events::{BackendMessage, FsEvent},
    traits::WatchBackend,
};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Backend over the platform's recommended notify watcher.
///
/// Every directory is registered non-recursively; the directory watcher adds one watch per
/// directory it discovers.
pub struct NotifyBackend {
    /// `None` once closed. Dropping the watcher drops the event sender.
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl NotifyBackend {
    /// Create a backend and the receiver for its events.
    pub fn new() -> Result<(Self, mpsc::UnboundedReceiver<BackendMessage>)> {
        let (sender, receiver) = mpsc::unbounded_channel();

        let watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    for fs_event in Self::convert_notify_event(event) {
                        if sender.send(BackendMessage::Event(fs_event)).is_err() {
                            debug!("Event receiver dropped, discarding file event");
                            return;
                        }
                    }
                }
                Err(e) => {
                    error!("Notify error: {}", e);
                    let _ = sender.send(BackendMessage::Error(e.to_string()));
                }
            }
        })
        .map_err(|e| Error::Watch(format!("Failed to create notify watcher: {}", e)))?;

        info!("Notify backend initialized");
        Ok((
            Self {
                watcher: Mutex::new(Some(watcher)),
            },
            receiver,
        ))
    }

    /// Convert a notify event into zero or more per-path events.
    pub(crate) fn convert_notify_event(event: Event) -> Vec<FsEvent> {
        match event.kind {
            EventKind::Create(_) => event.paths.into_iter().map(FsEvent::created).collect(),
            EventKind::Remove(_) => event.paths.into_iter().map(FsEvent::removed).collect(),
            EventKind::Modify(ModifyKind::Name(mode)) => Self::convert_rename(mode, event.paths),
            EventKind::Modify(_) => event.paths.into_iter().map(FsEvent::modified).collect(),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
        }
    }

    fn convert_rename(mode: RenameMode, paths: Vec<std::path::PathBuf>) -> Vec<FsEvent> {
        match mode {
            RenameMode::From => paths.into_iter().map(FsEvent::removed).collect(),
            RenameMode::To => paths.into_iter().map(FsEvent::created).collect(),
            RenameMode::Both => {
                let mut paths = paths.into_iter();
                let mut events = Vec::with_capacity(2);
                if let Some(from) = paths.next() {
                    events.push(FsEvent::removed(from));
                }
                if let Some(to) = paths.next() {
                    events.push(FsEvent::created(to));
                }
                events
            }
            // Platforms that cannot tell the two sides apart
            RenameMode::Any | RenameMode::Other => paths
                .into_iter()
                .map(|path| {
                    if path.exists() {
                        FsEvent::created(path)
                    } else {
                        FsEvent::removed(path)
                    }
                })
                .collect(),
        }
    }
}

impl WatchBackend for NotifyBackend {
    fn backend_type(&self) -> &'static str {
        "notify"
    }

    fn watch(&self, path: &Path) -> Result<()> {
        let mut guard = self.watcher.lock();
        let watcher = guard
            .as_mut()
            .ok_or_else(|| Error::Watch("Notify backend is closed".to_string()))?;
        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| Error::Watch(format!("Failed to watch '{}': {}", path.display(), e)))
    }

    fn unwatch(&self, path: &Path) -> Result<()> {
        let mut guard = self.watcher.lock();
        let watcher = guard
            .as_mut()
            .ok_or_else(|| Error::Watch("Notify backend is closed".to_string()))?;
        watcher
            .unwatch(path)
            .map_err(|e| Error::Watch(format!("Failed to unwatch '{}': {}", path.display(), e)))
    }

    fn close(&self) -> Result<()> {
        if self.watcher.lock().take().is_some() {
            info!("Notify backend closed");
        }
        Ok(())
    }
}
