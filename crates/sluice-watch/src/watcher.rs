//! Recursive directory watcher.
//!
//! [`DirWatcher`] keeps one non-recursive backend registration per directory under the
//! root, walks pre-existing content at startup and on a fixed interval, and hands every
//! regular file to a [`FileHandler`] together with its data-source tag and inherited
//! metadata once its size has stopped changing.

use crate::{
    backends::NotifyBackend,
    config::{WatcherConfig, FILE_SETTLE_POLL_INTERVAL},
    error::{Error, Result},
    events::{BackendMessage, FsEvent, FsEventKind},
    metadata::{metadata_to_json, MetadataStore},
    traits::WatchBackend,
    utils::{data_source_tag, PathFilter},
    watch_set::WatchSet,
};
use dashmap::DashSet;
use parking_lot::Mutex;
use sluice_core::{file_attributes, FileHandler};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Watches a directory tree and dispatches every file found in it.
pub struct DirWatcher {
    inner: Arc<WatcherInner>,
    /// Taken by the first `start`.
    events: Mutex<Option<mpsc::UnboundedReceiver<BackendMessage>>>,
}

struct WatcherInner {
    root: PathBuf,
    config: WatcherConfig,
    backend: Arc<dyn WatchBackend>,
    handler: Arc<dyn FileHandler>,
    watch_set: WatchSet,
    metadata: MetadataStore,
    filter: PathFilter,
    /// Files handed to a dispatch task that has not finished yet.
    in_flight: DashSet<PathBuf>,
    dispatch_permits: Arc<Semaphore>,
    dispatches: TaskTracker,
    stopped: AtomicBool,
    /// Fired by `stop` so the rescan loop ends with the event loop.
    halted: CancellationToken,
}

impl DirWatcher {
    /// Create a watcher over an explicit backend and its event receiver.
    ///
    /// The root is canonicalized when possible so event paths and scanned paths agree.
    pub fn new(
        config: WatcherConfig,
        backend: Arc<dyn WatchBackend>,
        events: mpsc::UnboundedReceiver<BackendMessage>,
        handler: Arc<dyn FileHandler>,
    ) -> Result<Self> {
        config.validate()?;

        let root = std::fs::canonicalize(&config.root).unwrap_or_else(|_| config.root.clone());
        let metadata = MetadataStore::new(&root, config.metadata_files.clone());
        let filter = PathFilter::new(&root, config.metadata_files.clone());
        let dispatch_permits = Arc::new(Semaphore::new(config.max_concurrent_dispatches));

        debug!(
            "Created directory watcher for {} using {} backend",
            root.display(),
            backend.backend_type()
        );

        Ok(Self {
            inner: Arc::new(WatcherInner {
                root,
                config,
                backend,
                handler,
                watch_set: WatchSet::new(),
                metadata,
                filter,
                in_flight: DashSet::new(),
                dispatch_permits,
                dispatches: TaskTracker::new(),
                stopped: AtomicBool::new(false),
                halted: CancellationToken::new(),
            }),
            events: Mutex::new(Some(events)),
        })
    }

    /// Create a watcher backed by the platform's notify watcher.
    pub fn with_notify(config: WatcherConfig, handler: Arc<dyn FileHandler>) -> Result<Self> {
        let (backend, events) = NotifyBackend::new()?;
        Self::new(config, Arc::new(backend), events, handler)
    }

    /// Canonical watch root.
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Metadata cache shared by the scan and the event loop.
    pub fn metadata(&self) -> &MetadataStore {
        &self.inner.metadata
    }

    /// Sorted list of directories currently tracked.
    pub fn watched_directories(&self) -> Vec<PathBuf> {
        self.inner.watch_set.paths()
    }

    /// Whether `dir` is tracked.
    pub fn is_watching(&self, dir: &Path) -> bool {
        self.inner.watch_set.contains(dir)
    }

    /// Run the watcher until `cancel` fires or a fatal error occurs.
    ///
    /// Registers the root (fatal on failure) and its immediate subdirectories, then runs
    /// the initial scan, the event loop and the periodic rescan side by side. The first
    /// error from any of them ends all three. In-flight dispatches and directory scans are
    /// awaited before returning.
    pub async fn start(&self, cancel: CancellationToken) -> Result<()> {
        let events = self.events.lock().take().ok_or(Error::AlreadyStarted)?;
        let inner = &self.inner;

        info!("Starting directory watcher on {}", inner.root.display());

        inner.watch_root()?;
        inner.watch_immediate_subdirectories().await?;

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Directory watcher cancelled");
                Ok(())
            }
            result = async {
                tokio::try_join!(
                    inner.initial_scan(&cancel),
                    inner.consume_events(events, &cancel),
                    inner.rescan_periodically(&cancel),
                )
                .map(|_| ())
            } => result,
        };

        if let Err(e) = &result {
            error!("Directory watcher failed: {}", e);
        }

        inner.dispatches.close();
        inner.dispatches.wait().await;
        debug!("All dispatches finished");

        result
    }

    /// Release the backend. Idempotent.
    ///
    /// A running event loop ends quietly once the backend's stream closes.
    pub fn stop(&self) -> Result<()> {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Stopping directory watcher on {}", self.inner.root.display());
        self.inner.halted.cancel();
        self.inner.backend.close()
    }
}

impl WatcherInner {
    fn watch_root(&self) -> Result<()> {
        self.add_watch(&self.root)
            .map(|_| ())
            .map_err(|e| Error::RootUnavailable {
                path: self.root.clone(),
                reason: e.to_string(),
            })
    }

    /// Register `dir` with the backend unless it is already tracked.
    ///
    /// Returns whether a new registration was made.
    fn add_watch(&self, dir: &Path) -> Result<bool> {
        if !self.watch_set.try_claim(dir) {
            return Ok(false);
        }

        match self.backend.watch(dir) {
            Ok(()) => {
                self.watch_set.activate(dir);
                info!("Added watch: {}", dir.display());
                Ok(true)
            }
            Err(e) => {
                self.watch_set.release(dir);
                Err(e)
            }
        }
    }

    async fn watch_immediate_subdirectories(&self) -> Result<()> {
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_dir = entry
                .file_type()
                .await
                .map(|file_type| file_type.is_dir())
                .unwrap_or(false);

            if is_dir && !self.filter.should_skip(&path) {
                if let Err(e) = self.add_watch(&path) {
                    warn!("Failed to watch {}: {}", path.display(), e);
                }
            }
        }
        Ok(())
    }

    /// Watch a directory and prime its metadata.
    async fn watch_directory(&self, dir: &Path) {
        if let Err(e) = self.add_watch(dir) {
            warn!("Failed to watch {}: {}", dir.display(), e);
        }

        if let Some(metadata) = self.metadata.lookup(dir).await {
            info!(dir = %dir.display(), ?metadata, "Loaded default metadata for directory");
        }
    }

    /// Release a removed path and any tracked directories below it.
    fn forget_directory(&self, path: &Path) {
        for dir in self.watch_set.release_subtree(path) {
            if let Err(e) = self.backend.unwatch(&dir) {
                debug!("Unwatch of {} failed: {}", dir.display(), e);
            }
            info!("Removed watch: {}", dir.display());
        }
        self.metadata.evict(path);
    }

    async fn initial_scan(self: &Arc<Self>, cancel: &CancellationToken) -> Result<()> {
        let found = self.scan_tree(self.root.clone(), cancel).await?;
        info!("Initial scan complete, {} existing files found", found);
        Ok(())
    }

    /// Rescan the whole tree every `rescan_interval` until the watcher stops.
    ///
    /// Picks up files whose events were lost or arrived before a watch existed.
    async fn rescan_periodically(self: &Arc<Self>, cancel: &CancellationToken) -> Result<()> {
        let Some(period) = self.config.rescan_interval else {
            self.halted.cancelled().await;
            return Ok(());
        };

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.halted.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            debug!("Starting periodic rescan of {}", self.root.display());
            match self.scan_tree(self.root.clone(), cancel).await {
                Ok(found) => info!("Periodic rescan complete, {} files found", found),
                Err(e) => error!("Periodic rescan of {} failed: {}", self.root.display(), e),
            }
        }
    }

    /// Scan a directory that just appeared in the background.
    ///
    /// A directory moved in whole arrives as a single create event, so everything
    /// already inside it has to be found by walking it.
    fn scan_new_directory(self: &Arc<Self>, dir: PathBuf, cancel: &CancellationToken) {
        let inner = Arc::clone(self);
        let cancel = cancel.clone();
        self.dispatches.spawn(async move {
            match inner.scan_tree(dir.clone(), &cancel).await {
                Ok(0) => {}
                Ok(found) => info!("Found {} files already in {}", found, dir.display()),
                Err(e) => warn!("Scan of new directory {} failed: {}", dir.display(), e),
            }
        });
    }

    /// Walk everything below `start`, watching directories and dispatching files.
    ///
    /// Only failures to list the root itself are errors. Returns the number of files
    /// handed to dispatch.
    async fn scan_tree(
        self: &Arc<Self>,
        start: PathBuf,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let mut pending = vec![start];
        let mut dispatched = 0usize;

        while let Some(dir) = pending.pop() {
            if cancel.is_cancelled() {
                break;
            }

            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if dir == self.root => return Err(e.into()),
                Err(e) => {
                    warn!("Skipping unreadable directory {}: {}", dir.display(), e);
                    continue;
                }
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) if dir == self.root => return Err(e.into()),
                    Err(e) => {
                        warn!("Error listing {}: {}", dir.display(), e);
                        break;
                    }
                };

                let path = entry.path();
                if self.filter.should_skip(&path) {
                    continue;
                }

                let file_type = match entry.file_type().await {
                    Ok(file_type) => file_type,
                    Err(e) => {
                        debug!("Skipping {}: {}", path.display(), e);
                        continue;
                    }
                };

                if file_type.is_dir() {
                    self.watch_directory(&path).await;
                    pending.push(path);
                } else if file_type.is_file() && !self.filter.is_metadata_file(&path) {
                    self.dispatch(path, cancel).await;
                    dispatched += 1;
                }
            }
        }

        Ok(dispatched)
    }

    async fn consume_events(
        self: &Arc<Self>,
        mut events: mpsc::UnboundedReceiver<BackendMessage>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            match events.recv().await {
                Some(BackendMessage::Event(event)) => self.handle_event(event, cancel).await,
                Some(BackendMessage::Error(e)) => error!("Watcher error: {}", e),
                None if self.stopped.load(Ordering::SeqCst) => {
                    debug!("Event stream closed after stop");
                    return Ok(());
                }
                None => return Err(Error::EventStreamClosed),
            }
        }
    }

    async fn handle_event(self: &Arc<Self>, event: FsEvent, cancel: &CancellationToken) {
        let path = event.path;
        if self.filter.should_skip(&path) {
            return;
        }

        debug!("File event: {} {}", event.kind.as_str(), path.display());

        if self.filter.is_metadata_file(&path) {
            if let Some(dir) = path.parent() {
                // Writers may still be flushing the file.
                tokio::time::sleep(self.config.metadata_settle_delay).await;
                self.metadata.refresh(dir).await;
            }
            return;
        }

        match event.kind {
            FsEventKind::Create => match fs::metadata(&path).await {
                Ok(meta) if meta.is_dir() => {
                    self.watch_directory(&path).await;
                    self.scan_new_directory(path, cancel);
                }
                Ok(meta) if meta.is_file() => self.dispatch(path, cancel).await,
                Ok(_) => {}
                Err(e) => debug!("{} vanished before it could be examined: {}", path.display(), e),
            },
            FsEventKind::Modify => {}
            // Only directories hold watches or cached metadata.
            FsEventKind::Remove
                if self.watch_set.contains(&path) || self.metadata.cached(&path).is_some() =>
            {
                self.forget_directory(&path)
            }
            FsEventKind::Remove => {}
        }
    }

    /// Hand a file to a dispatch task, waiting for a free permit first.
    async fn dispatch(self: &Arc<Self>, path: PathBuf, cancel: &CancellationToken) {
        if !self.in_flight.insert(path.clone()) {
            debug!("{} is already being dispatched", path.display());
            return;
        }

        let permit = tokio::select! {
            _ = cancel.cancelled() => None,
            permit = Arc::clone(&self.dispatch_permits).acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            self.in_flight.remove(&path);
            return;
        };

        let inner = Arc::clone(self);
        let cancel = cancel.clone();
        self.dispatches.spawn(async move {
            let _permit = permit;
            match inner.process_file(&path, &cancel).await {
                Ok(()) => {}
                Err(e @ Error::FileTooLarge { .. }) => error!("Skipping file: {}", e),
                Err(e) => error!("Failed to process file {}: {}", path.display(), e),
            }
            inner.in_flight.remove(&path);
        });
    }

    async fn process_file(&self, path: &Path, cancel: &CancellationToken) -> Result<()> {
        if !self.wait_until_settled(path, cancel).await? {
            debug!("Cancelled while {} was settling", path.display());
            return Ok(());
        }

        let size = fs::metadata(path).await?.len();
        if size > self.config.max_file_size {
            return Err(Error::FileTooLarge {
                path: path.to_path_buf(),
                size,
                limit: self.config.max_file_size,
            });
        }

        let data_source = data_source_tag(&self.root, path)?;
        let dir = path.parent().unwrap_or(self.root.as_path());
        let metadata = match self.metadata.lookup(dir).await {
            Some(metadata) => Some(metadata_to_json(&metadata)?),
            None => None,
        };
        let attributes = file_attributes(data_source, metadata);

        debug!(
            "Dispatching {} ({} bytes) to {}",
            path.display(),
            size,
            self.handler.name()
        );
        self.handler.handle_file(cancel, path, &attributes).await?;
        Ok(())
    }

    /// Poll the file size until it has not changed for the settle time.
    ///
    /// At least one poll interval always passes, so a writer that is still appending
    /// is seen growing. Returns `false` if cancelled first.
    async fn wait_until_settled(&self, path: &Path, cancel: &CancellationToken) -> Result<bool> {
        let settle = self.config.file_settle_time.max(FILE_SETTLE_POLL_INTERVAL);
        let mut last_size = fs::metadata(path).await?.len();
        let mut unchanged = Duration::ZERO;

        while unchanged < settle {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(false),
                _ = tokio::time::sleep(FILE_SETTLE_POLL_INTERVAL) => {}
            }

            let size = fs::metadata(path).await?.len();
            if size == last_size {
                unchanged += FILE_SETTLE_POLL_INTERVAL;
            } else {
                last_size = size;
                unchanged = Duration::ZERO;
            }
        }

        Ok(true)
    }
}
