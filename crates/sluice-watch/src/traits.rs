//! Watch backend capability.
//!
//! Change notifications are an OS facility, so the watcher only depends on this trait.
//! A backend is created together with the receiving half of its event channel; see
//! [`crate::backends::NotifyBackend::new`].

use crate::error::Result;
use std::path::Path;

/// Non-recursive, per-directory change notification source.
pub trait WatchBackend: Send + Sync {
    /// Get the backend type identifier.
    fn backend_type(&self) -> &'static str;

    /// Start receiving events for the direct children of `path`.
    fn watch(&self, path: &Path) -> Result<()>;

    /// Stop receiving events for `path`.
    fn unwatch(&self, path: &Path) -> Result<()>;

    /// Release the OS resource. Closes the event channel. Must be idempotent.
    fn close(&self) -> Result<()>;
}
