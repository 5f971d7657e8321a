//! File system event types delivered by watch backends.

use std::path::PathBuf;

/// Represents a file system event for a single path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    /// Kind of file event.
    pub kind: FsEventKind,

    /// Path to the file or directory.
    pub path: PathBuf,
}

impl FsEvent {
    /// Create a new event.
    pub fn new(kind: FsEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    /// Shorthand for a `Create` event.
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::new(FsEventKind::Create, path)
    }

    /// Shorthand for a `Modify` event.
    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(FsEventKind::Modify, path)
    }

    /// Shorthand for a `Remove` event.
    pub fn removed(path: impl Into<PathBuf>) -> Self {
        Self::new(FsEventKind::Remove, path)
    }
}

/// Kinds of file events the watcher reacts to.
///
/// Renames are reported as `Remove` of the old path followed by `Create` of the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsEventKind {
    /// File or directory was created (or moved in).
    Create,
    /// File content or attributes changed.
    Modify,
    /// File or directory was deleted (or moved out).
    Remove,
}

impl FsEventKind {
    /// Get a string representation of the event kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Remove => "remove",
        }
    }
}

/// Item on a backend's event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMessage {
    /// A file system change.
    Event(FsEvent),
    /// A non-fatal backend error (queue overflow, permission problem, ...).
    Error(String),
}
