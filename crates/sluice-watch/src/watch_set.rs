//! Registry of directories under active observation.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::path::{Path, PathBuf};

/// Lifecycle of a directory registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Claimed; backend registration in progress.
    Pending,
    /// Registered with the backend.
    Active,
}

/// Concurrent set of watched directories keyed by absolute path.
///
/// Claiming is atomic, so the scan and the event loop can race on the same directory and
/// only one of them registers it with the backend.
#[derive(Debug, Default)]
pub struct WatchSet {
    dirs: DashMap<PathBuf, WatchState>,
}

impl WatchSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `path` for registration. Returns `false` if it is already claimed or active.
    pub fn try_claim(&self, path: &Path) -> bool {
        match self.dirs.entry(path.to_path_buf()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(WatchState::Pending);
                true
            }
        }
    }

    /// Mark a claimed path as registered.
    pub fn activate(&self, path: &Path) {
        if let Some(mut state) = self.dirs.get_mut(path) {
            *state = WatchState::Active;
        }
    }

    /// Forget `path`, returning its previous state.
    pub fn release(&self, path: &Path) -> Option<WatchState> {
        self.dirs.remove(path).map(|(_, state)| state)
    }

    /// Forget `path` and every directory below it. Returns the active paths that were removed.
    pub fn release_subtree(&self, path: &Path) -> Vec<PathBuf> {
        let mut released = Vec::new();
        self.dirs.retain(|dir, state| {
            if dir.starts_with(path) {
                if *state == WatchState::Active {
                    released.push(dir.clone());
                }
                false
            } else {
                true
            }
        });
        released.sort();
        released
    }

    /// Current state of `path`.
    pub fn state(&self, path: &Path) -> Option<WatchState> {
        self.dirs.get(path).map(|state| *state)
    }

    /// Whether `path` is claimed or active.
    pub fn contains(&self, path: &Path) -> bool {
        self.dirs.contains_key(path)
    }

    /// Sorted snapshot of all tracked paths.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.dirs.iter().map(|entry| entry.key().clone()).collect();
        paths.sort();
        paths
    }

    /// Number of tracked directories.
    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}
