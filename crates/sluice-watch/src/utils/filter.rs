//! Path filtering for the watch tree.

use crate::config::MetadataFileNames;
use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// File name of `path` as UTF-8, if it has one.
pub fn file_name_str(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

/// Whether the last component of `path` starts with a dot.
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

/// Name of the first path segment of `path` below `root`.
pub fn data_source_tag(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| Error::OutsideRoot(path.to_path_buf()))?;

    match relative.components().next() {
        Some(Component::Normal(segment)) => Ok(segment.to_string_lossy().into_owned()),
        _ => Err(Error::OutsideRoot(path.to_path_buf())),
    }
}

/// Decides which paths under the root the watcher looks at.
///
/// Dot-prefixed names are skipped unless they are default-metadata files or direct
/// children of the root (hidden data-source directories).
#[derive(Debug, Clone)]
pub struct PathFilter {
    root: PathBuf,
    metadata_files: MetadataFileNames,
}

impl PathFilter {
    /// Create a filter for `root`.
    pub fn new(root: impl Into<PathBuf>, metadata_files: MetadataFileNames) -> Self {
        Self {
            root: root.into(),
            metadata_files,
        }
    }

    /// Whether `path` is a recognised default-metadata file.
    pub fn is_metadata_file(&self, path: &Path) -> bool {
        file_name_str(path)
            .map(|name| self.metadata_files.contains(name))
            .unwrap_or(false)
    }

    /// Whether `path` sits directly inside the root.
    pub fn is_root_child(&self, path: &Path) -> bool {
        path.parent() == Some(self.root.as_path())
    }

    /// Whether the watcher should ignore `path`.
    pub fn should_skip(&self, path: &Path) -> bool {
        is_hidden(path) && !self.is_metadata_file(path) && !self.is_root_child(path)
    }
}
