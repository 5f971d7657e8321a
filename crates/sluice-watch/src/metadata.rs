//! Cascading default metadata.
//!
//! A directory's metadata comes from the first recognised default-metadata file found in the
//! directory itself or, failing that, in its nearest ancestor below the watch root. Results are
//! cached per directory and refreshed when a metadata file changes.

use crate::config::MetadataFileNames;
use crate::error::{Error, Result};
use crate::utils::file_name_str;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Resolved key/value metadata of a directory.
pub type Metadata = BTreeMap<String, String>;

/// Serialization format of a default-metadata file, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataFormat {
    /// `.yaml` / `.yml`
    Yaml,
    /// `.json`
    Json,
}

impl MetadataFormat {
    /// Determine the format from a file name.
    pub fn from_file_name(name: &str) -> Result<Self> {
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            Some("json") => Ok(Self::Json),
            _ => Err(Error::UnsupportedMetadataFormat(name.to_string())),
        }
    }

    /// Parse file content into a flat string map.
    ///
    /// Scalar values are stored in their string form; nested values are rejected. Empty
    /// content is an empty map.
    pub fn parse(&self, path: &Path, content: &str) -> Result<Metadata> {
        if content.trim().is_empty() {
            return Ok(Metadata::new());
        }

        let parse_error = |reason: String| Error::MetadataParse {
            path: path.to_path_buf(),
            reason,
        };

        match self {
            Self::Yaml => {
                let raw: Option<BTreeMap<String, serde_yaml::Value>> =
                    serde_yaml::from_str(content).map_err(|e| parse_error(e.to_string()))?;
                raw.unwrap_or_default()
                    .into_iter()
                    .map(|(key, value)| {
                        yaml_scalar(value)
                            .map(|value| (key.clone(), value))
                            .ok_or_else(|| parse_error(format!("value of '{}' is not a scalar", key)))
                    })
                    .collect()
            }
            Self::Json => {
                let raw: Option<BTreeMap<String, serde_json::Value>> =
                    serde_json::from_str(content).map_err(|e| parse_error(e.to_string()))?;
                raw.unwrap_or_default()
                    .into_iter()
                    .map(|(key, value)| {
                        json_scalar(value)
                            .map(|value| (key.clone(), value))
                            .ok_or_else(|| parse_error(format!("value of '{}' is not a scalar", key)))
                    })
                    .collect()
            }
        }
    }
}

fn yaml_scalar(value: serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Null => Some(String::new()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s),
        _ => None,
    }
}

fn json_scalar(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => Some(String::new()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) => Some(s),
        _ => None,
    }
}

/// JSON snapshot of resolved metadata, as attached to dispatched files.
pub fn metadata_to_json(metadata: &Metadata) -> Result<String> {
    Ok(serde_json::to_string(metadata)?)
}

/// Read and parse one metadata file. `Ok(None)` when it does not exist.
pub async fn read_metadata_file(path: &Path) -> Result<Option<Metadata>> {
    let name = file_name_str(path)
        .ok_or_else(|| Error::UnsupportedMetadataFormat(path.display().to_string()))?;
    let format = MetadataFormat::from_file_name(name)?;

    match tokio::fs::read_to_string(path).await {
        Ok(content) => format.parse(path, &content).map(Some),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Per-directory metadata cache bounded by the watch root.
#[derive(Debug)]
pub struct MetadataStore {
    root: PathBuf,
    file_names: MetadataFileNames,
    cache: DashMap<PathBuf, Metadata>,
}

impl MetadataStore {
    /// Create an empty store for `root`.
    pub fn new(root: impl Into<PathBuf>, file_names: MetadataFileNames) -> Self {
        Self {
            root: root.into(),
            file_names,
            cache: DashMap::new(),
        }
    }

    /// Watch root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Recognised metadata file names.
    pub fn file_names(&self) -> &MetadataFileNames {
        &self.file_names
    }

    /// Resolve metadata for `dir` from disk, ignoring the cache.
    ///
    /// Walks from `dir` towards the root and returns the first metadata file that parses.
    /// The root itself, and anything outside it, never has metadata.
    pub async fn resolve(&self, dir: &Path) -> Option<Metadata> {
        if dir == self.root || !dir.starts_with(&self.root) {
            return None;
        }

        let mut current = dir.to_path_buf();
        loop {
            if let Some(metadata) = self.read_directory_metadata(&current).await {
                return Some(metadata);
            }

            match current.parent() {
                Some(parent) if parent != self.root && parent.starts_with(&self.root) => {
                    current = parent.to_path_buf();
                }
                _ => return None,
            }
        }
    }

    /// Cached metadata for `dir`, resolving and caching it on a miss.
    pub async fn lookup(&self, dir: &Path) -> Option<Metadata> {
        if let Some(cached) = self.cached(dir) {
            return Some(cached);
        }

        let resolved = self.resolve(dir).await?;
        self.cache.insert(dir.to_path_buf(), resolved.clone());
        Some(resolved)
    }

    /// Re-resolve `dir` after one of its metadata files changed.
    ///
    /// Cached descendants are dropped because they may have inherited the old value.
    pub async fn refresh(&self, dir: &Path) -> Option<Metadata> {
        let resolved = self.resolve(dir).await;
        self.invalidate_subtree(dir);

        match &resolved {
            Some(metadata) => {
                self.cache.insert(dir.to_path_buf(), metadata.clone());
                info!(dir = %dir.display(), ?metadata, "Updated default metadata for directory");
            }
            None => {
                info!(dir = %dir.display(), "Removed default metadata for directory");
            }
        }

        resolved
    }

    /// Drop the cache entries of a removed directory and everything below it.
    pub fn evict(&self, dir: &Path) {
        let removed = self.invalidate_subtree(dir);
        if removed > 0 {
            debug!(dir = %dir.display(), removed, "Evicted cached metadata");
        }
    }

    /// Cached entry for exactly `dir`, without touching the disk.
    pub fn cached(&self, dir: &Path) -> Option<Metadata> {
        self.cache.get(dir).map(|entry| entry.value().clone())
    }

    /// Number of cached directories.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    fn invalidate_subtree(&self, dir: &Path) -> usize {
        let before = self.cache.len();
        self.cache.retain(|key, _| !key.starts_with(dir));
        before.saturating_sub(self.cache.len())
    }

    async fn read_directory_metadata(&self, dir: &Path) -> Option<Metadata> {
        for name in self.file_names.iter() {
            let path = dir.join(name);
            match read_metadata_file(&path).await {
                Ok(Some(metadata)) => return Some(metadata),
                Ok(None) => {}
                Err(e) => {
                    error!(file = %path.display(), error = %e, "Failed to read metadata file");
                }
            }
        }
        None
    }
}
