//! Attribute map handed from the watcher to the file handler.

use std::collections::BTreeMap;

/// Per-file attributes. Every entry becomes a request header on delivery.
pub type Attributes = BTreeMap<String, String>;

/// Name of the first path segment below the watch root.
pub const DATA_SOURCE_KEY: &str = "dataSource";

/// JSON-encoded default metadata of the file's directory.
pub const METADATA_KEY: &str = "metadata";

/// Base name of the delivered file.
pub const FILENAME_KEY: &str = "filename";

/// Metadata snapshot used when no default-metadata file applies.
pub const EMPTY_METADATA: &str = "{}";

/// Content type of every delivery body.
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";

/// Build the attribute map for a discovered file.
///
/// `metadata_json` is the serialized metadata snapshot; pass `None` when the directory has
/// no resolved metadata and [`EMPTY_METADATA`] is used instead.
pub fn file_attributes(data_source: impl Into<String>, metadata_json: Option<String>) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert(DATA_SOURCE_KEY.to_string(), data_source.into());
    attributes.insert(
        METADATA_KEY.to_string(),
        metadata_json.unwrap_or_else(|| EMPTY_METADATA.to_string()),
    );
    attributes
}
