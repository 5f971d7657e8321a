//! # Sluice Directory Watcher
//!
//! Watches an ingress directory tree and hands every file that appears in it to a
//! [`sluice_core::FileHandler`], along with the name of the data source it was dropped
//! into and the default metadata it inherits from its directories.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │  WatchBackend   │───▶│    DirWatcher    │───▶│   FileHandler   │
//! │ (notify, mock)  │    │ (scan + events)  │    │ (delivery, ...) │
//! └─────────────────┘    └──────────────────┘    └─────────────────┘
//!                                 │
//!                    ┌────────────┴────────────┐
//!                    ▼                         ▼
//!           ┌─────────────────┐       ┌─────────────────┐
//!           │    WatchSet     │       │  MetadataStore  │
//!           │ (one watch per  │       │  (cascading     │
//!           │   directory)    │       │   defaults)     │
//!           └─────────────────┘       └─────────────────┘
//! ```
//!
//! A directory's metadata comes from `.default_metadata.yaml` or `.default_metadata.json`
//! in the directory itself or its nearest ancestor below the root. The data-source tag
//! of a file is the first path segment below the root.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod backends;
pub mod config;
pub mod error;
mod events;
pub mod metadata;
pub mod traits;
mod utils;
mod watch_set;
mod watcher;

pub use backends::*;
pub use config::{
    MetadataFileNames, WatcherConfig, DEFAULT_FILE_SETTLE_TIME, DEFAULT_MAX_CONCURRENT_DISPATCHES,
    DEFAULT_MAX_FILE_SIZE, DEFAULT_METADATA_SETTLE_DELAY, DEFAULT_RESCAN_INTERVAL,
    FILE_SETTLE_POLL_INTERVAL,
};
pub use error::*;
pub use events::*;
pub use metadata::{Metadata, MetadataFormat, MetadataStore};
pub use traits::WatchBackend;
pub use utils::{data_source_tag, is_hidden, PathFilter};
pub use watch_set::{WatchSet, WatchState};
pub use watcher::DirWatcher;
