//! # Sluice Core
//!
//! Types shared by the watcher and delivery halves of the sluice ingress pipeline.
//!
//! The watcher discovers files and hands each one to a [`FileHandler`] together with an
//! [`Attributes`] map. The delivery client is the production handler; tests substitute
//! the mocks in [`test_support`].

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod attributes;
pub mod handler;
pub mod test_support;

pub use attributes::{
    file_attributes, Attributes, CONTENT_TYPE_OCTET_STREAM, DATA_SOURCE_KEY, EMPTY_METADATA,
    FILENAME_KEY, METADATA_KEY,
};
pub use handler::FileHandler;
