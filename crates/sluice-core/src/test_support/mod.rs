//! Test doubles shared by the workspace crates.

pub mod mocks;

pub use mocks::{HandledFile, RecordingHandler};
