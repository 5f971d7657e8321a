//! Path helpers shared by the scanner and the event loop.

mod filter;

pub use filter::{data_source_tag, file_name_str, is_hidden, PathFilter};
