//! Watch backend implementations.

mod mock_backend;
mod notify_backend;

pub use mock_backend::MockBackend;
pub use notify_backend::NotifyBackend;
