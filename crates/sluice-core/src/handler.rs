//! File handling capability
//!
//! The directory watcher never talks to the network itself. It resolves the attributes of
//! each discovered file and passes them to whatever implements [`FileHandler`].

use crate::attributes::Attributes;
use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Consumer of discovered files.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`; the watcher calls `handle_file` from several
/// tasks at once.
#[async_trait]
pub trait FileHandler: Send + Sync {
    /// Handle one file.
    ///
    /// The `cancel` token belongs to the calling pipeline. Long-running work should stop
    /// early once it is cancelled.
    async fn handle_file(
        &self,
        cancel: &CancellationToken,
        path: &Path,
        attributes: &Attributes,
    ) -> anyhow::Result<()>;

    /// Handler name used in log lines.
    fn name(&self) -> &'static str {
        "file-handler"
    }
}
