use std::fmt::Debug;

use crate::error::TrackerError;

/// Release metadata needed to derive a bug's branch and baseline revision.
#[async_trait::async_trait]
pub trait ReleaseInfo: Send + Sync + Debug {
    /// Major version currently at the development tip.
    async fn tip_version(&self) -> Result<u32, TrackerError>;

    /// Whether `rev` exists in the history of `branch`.
    async fn revision_exists(&self, branch: &str, rev: &str) -> Result<bool, TrackerError>;
}
