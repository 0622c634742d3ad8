use std::fmt::Debug;

use serde_json::{Map, Value};

use crate::bug::BugRecord;
use crate::error::TrackerError;

/// Read and update access to the issue tracker.
#[async_trait::async_trait]
pub trait IssueTracker: Send + Sync + Debug {
    /// Fetch one bug with its comments and attachments.
    async fn fetch(&self, id: u64) -> Result<BugRecord, TrackerError>;

    /// Run a saved search. Results carry no comments or attachments.
    async fn search(&self, params: &Map<String, Value>) -> Result<Vec<BugRecord>, TrackerError>;

    /// Apply a field diff (as produced by [`crate::bug::Bug::diff`]) to a bug.
    async fn push(&self, id: u64, diff: &Map<String, Value>) -> Result<(), TrackerError>;
}
