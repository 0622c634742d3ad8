//! Bisection requests and outcomes. The search itself is delegated.

pub mod traits;

use serde::{Deserialize, Serialize};

use crate::build::{BuildFlags, BuildRef, Platform};
use crate::repro::Candidate;

pub use traits::Bisector;

/// Everything the delegate needs to search one build range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BisectRequest {
    pub candidate: Candidate,
    pub branch: String,
    /// `None` lets the delegate pick the earliest build it knows of.
    pub start: Option<String>,
    /// Revision, date, or `latest`.
    pub end: String,
    pub flags: BuildFlags,
    pub platform: Platform,
    /// Search for the change that fixed the bug rather than the one that
    /// introduced it.
    pub find_fix: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BisectStatus {
    Success,
    Failed,
}

/// Result reported by the bisection delegate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BisectOutcome {
    pub status: BisectStatus,
    /// Failure reason; empty on success.
    #[serde(default)]
    pub message: String,
    pub start: BuildRef,
    pub end: BuildRef,
    #[serde(default)]
    pub pushlog: Option<String>,
}

impl BisectOutcome {
    pub fn is_success(&self) -> bool {
        self.status == BisectStatus::Success
    }
}
