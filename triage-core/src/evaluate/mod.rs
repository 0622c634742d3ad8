//! Testcase evaluation verdicts and the evaluator contract.

pub mod traits;

use serde::{Deserialize, Serialize};

pub use traits::Evaluator;

/// Raw outcome of running a candidate against a local build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Crashed,
    Passed,
    /// The evaluator could not produce a verdict (bad build, launch failure).
    Failed,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Crashed => "crashed",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }
}
