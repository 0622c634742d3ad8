use std::fmt::Debug;
use std::path::Path;

use super::Verdict;
use crate::error::EvaluateError;
use crate::repro::Candidate;

/// Runs a configuration candidate against a local build.
#[async_trait::async_trait]
pub trait Evaluator: Send + Sync + Debug {
    /// Execute `candidate` against the build at `build_path`. Timeouts are
    /// enforced by the evaluator itself.
    async fn evaluate(&self, candidate: &Candidate, build_path: &Path)
    -> Result<Verdict, EvaluateError>;

    /// Runtime flag names accepted by the engine shell at revision `build_id`.
    async fn valid_runtime_flags(&self, build_id: &str) -> Result<Vec<String>, EvaluateError>;
}
