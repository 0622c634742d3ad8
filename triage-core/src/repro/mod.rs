//! Reproduction: candidate configurations, their enumeration, the
//! per-session result cache, and the search for a crashing baseline.

pub mod cache;
pub mod candidate;
pub mod detect;
pub mod enumerate;
pub mod reproducer;

use crate::build::BuildRef;

pub use cache::ReproductionCache;
pub use candidate::{BrowserCandidate, Candidate, EngineCandidate};
pub use detect::{Detection, detect};
pub use enumerate::EnumerationContext;
pub use reproducer::Reproducer;

/// Outcome of running one candidate against one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reproduction {
    Crashed(BuildRef),
    Passed(BuildRef),
    /// No verdict: the build was unusable or the evaluator could not run.
    Failed,
}

impl Reproduction {
    pub fn build(&self) -> Option<&BuildRef> {
        match self {
            Self::Crashed(build) | Self::Passed(build) => Some(build),
            Self::Failed => None,
        }
    }

    pub fn build_str(&self) -> Option<String> {
        self.build().map(BuildRef::build_str)
    }

    pub fn is_crashed(&self) -> bool {
        matches!(self, Self::Crashed(_))
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed(_))
    }
}
