use std::sync::Arc;

use crate::bisect::Bisector;
use crate::bug::ReleaseInfo;
use crate::build::{BuildManager, BuildResolver};
use crate::evaluate::Evaluator;
use crate::trace::TraceSubmitter;
use crate::tracker::IssueTracker;

/// The external systems a triage session talks to, bundled for injection.
#[derive(Clone, Debug)]
pub struct Collaborators {
    pub tracker: Arc<dyn IssueTracker>,
    pub releases: Arc<dyn ReleaseInfo>,
    pub resolver: Arc<dyn BuildResolver>,
    pub builds: Arc<dyn BuildManager>,
    pub evaluator: Arc<dyn Evaluator>,
    pub bisector: Arc<dyn Bisector>,
    pub traces: Arc<dyn TraceSubmitter>,
}
