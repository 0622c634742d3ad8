use tracing::{error, info};

use super::{Candidate, Reproduction, ReproductionCache};
use crate::build::{BuildQuery, Platform};
use crate::collab::Collaborators;
use crate::evaluate::Verdict;

/// Runs candidates against resolved builds and remembers the outcomes.
#[derive(Debug)]
pub struct Reproducer {
    collab: Collaborators,
    platform: Platform,
    cache: ReproductionCache,
}

impl Reproducer {
    pub fn new(collab: Collaborators, platform: Platform) -> Self {
        Self {
            collab,
            platform,
            cache: ReproductionCache::new(),
        }
    }

    pub fn cache(&self) -> &ReproductionCache {
        &self.cache
    }

    /// Try `candidate` on `branch` at `build_id`, or at tip when `None`.
    ///
    /// Builds that cannot be resolved or obtained yield
    /// [`Reproduction::Failed`] and are not recorded. With `use_cache`, a
    /// build already tried on this branch returns the recorded outcome
    /// without running the evaluator; fresh outcomes are always recorded.
    pub async fn reproduce(
        &mut self,
        candidate: &Candidate,
        branch: &str,
        build_id: Option<&str>,
        use_cache: bool,
    ) -> Reproduction {
        let query = BuildQuery::new(
            branch,
            build_id,
            candidate.build_flags(),
            candidate.target(),
            &self.platform,
        );
        let build = match self.collab.resolver.resolve(&query).await {
            Ok(build) => build,
            Err(e) => {
                error!(branch, build = %query.build, error = %e, "Error fetching build");
                return Reproduction::Failed;
            }
        };

        if use_cache {
            if let Some(cached) = self.cache.get(branch, &build.name) {
                return cached.clone();
            }
        }

        info!("Attempting to reproduce bug on {}...", build.build_str());

        let lease = match self.collab.builds.acquire(&build, candidate.target()).await {
            Ok(lease) => lease,
            Err(e) => {
                error!(branch, build = %build.name, error = %e, "Error fetching build");
                return Reproduction::Failed;
            }
        };

        let result = match self.collab.evaluator.evaluate(candidate, lease.path()).await {
            Ok(Verdict::Crashed) => Reproduction::Crashed(build.clone()),
            Ok(Verdict::Passed) => Reproduction::Passed(build.clone()),
            Ok(Verdict::Failed) => Reproduction::Failed,
            Err(e) => {
                error!(branch, build = %build.name, error = %e, "Evaluator failed");
                return Reproduction::Failed;
            }
        };
        drop(lease);

        self.cache.insert(branch, &build.name, result.clone());
        result
    }
}
