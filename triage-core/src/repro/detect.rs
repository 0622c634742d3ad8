use std::path::Path;

use tracing::{info, warn};

use super::enumerate::{self, EnumerationContext};
use super::{Candidate, Reproducer, Reproduction};
use crate::attachments;
use crate::bug::Bug;
use crate::build::TargetKind;
use crate::collab::Collaborators;
use crate::config::TriageConfig;
use crate::error::Result;

/// Outcome of searching for a crashing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// The first candidate that crashed on the initial build.
    Found(Candidate),
    /// Nothing crashed. `build_str` names the first build that produced a
    /// verdict at all, if any did.
    NotReproduced { build_str: Option<String> },
}

/// Search the candidate space for a configuration that crashes on the bug's
/// initial build. Attachments are written to `test_dir` first.
///
/// Every attempt bypasses the reproduction cache, since the cache is keyed
/// by build rather than by candidate. This can run the evaluator many
/// times; run it at most once per session.
pub async fn detect(
    bug: &Bug,
    collab: &Collaborators,
    reproducer: &mut Reproducer,
    config: &TriageConfig,
    test_dir: &Path,
) -> Result<Detection> {
    let build_id = bug.initial_build_id(collab).await?.to_string();
    let Some(branch) = bug.branch(collab).await?.map(str::to_string) else {
        return Ok(Detection::NotReproduced { build_str: None });
    };

    let written = attachments::materialize(bug.attachments(), test_dir)?;
    info!(bug = bug.id(), files = written, "Attempting to identify an evaluator configuration...");

    let mut ctx = EnumerationContext::new(
        bug.build_flags(),
        bug.env().clone(),
        bug.component(),
        &config.evaluator,
        &config.policy,
    );
    let mut build_str = None;

    for target in TargetKind::ALL {
        if target == TargetKind::Engine {
            match bug.runtime_flags(collab).await {
                Ok(flags) => ctx = ctx.with_runtime_flags(flags.to_vec()),
                Err(e) => warn!(bug = bug.id(), error = %e, "Unable to determine runtime flags"),
            }
        }

        for candidate in enumerate::candidates(&ctx, target, test_dir) {
            info!("Using config: {candidate}");
            let result = reproducer
                .reproduce(&candidate, &branch, Some(build_id.as_str()), false)
                .await;
            if let Reproduction::Crashed(_) = result {
                info!(bug = bug.id(), "Successfully identified evaluator configuration!");
                return Ok(Detection::Found(candidate));
            }
            if build_str.is_none() {
                build_str = result.build_str();
            }
        }
    }

    Ok(Detection::NotReproduced { build_str })
}
