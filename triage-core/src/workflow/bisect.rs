use tracing::warn;

use super::TriageSession;
use crate::bisect::{BisectOutcome, BisectRequest};
use crate::build::LATEST;
use crate::error::Result;
use crate::repro::{Candidate, Reproduction};

impl TriageSession {
    pub(super) async fn bisect(&mut self) -> Result<Option<BisectOutcome>> {
        let Some(candidate) = self.baseline().await? else {
            return Ok(None);
        };
        self.bisect_with(&candidate).await
    }

    /// Bisect with `candidate`. Searches for the fix when tip no longer
    /// crashes, and for the regression otherwise.
    pub(super) async fn bisect_with(
        &mut self,
        candidate: &Candidate,
    ) -> Result<Option<BisectOutcome>> {
        let branch = self.branch().await?;
        let tip = self.reproducer.reproduce(candidate, &branch, None, true).await;
        if matches!(tip, Reproduction::Failed) {
            warn!(bug = self.bug.id(), "Failed to bisect bug (bad build)");
            return Ok(None);
        }

        let find_fix = tip.is_passed();
        let initial = self.initial_build_id().await?;
        let (start, end) = if find_fix {
            (Some(initial), LATEST.to_string())
        } else {
            (None, initial)
        };
        let request = BisectRequest {
            candidate: candidate.clone(),
            branch,
            start,
            end,
            flags: candidate.build_flags(),
            platform: self.bug.platform().clone(),
            find_fix,
        };

        let outcome = match self.collab.bisector.bisect(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.bug.add_command("bisected");
                self.report(format!(
                    "Unable to bisect testcase ({}).",
                    e.to_string().to_lowercase()
                ));
                return Ok(None);
            }
        };

        self.bug.add_command("bisected");
        self.bug.remove_command("bisect");

        let endpoints = format!(
            "> Start: {} ({})\n> End: {} ({})",
            outcome.start.changeset, outcome.start.id, outcome.end.changeset, outcome.end.id
        );
        if outcome.is_success() {
            let verb = if find_fix { "fixed" } else { "introduced" };
            self.report(format!(
                "The bug appears to have been {verb} in the following build range:\n{endpoints}\n> Pushlog: {}\n\n",
                outcome.pushlog.as_deref().unwrap_or_default()
            ));
            if !find_fix {
                self.bug.add_keyword("regression");
            }
        } else {
            self.report(format!(
                "Unable to bisect testcase ({}):\n{endpoints}\n> BuildFlags: {}\n",
                outcome.message,
                candidate.build_flags()
            ));
        }

        Ok(Some(outcome))
    }
}
