use tracing::warn;

use super::TriageSession;
use crate::error::Result;
use crate::repro::Reproduction;

impl TriageSession {
    /// Check whether an open bug still reproduces at tip, bisecting when it
    /// does (or when only the initial build crashes).
    pub(super) async fn confirm(&mut self) -> Result<()> {
        let Some(candidate) = self.baseline().await? else {
            return Ok(());
        };
        let branch = self.branch().await?;

        let tip = self
            .reproducer
            .reproduce(&candidate, &branch, None, true)
            .await;
        match &tip {
            Reproduction::Failed => {
                warn!(bug = self.bug.id(), "Failed to confirm bug (bad build)");
                return Ok(());
            }
            Reproduction::Crashed(build) => {
                if !self.bug.has_command("confirmed") {
                    self.report(format!("Verified bug as reproducible on {}.", build.build_str()));
                    if !self.bug.has_command("bisected") {
                        self.bisect_with(&candidate).await?;
                    }
                }
            }
            Reproduction::Passed(tip_build) => {
                let initial = self.initial_build_id().await?;
                let orig = self
                    .reproducer
                    .reproduce(&candidate, &branch, Some(initial.as_str()), true)
                    .await;
                match &orig {
                    Reproduction::Crashed(orig_build) => {
                        self.report(format!(
                            "Testcase crashes using the initial build ({}) but not with tip ({}.)\n",
                            orig_build.build_str(),
                            tip_build.build_str()
                        ));
                        let bisected = self.bisect_with(&candidate).await?;
                        if bisected.is_some_and(|outcome| outcome.is_success()) {
                            self.request_range_confirmation();
                        }
                    }
                    Reproduction::Passed(orig_build) => {
                        self.report(format!(
                            "Unable to reproduce bug using the following builds:\n> {}\n> {}",
                            tip_build.build_str(),
                            orig_build.build_str()
                        ));
                    }
                    Reproduction::Failed => {
                        self.report(format!(
                            "Unable to reproduce bug using the following builds:\n> {}\n> {initial} (no usable build)",
                            tip_build.build_str()
                        ));
                    }
                }
                self.close_bug = true;
            }
        }

        self.bug.add_command("confirmed");
        self.bug.remove_command("confirm");
        self.bug.remove_command("analyze");
        Ok(())
    }

    /// Ask the assignee to confirm a bisected fix range.
    fn request_range_confirmation(&mut self) {
        let Some(assignee) = self.bug.assignee().cloned() else {
            warn!(bug = self.bug.id(), "No assignee to confirm the bisection range");
            return;
        };
        if self.bug.add_needinfo(&assignee.email) {
            self.report(format!(
                "{}, can you confirm that the above bisection range is responsible for fixing this issue?",
                assignee.nick
            ));
        }
    }
}
