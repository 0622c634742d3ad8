use tracing::{info, warn};

use super::TriageSession;
use crate::error::Result;
use crate::repro::{Candidate, Reproduction};

const VERIFIED: &str = "VERIFIED";

impl TriageSession {
    /// Check that a fixed bug no longer reproduces, on its own branch and on
    /// every branch still flagged `fixed`.
    pub(super) async fn verify(&mut self) -> Result<()> {
        let Some(candidate) = self.baseline().await? else {
            return Ok(());
        };

        if self.bug.status() != VERIFIED {
            self.verify_own_branch(&candidate).await?;
        }

        let branches_verified = self.verify_branches(&candidate).await?;
        if self.bug.status() == VERIFIED && branches_verified {
            self.close_bug = true;
        }
        Ok(())
    }

    async fn verify_own_branch(&mut self, candidate: &Candidate) -> Result<()> {
        let branch = self.branch().await?;
        let patch_rev = self.bug.find_patch_rev(&branch, &self.config.hg.base_url);
        let tip = self
            .reproducer
            .reproduce(candidate, &branch, patch_rev.as_deref(), true)
            .await;

        self.bug.remove_command("verify");
        self.bug.remove_command("analyze");

        match tip {
            Reproduction::Passed(tip_build) => {
                let bot = self.config.policy.bot_name.clone();
                let initial = self.initial_build_id().await?;
                let orig = self
                    .reproducer
                    .reproduce(candidate, &branch, Some(initial.as_str()), true)
                    .await;
                match orig {
                    Reproduction::Passed(orig_build) => {
                        self.report(format!(
                            "Bug appears to be fixed on {} but {bot} was unable to reproduce using {}.",
                            tip_build.build_str(),
                            orig_build.build_str()
                        ));
                        self.close_bug = true;
                    }
                    Reproduction::Failed => {
                        self.report(format!(
                            "Bug appears to be fixed on {} but {bot} was unable to find a usable build for {initial}.",
                            tip_build.build_str()
                        ));
                        self.close_bug = true;
                    }
                    Reproduction::Crashed(_) => {
                        self.report(format!("Verified bug as fixed on rev {}.", tip_build.build_str()));
                        if self.bug.status() != "NEW" {
                            self.bug.set_status(VERIFIED);
                        }
                    }
                }
            }
            Reproduction::Crashed(tip_build) => {
                let keyword = &self.config.policy.automation_keyword;
                let message = format!(
                    "Bug marked as FIXED but still reproduces on {}.  If you believe this to be incorrect, please remove the {keyword} keyword to prevent further analysis.",
                    tip_build.build_str()
                );
                self.report(message);
                self.bug.set_status("REOPENED");
                self.bug.add_command("confirmed");
            }
            Reproduction::Failed => {
                warn!(bug = self.bug.id(), "Failed to verify bug (bad build)");
            }
        }
        Ok(())
    }

    /// Re-test each branch flagged `fixed` at its own patch revision.
    /// Returns whether every tested branch verified.
    async fn verify_branches(&mut self, candidate: &Candidate) -> Result<bool> {
        let branches = self.bug.branches(&self.collab).await?.to_vec();
        let prefix = self.config.policy.status_flag_prefix.clone();
        let mut all_verified = true;

        for branch in branches {
            let flag = branch.status_flag(&prefix);
            if self.bug.status_flag(&flag) != Some("fixed") {
                continue;
            }
            let Some(patch_rev) = self.bug.find_patch_rev(&branch.alias, &self.config.hg.base_url)
            else {
                warn!(bug = self.bug.id(), "Unable to find commit for {flag}.  Cannot verify fix!");
                continue;
            };

            match self
                .reproducer
                .reproduce(candidate, &branch.alias, Some(patch_rev.as_str()), true)
                .await
            {
                Reproduction::Passed(_) => {
                    info!("Verified fixed on {flag}");
                    self.bug.set_status_flag(&flag, "verified");
                }
                Reproduction::Crashed(_) => {
                    info!("Bug remains vulnerable on {flag}");
                    self.bug.set_status_flag(&flag, "affected");
                    all_verified = false;
                }
                Reproduction::Failed => all_verified = false,
            }
        }
        Ok(all_verified)
    }
}
