use tracing::{error, info};

use super::TriageSession;
use crate::build::BuildRef;
use crate::error::Result;
use crate::repro::Reproduction;
use crate::trace;

enum Recording {
    Recorded,
    NotRecorded,
    /// Stop without touching the trace commands so a later run retries.
    Aborted,
}

impl TriageSession {
    /// Record an rr trace of the crash on the initial build and submit it.
    pub(super) async fn trace(&mut self) -> Result<()> {
        if !self.bug.platform().is_linux_x86_64() {
            self.report("Pernosco is only supported for Linux x86_64 bugs.");
            self.bug.remove_command("pernosco");
            self.bug.remove_keyword("pernosco-wanted");
            return Ok(());
        }

        let Some(candidate) = self.baseline().await? else {
            return Ok(());
        };

        match candidate.with_trace_capture(&self.config.evaluator, &self.log_dir) {
            None => {
                self.bug.add_command("pernosco-failed");
                self.report("Pernosco sessions are currently only supported for Firefox bugs!");
            }
            Some(traced) => {
                info!(bug = self.bug.id(), "Attempting to record a pernosco session...");
                let branch = self.branch().await?;
                let initial = self.initial_build_id().await?;
                let result = self
                    .reproducer
                    .reproduce(&traced, &branch, Some(initial.as_str()), false)
                    .await;
                let recording = match result {
                    Reproduction::Crashed(build) => self.submit_trace(&build).await?,
                    Reproduction::Passed(_) | Reproduction::Failed => Recording::NotRecorded,
                };
                match recording {
                    Recording::Recorded => {}
                    Recording::Aborted => return Ok(()),
                    Recording::NotRecorded => {
                        let bot = &self.config.policy.bot_name;
                        let message =
                            format!("{bot} was unable to record a pernosco session for this bug.");
                        self.bug.add_command("pernosco-failed");
                        self.report(message);
                    }
                }
            }
        }

        self.bug.remove_command("pernosco");
        if !self.bug.has_command("pernosco-failed") {
            self.bug.remove_keyword("pernosco-wanted");
            self.bug.add_keyword("pernosco");
        }
        Ok(())
    }

    async fn submit_trace(&mut self, build: &BuildRef) -> Result<Recording> {
        let Some(trace_dir) = trace::find_trace(&self.log_dir)? else {
            error!(bug = self.bug.id(), "Unable to identify a pernosco trace!");
            return Ok(Recording::NotRecorded);
        };
        trace::write_build_descriptor(&trace_dir, &build.branch, &build.changeset)?;
        info!(bug = self.bug.id(), "Successfully recorded a pernosco session.");

        if !self.options.dry_run {
            let Some(creds) = &self.options.trace_creds else {
                error!(bug = self.bug.id(), "Pernosco creds required for submitting traces!");
                return Ok(Recording::Aborted);
            };
            self.collab
                .traces
                .submit(&trace_dir, self.bug.id(), creds)
                .await?;
        }

        self.report(
            "Successfully recorded a pernosco session.  A link to the pernosco session will be added here shortly.",
        );
        Ok(Recording::Recorded)
    }
}
