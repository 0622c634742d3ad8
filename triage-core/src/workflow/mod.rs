//! The per-bug triage session.
//!
//! A session owns one [`Bug`] and a private working directory. It picks at
//! most one primary action (see [`state::primary_action`]), optionally
//! records a trace, and then commits every field change plus the queued
//! report lines as a single tracker update.

mod bisect;
mod confirm;
pub mod state;
mod trace;
mod verify;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, instrument};

use crate::bug::Bug;
use crate::collab::Collaborators;
use crate::config::TriageConfig;
use crate::error::{Result, TraceError};
use crate::repro::{self, Candidate, Detection, Reproducer};
use crate::trace::TraceCredentials;

pub use state::PrimaryAction;

/// Session switches supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Compute and log changes without pushing them or uploading traces.
    pub dry_run: bool,
    pub trace_creds: Option<TraceCredentials>,
}

/// What a processed session did.
#[derive(Debug, Clone, Default)]
pub struct SessionOutcome {
    pub action: Option<PrimaryAction>,
    pub traced: bool,
    /// Automation was ended for this bug.
    pub closed: bool,
    /// Fields changed, as sent (or, when dry, as they would be sent).
    pub changes: Map<String, Value>,
    pub pushed: bool,
}

impl SessionOutcome {
    /// Short label for progress output.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(action) = self.action {
            parts.push(action.as_str().to_string());
        }
        if self.traced {
            parts.push("trace".to_string());
        }
        if self.closed {
            parts.push("closed".to_string());
        }
        parts.push(match (self.changes.is_empty(), self.pushed) {
            (true, _) => "no changes".to_string(),
            (false, true) => format!("{} field(s) updated", self.changes.len()),
            (false, false) => format!("{} field(s) changed (not pushed)", self.changes.len()),
        });
        parts.join(", ")
    }
}

/// Baseline configuration state. Detection runs at most once per session.
#[derive(Debug)]
enum Baseline {
    Unknown,
    Found(Candidate),
    Missing,
}

/// One bug's trip through the workflow.
#[derive(Debug)]
pub struct TriageSession {
    bug: Bug,
    collab: Collaborators,
    config: Arc<TriageConfig>,
    test_dir: PathBuf,
    log_dir: PathBuf,
    options: SessionOptions,
    reproducer: Reproducer,
    baseline: Baseline,
    queue: Vec<String>,
    close_bug: bool,
}

impl TriageSession {
    /// Prepare a session rooted at `working_dir`, which must be empty and
    /// exclusively owned by this session.
    ///
    /// Trace credentials without the submission tool are fatal unless the
    /// session is dry.
    pub fn new(
        bug: Bug,
        collab: Collaborators,
        config: Arc<TriageConfig>,
        working_dir: &Path,
        options: SessionOptions,
    ) -> Result<Self> {
        let test_dir = working_dir.join("testcase");
        let log_dir = working_dir.join("logs");
        std::fs::create_dir_all(&test_dir)?;
        std::fs::create_dir_all(&log_dir)?;

        if options.trace_creds.is_some() && !collab.traces.is_available() && !options.dry_run {
            return Err(TraceError::ToolUnavailable(config.tools.trace_submit.clone()).into());
        }

        let reproducer = Reproducer::new(collab.clone(), bug.platform().clone());
        Ok(Self {
            bug,
            collab,
            config,
            test_dir,
            log_dir,
            options,
            reproducer,
            baseline: Baseline::Unknown,
            queue: Vec::new(),
            close_bug: false,
        })
    }

    pub fn bug(&self) -> &Bug {
        &self.bug
    }

    pub fn into_bug(self) -> Bug {
        self.bug
    }

    pub fn reproducer(&self) -> &Reproducer {
        &self.reproducer
    }

    /// Run whatever the bug's state calls for and commit the result.
    #[instrument(skip_all, fields(bug = self.bug.id()))]
    pub async fn process(&mut self, force_confirm: bool) -> Result<SessionOutcome> {
        let mut outcome = SessionOutcome::default();

        if self.is_supported().await? {
            let config = Arc::clone(&self.config);
            let branches = self.bug.branches(&self.collab).await?.to_vec();
            outcome.action =
                state::primary_action(&self.bug, &config.policy, &branches, force_confirm);
            match outcome.action {
                Some(PrimaryAction::Verify) => self.verify().await?,
                Some(PrimaryAction::Confirm) => self.confirm().await?,
                Some(PrimaryAction::Bisect) => {
                    self.bisect().await?;
                }
                None => info!("No action required"),
            }

            if state::needs_trace(&self.bug) && !matches!(self.baseline, Baseline::Missing) {
                self.trace().await?;
                outcome.traced = true;
            }
        }

        outcome.closed = self.close_bug;
        let (changes, pushed) = self.commit().await?;
        outcome.changes = changes;
        outcome.pushed = pushed;
        Ok(outcome)
    }

    /// Reject bugs with no valid action, marking them for closure.
    async fn is_supported(&mut self) -> Result<bool> {
        let resolution = self.bug.resolution().to_string();
        if self.config.policy.is_unsupported_resolution(&resolution) {
            self.report(format!("No valid actions for resolution ({resolution})."));
            self.close_bug = true;
            return Ok(false);
        }

        if self.bug.branch(&self.collab).await?.is_none() {
            let version = self.bug.record().version.clone();
            self.report(format!("Bug filed against non-supported branch ({version})."));
            self.close_bug = true;
            return Ok(false);
        }
        Ok(true)
    }

    /// The baseline configuration, detecting it on first use. A failed
    /// detection reports why and marks the bug for closure.
    async fn baseline(&mut self) -> Result<Option<Candidate>> {
        match &self.baseline {
            Baseline::Found(candidate) => return Ok(Some(candidate.clone())),
            Baseline::Missing => return Ok(None),
            Baseline::Unknown => {}
        }

        let detection = repro::detect(
            &self.bug,
            &self.collab,
            &mut self.reproducer,
            &self.config,
            &self.test_dir,
        )
        .await?;

        match detection {
            Detection::Found(candidate) => {
                self.baseline = Baseline::Found(candidate.clone());
                Ok(Some(candidate))
            }
            Detection::NotReproduced { build_str } => {
                let bot = self.config.policy.bot_name.clone();
                match build_str {
                    Some(build_str) => self.report(format!(
                        "Unable to reproduce bug {} using build {build_str}.  Without a baseline, {bot} is unable to analyze this bug.",
                        self.bug.id()
                    )),
                    None => self.report(format!("{bot} was unable reproduce this issue.")),
                }
                self.close_bug = true;
                self.baseline = Baseline::Missing;
                Ok(None)
            }
        }
    }

    async fn branch(&self) -> Result<String> {
        self.bug.require_branch(&self.collab).await
    }

    async fn initial_build_id(&self) -> Result<String> {
        Ok(self.bug.initial_build_id(&self.collab).await?.to_string())
    }

    /// Queue a message for the bug comment and log it.
    fn report(&mut self, message: impl Into<String>) {
        let message = message.into();
        for line in message.lines() {
            info!("{line}");
        }
        self.queue.push(message);
    }

    /// Flush queued messages into a comment and push the field diff.
    async fn commit(&mut self) -> Result<(Map<String, Value>, bool)> {
        let keyword = self.config.policy.automation_keyword.clone();
        if self.close_bug && self.bug.remove_keyword(&keyword) {
            self.report(format!(
                "Removing {keyword} keyword as no further action possible.  Please review the bug and re-add the keyword for further analysis."
            ));
        }

        if !self.queue.is_empty() {
            let body = self.queue.join("\n");
            self.queue.clear();
            self.bug.set_comment(body);
        }

        let diff = self.bug.diff()?;
        if diff.is_empty() {
            return Ok((diff, false));
        }
        let changes = Value::Object(diff.clone());
        info!("Changes: {changes}");
        if self.options.dry_run {
            return Ok((diff, false));
        }
        self.collab.tracker.push(self.bug.id(), &diff).await?;
        Ok((diff, true))
    }
}
