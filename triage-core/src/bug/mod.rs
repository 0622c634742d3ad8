//! Typed view over a tracked bug and the facts derived from its text.
//!
//! Derived facts are computed on first use and memoized for the lifetime of
//! the [`Bug`]. Facts that need a collaborator (release metadata, build
//! resolution) are async and take the [`Collaborators`] bundle explicitly.
//! Re-fetching the bug is the only way to invalidate them.

pub mod commands;
pub mod record;
pub mod traits;

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::build::{BuildFlags, BuildQuery, Platform, TargetKind};
use crate::collab::Collaborators;
use crate::error::{BugError, Result, TrackerError};
use crate::hg;

pub use commands::CommandMap;
pub use record::{Attachment, BugFlag, BugRecord, Comment, NewComment, UserDetail};
pub use traits::ReleaseInfo;

/// Long-term-support aliases tried when building the branch table.
const ESR_ALIASES: [&str; 2] = ["esr-next", "esr-stable"];

/// A release track and its major version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    /// Build-fetch alias: `central`, `beta`, `release`, or `esrNNN`.
    pub alias: String,
    pub version: u32,
}

impl Branch {
    fn new(alias: impl Into<String>, version: u32) -> Self {
        Self {
            alias: alias.into(),
            version,
        }
    }

    /// Name of the per-branch status field, e.g. `cf_status_firefox130` or
    /// `cf_status_firefox_esr115`.
    pub fn status_flag(&self, prefix: &str) -> String {
        if self.alias.starts_with("esr") {
            format!("{prefix}_{}", self.alias)
        } else {
            format!("{prefix}{}", self.version)
        }
    }
}

#[derive(Debug, Default)]
struct Facts {
    comment_zero: OnceLock<String>,
    build_flags: OnceLock<BuildFlags>,
    env: OnceLock<BTreeMap<String, String>>,
    platform: OnceLock<Platform>,
    tip_version: OnceCell<u32>,
    branches: OnceCell<Vec<Branch>>,
    branch: OnceCell<Option<String>>,
    initial_build_id: OnceCell<String>,
    runtime_flags: OnceCell<Vec<String>>,
}

/// A bug under triage.
#[derive(Debug)]
pub struct Bug {
    record: BugRecord,
    /// Record as fetched, for computing the update diff.
    snapshot: Value,
    marker: String,
    commands: CommandMap,
    facts: Facts,
}

impl Bug {
    /// Wrap a fetched record. `marker` names the whiteboard command block.
    pub fn new(record: BugRecord, marker: &str) -> Result<Self> {
        let snapshot = serde_json::to_value(&record)?;
        let commands = CommandMap::parse(marker, &record.whiteboard);
        Ok(Self {
            record,
            snapshot,
            marker: marker.to_string(),
            commands,
            facts: Facts::default(),
        })
    }

    /// Load an offline record previously written by [`Bug::to_json`].
    pub fn from_json(json: &str, marker: &str) -> Result<Self> {
        let record: BugRecord = serde_json::from_str(json)?;
        Self::new(record, marker)
    }

    /// Export the full record, attachments and comments included.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.record)?)
    }

    pub fn id(&self) -> u64 {
        self.record.id
    }

    pub fn record(&self) -> &BugRecord {
        &self.record
    }

    pub fn status(&self) -> &str {
        &self.record.status
    }

    pub fn set_status(&mut self, status: &str) {
        self.record.status = status.to_string();
    }

    pub fn resolution(&self) -> &str {
        &self.record.resolution
    }

    pub fn component(&self) -> &str {
        &self.record.component
    }

    pub fn whiteboard(&self) -> &str {
        &self.record.whiteboard
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.record.attachments
    }

    pub fn comments(&self) -> &[Comment] {
        &self.record.comments
    }

    /// Attach tracker data fetched separately from the bug itself.
    pub fn set_attachments(&mut self, attachments: Vec<Attachment>) {
        self.record.attachments = attachments;
    }

    pub fn set_comments(&mut self, comments: Vec<Comment>) {
        self.record.comments = comments;
    }

    // ── Keywords ───────────────────────────────────────────────────

    pub fn has_keyword(&self, keyword: &str) -> bool {
        self.record.keywords.iter().any(|k| k == keyword)
    }

    pub fn add_keyword(&mut self, keyword: &str) {
        if !self.has_keyword(keyword) {
            self.record.keywords.push(keyword.to_string());
        }
    }

    pub fn remove_keyword(&mut self, keyword: &str) -> bool {
        let before = self.record.keywords.len();
        self.record.keywords.retain(|k| k != keyword);
        self.record.keywords.len() != before
    }

    // ── Commands ───────────────────────────────────────────────────

    pub fn commands(&self) -> &CommandMap {
        &self.commands
    }

    pub fn has_command(&self, key: &str) -> bool {
        self.commands.contains(key)
    }

    pub fn add_command(&mut self, key: &str) {
        self.commands.insert(key, None);
        self.sync_whiteboard();
    }

    pub fn remove_command(&mut self, key: &str) {
        if self.commands.remove(key) {
            self.sync_whiteboard();
        }
    }

    fn sync_whiteboard(&mut self) {
        self.record.whiteboard = self.commands.apply(&self.marker, &self.record.whiteboard);
    }

    // ── Status flags and comments ──────────────────────────────────

    /// Value of a per-branch status field, if the bug carries it.
    pub fn status_flag(&self, name: &str) -> Option<&str> {
        self.record.extra.get(name).and_then(Value::as_str)
    }

    pub fn set_status_flag(&mut self, name: &str, value: &str) {
        self.record
            .extra
            .insert(name.to_string(), Value::String(value.to_string()));
    }

    /// Queue a comment for the next update, replacing any already queued.
    pub fn set_comment(&mut self, body: String) {
        self.record.comment = Some(NewComment {
            body,
            is_private: false,
            is_markdown: true,
        });
    }

    pub fn pending_comment(&self) -> Option<&NewComment> {
        self.record.comment.as_ref()
    }

    /// The assignee, or the reporter while the bug is unassigned.
    pub fn assignee(&self) -> Option<&UserDetail> {
        if self.record.assigned_to.starts_with("nobody@") {
            self.record.creator_detail.as_ref()
        } else {
            self.record.assigned_to_detail.as_ref()
        }
    }

    /// Request needinfo from `email` unless an identical request exists.
    pub fn add_needinfo(&mut self, email: &str) -> bool {
        let exists = self.record.flags.iter().any(|f| {
            f.name == "needinfo" && f.status == "?" && f.requestee.as_deref() == Some(email)
        });
        if exists {
            return false;
        }
        self.record.flags.push(BugFlag {
            id: None,
            name: "needinfo".into(),
            status: "?".into(),
            requestee: Some(email.to_string()),
            extra: Map::new(),
        });
        true
    }

    /// Newest changeset link for `branch` found at the start of a comment.
    pub fn find_patch_rev(&self, branch: &str, hg_base: &str) -> Option<String> {
        let prefix = format!("{}/rev/", hg::repo_url(hg_base, branch));
        let mut comments: Vec<&Comment> = self.record.comments.iter().collect();
        comments.sort_by(|a, b| b.creation_time.cmp(&a.creation_time));
        comments.into_iter().find_map(|c| {
            let rest = c.text.strip_prefix(&prefix)?;
            let end = rest
                .find(|ch: char| !ch.is_ascii_hexdigit())
                .unwrap_or(rest.len());
            match end {
                40.. => Some(rest[..40].to_string()),
                12.. => Some(rest[..12].to_string()),
                _ => None,
            }
        })
    }

    /// Top-level fields changed since fetch. Attachments and comment history
    /// are never part of the diff; a queued new comment is.
    pub fn diff(&self) -> Result<Map<String, Value>> {
        let Value::Object(current) = serde_json::to_value(&self.record)? else {
            return Ok(Map::new());
        };
        let empty = Map::new();
        let before = self.snapshot.as_object().unwrap_or(&empty);
        Ok(current
            .into_iter()
            .filter(|(key, _)| key != "attachments" && key != "comments")
            .filter(|(key, value)| before.get(key) != Some(value))
            .collect())
    }

    // ── Derived facts (sync) ───────────────────────────────────────

    /// Text of the original report.
    pub fn comment_zero(&self) -> &str {
        self.facts.comment_zero.get_or_init(|| {
            self.record
                .comments
                .first()
                .map(|c| c.text.clone())
                .unwrap_or_default()
        })
    }

    pub fn build_flags(&self) -> BuildFlags {
        *self
            .facts
            .build_flags
            .get_or_init(|| BuildFlags::from_report(self.comment_zero(), &self.record.keywords))
    }

    /// `NAME=value` assignments found in the report.
    pub fn env(&self) -> &BTreeMap<String, String> {
        self.facts.env.get_or_init(|| {
            self.comment_zero()
                .split(' ')
                .map(|token| strip_backticks(token.trim()))
                .filter_map(env_assignment)
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
    }

    /// Target platform from the bug's OS and hardware fields, defaulting to
    /// the host for anything unrecognized.
    pub fn platform(&self) -> &Platform {
        self.facts.platform.get_or_init(|| {
            let host = Platform::host();
            let op_sys = &self.record.op_sys;
            let system = if op_sys.contains("Linux") {
                "Linux".to_string()
            } else if op_sys.contains("Windows") {
                "Windows".to_string()
            } else if op_sys.contains("Mac OS") {
                "Darwin".to_string()
            } else {
                host.system.clone()
            };
            if system != host.system {
                warn!(bug = self.record.id, system = %system, "Attempting to process non-native bug");
            }
            let machine = match self.record.platform.as_str() {
                "ARM" => "aarch64".to_string(),
                "x86" => "i686".to_string(),
                "x86_64" => "x86_64".to_string(),
                _ => host.machine,
            };
            Platform { system, machine }
        })
    }

    // ── Derived facts (async) ──────────────────────────────────────

    pub async fn tip_version(&self, collab: &Collaborators) -> Result<u32> {
        let version = self
            .facts
            .tip_version
            .get_or_try_init(|| async { collab.releases.tip_version().await })
            .await?;
        Ok(*version)
    }

    /// Major version the bug was filed against; non-numeric versions
    /// (`Trunk`, `unspecified`) mean the development tip.
    pub async fn version(&self, collab: &Collaborators) -> Result<u32> {
        let digits: String = self
            .record
            .version
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        match digits.parse() {
            Ok(version) => Ok(version),
            Err(_) => self.tip_version(collab).await,
        }
    }

    /// Branch table: tip, the two releases behind it, and whatever
    /// long-term-support tracks currently exist.
    pub async fn branches(&self, collab: &Collaborators) -> Result<&[Branch]> {
        let branches = self
            .facts
            .branches
            .get_or_try_init(|| async {
                let tip = self.tip_version(collab).await?;
                let mut branches = vec![
                    Branch::new("central", tip),
                    Branch::new("beta", tip.saturating_sub(1)),
                    Branch::new("release", tip.saturating_sub(2)),
                ];
                for alias in ESR_ALIASES {
                    match collab.resolver.resolve_esr(alias).await {
                        Ok(Some(release)) => {
                            let Ok(version) = release.trim_start_matches("esr").parse() else {
                                debug!(alias, release = %release, "Ignoring unparseable ESR release");
                                continue;
                            };
                            if branches.iter().all(|b| b.alias != release) {
                                branches.push(Branch::new(release, version));
                            }
                        }
                        Ok(None) => {}
                        Err(e) => debug!(alias, error = %e, "ESR alias did not resolve"),
                    }
                }
                Ok::<_, crate::error::TriageError>(branches)
            })
            .await?;
        Ok(branches)
    }

    /// Branch alias matching the bug's version, or `None` when the bug was
    /// filed against a track with no builds.
    pub async fn branch(&self, collab: &Collaborators) -> Result<Option<&str>> {
        let branch = self
            .facts
            .branch
            .get_or_try_init(|| async {
                let version = self.version(collab).await?;
                let branches = self.branches(collab).await?;
                Ok::<_, crate::error::TriageError>(
                    branches
                        .iter()
                        .find(|b| b.version == version)
                        .map(|b| b.alias.clone()),
                )
            })
            .await?;
        Ok(branch.as_deref())
    }

    /// Like [`Bug::branch`], but an unsupported branch is an error.
    pub async fn require_branch(&self, collab: &Collaborators) -> Result<String> {
        self.branch(collab)
            .await?
            .map(str::to_string)
            .ok_or_else(|| BugError::UnsupportedBranch(self.record.id).into())
    }

    /// Revision (or build date) believed to be the earliest build showing
    /// the bug.
    ///
    /// An `origRev` command wins when it names a revision that exists on the
    /// bug's branch. Otherwise the report is scanned for a 12/40 character
    /// revision that exists on the branch, or a `YYYYMMDD-<rev>` build id.
    /// Failing both, the first build on or after the creation date is used.
    pub async fn initial_build_id(&self, collab: &Collaborators) -> Result<&str> {
        let id = self
            .facts
            .initial_build_id
            .get_or_try_init(|| self.compute_initial_build_id(collab))
            .await?;
        Ok(id)
    }

    async fn compute_initial_build_id(&self, collab: &Collaborators) -> Result<String> {
        let branch = self.require_branch(collab).await?;

        if let Some(rev) = self.commands.value("origRev") {
            if is_rev(rev) && self.revision_exists(collab, &branch, rev).await? {
                return Ok(short_rev(rev));
            }
            debug!(bug = self.record.id, rev, "origRev not found on branch, scanning report");
        }

        let tokens = self
            .comment_zero()
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
            .filter(|t| !t.is_empty());
        for token in tokens {
            if is_rev(token) && self.revision_exists(collab, &branch, token).await? {
                return Ok(short_rev(token));
            }
            if let Some(rev) = build_id_rev(token) {
                return Ok(rev.to_ascii_lowercase());
            }
        }

        let date = self.creation_date();
        let query = BuildQuery::new(
            &branch,
            Some(&date),
            self.build_flags(),
            TargetKind::Browser,
            self.platform(),
        );
        match collab.resolver.resolve(&query).await {
            Ok(build) => Ok(build.changeset),
            Err(e) => {
                debug!(bug = self.record.id, error = %e, "No build for creation date");
                Err(BugError::NoInitialBuild(date).into())
            }
        }
    }

    /// Filing date as `YYYY-MM-DD`. Timestamps that don't parse are cut at
    /// the `T` separator.
    fn creation_date(&self) -> String {
        let raw = &self.record.creation_time;
        match DateTime::parse_from_rfc3339(raw) {
            Ok(time) => time.with_timezone(&Utc).format("%Y-%m-%d").to_string(),
            Err(_) => raw.split('T').next().unwrap_or_default().to_string(),
        }
    }

    async fn revision_exists(&self, collab: &Collaborators, branch: &str, rev: &str) -> Result<bool> {
        match collab.releases.revision_exists(branch, rev).await {
            Ok(found) => Ok(found),
            Err(TrackerError::Api { status, .. }) => {
                debug!(branch, rev, status, "Revision lookup rejected");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Engine runtime flags quoted in the report, restricted to those the
    /// initial build accepts.
    pub async fn runtime_flags(&self, collab: &Collaborators) -> Result<&[String]> {
        let flags = self
            .facts
            .runtime_flags
            .get_or_try_init(|| async {
                let build_id = self.initial_build_id(collab).await?;
                let valid = collab.evaluator.valid_runtime_flags(build_id).await?;
                let text = self.comment_zero();
                let mut flags = Vec::new();
                for flag in valid.iter().filter(|f| text.contains(f.as_str())) {
                    let pattern = format!("(?i)--{}[a-z0-9=-]*", regex::escape(flag));
                    let Ok(re) = Regex::new(&pattern) else {
                        continue;
                    };
                    if let Some(found) = re.find(text) {
                        flags.push(found.as_str().to_string());
                    }
                }
                Ok::<_, crate::error::TriageError>(flags)
            })
            .await?;
        Ok(flags)
    }
}

fn strip_backticks(token: &str) -> &str {
    token
        .strip_prefix('`')
        .and_then(|t| t.strip_suffix('`'))
        .unwrap_or(token)
}

fn short_rev(rev: &str) -> String {
    rev.chars().take(12).collect()
}

/// A 12 or 40 character hex revision.
fn is_rev(token: &str) -> bool {
    matches!(token.len(), 12 | 40) && token.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Revision part of a `YYYYMMDD-<12 hex>` build identifier.
fn build_id_rev(token: &str) -> Option<&str> {
    let (date, rev) = token.split_once('-')?;
    (date.len() == 8 && date.bytes().all(|b| b.is_ascii_digit()) && rev.len() == 12 && is_rev(rev))
        .then_some(rev)
}

/// `NAME=value` where the name is word characters and the value starts with
/// an alphanumeric.
fn env_assignment(token: &str) -> Option<(&str, &str)> {
    let (name, value) = token.split_once('=')?;
    let name_ok = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_');
    let value_ok = value.bytes().next().is_some_and(|b| b.is_ascii_alphanumeric());
    (name_ok && value_ok).then_some((name, value))
}
