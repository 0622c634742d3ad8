// In-memory collaborators and bug fixtures for workflow tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value};

use triage_core::bisect::{BisectOutcome, BisectRequest, BisectStatus, Bisector};
use triage_core::bug::{Attachment, Bug, BugRecord, Comment, ReleaseInfo, UserDetail};
use triage_core::build::{BuildLease, BuildManager, BuildQuery, BuildRef, BuildResolver, TargetKind};
use triage_core::collab::Collaborators;
use triage_core::config::TriageConfig;
use triage_core::error::{
    BuildError, EvaluateError, ResolveError, Result, TraceError, TrackerError,
};
use triage_core::evaluate::{Evaluator, Verdict};
use triage_core::repro::Candidate;
use triage_core::trace::{TraceCredentials, TraceSubmitter};
use triage_core::tracker::IssueTracker;
use triage_core::workflow::{SessionOptions, SessionOutcome, TriageSession};

/// Revision quoted in the default report text; known to the fake releases.
pub const INITIAL_REV: &str = "7bd6cb8b76c0";
/// Changeset of every tip build.
pub const TIP_CHANGESET: &str = "a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4e5f6a1b2";
/// Fix revision linked from the default fix comment.
pub const PATCH_REV: &str = "0123456789abcdef0123456789abcdef01234567";
pub const TIP_VERSION: u32 = 130;
pub const HG_BASE: &str = "https://hg.mozilla.org";

// ── Issue tracker ──────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FakeTracker {
    records: Mutex<HashMap<u64, BugRecord>>,
    pushes: Mutex<Vec<(u64, Map<String, Value>)>>,
}

impl FakeTracker {
    pub fn insert(&self, record: BugRecord) {
        lock(&self.records).insert(record.id, record);
    }

    pub fn pushes(&self) -> Vec<(u64, Map<String, Value>)> {
        lock(&self.pushes).clone()
    }
}

#[async_trait::async_trait]
impl IssueTracker for FakeTracker {
    async fn fetch(&self, id: u64) -> std::result::Result<BugRecord, TrackerError> {
        lock(&self.records)
            .get(&id)
            .cloned()
            .ok_or(TrackerError::NotFound(id))
    }

    async fn search(
        &self,
        _params: &Map<String, Value>,
    ) -> std::result::Result<Vec<BugRecord>, TrackerError> {
        Ok(lock(&self.records).values().cloned().collect())
    }

    async fn push(
        &self,
        id: u64,
        diff: &Map<String, Value>,
    ) -> std::result::Result<(), TrackerError> {
        lock(&self.pushes).push((id, diff.clone()));
        Ok(())
    }
}

// ── Release metadata ───────────────────────────────────────────────

#[derive(Debug)]
pub struct FakeReleases {
    tip: u32,
    revisions: Mutex<HashSet<(String, String)>>,
    lookups: AtomicUsize,
}

impl Default for FakeReleases {
    fn default() -> Self {
        let releases = Self {
            tip: TIP_VERSION,
            revisions: Mutex::default(),
            lookups: AtomicUsize::new(0),
        };
        releases.add_revision("central", INITIAL_REV);
        releases
    }
}

impl FakeReleases {
    pub fn add_revision(&self, branch: &str, rev: &str) {
        lock(&self.revisions).insert((branch.to_string(), rev.to_string()));
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ReleaseInfo for FakeReleases {
    async fn tip_version(&self) -> std::result::Result<u32, TrackerError> {
        Ok(self.tip)
    }

    async fn revision_exists(
        &self,
        branch: &str,
        rev: &str,
    ) -> std::result::Result<bool, TrackerError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.revisions).contains(&(branch.to_string(), rev.to_string())))
    }
}

// ── Build resolution and management ────────────────────────────────

/// Resolves every query except those for build ids marked missing. Build
/// names are `<branch>-<build>-<flags>`.
#[derive(Debug, Default)]
pub struct FakeResolver {
    missing: Mutex<HashSet<String>>,
    remaining: Mutex<HashMap<String, usize>>,
    replaced: Mutex<HashMap<String, (usize, String)>>,
    esr: Mutex<HashMap<String, String>>,
    queries: Mutex<Vec<BuildQuery>>,
}

impl FakeResolver {
    pub fn mark_missing(&self, build: &str) {
        lock(&self.missing).insert(build.to_string());
    }

    /// Resolve `build` only `times` more times, then treat it as missing.
    pub fn fail_after(&self, build: &str, times: usize) {
        lock(&self.remaining).insert(build.to_string(), times);
    }

    /// Resolve `build` as itself `times` more times, then as `replacement`,
    /// the way an expired build gives way to the next one in search order.
    pub fn replace_after(&self, build: &str, times: usize, replacement: &str) {
        lock(&self.replaced).insert(build.to_string(), (times, replacement.to_string()));
    }

    pub fn set_esr(&self, alias: &str, branch: &str) {
        lock(&self.esr).insert(alias.to_string(), branch.to_string());
    }

    pub fn queries(&self) -> Vec<BuildQuery> {
        lock(&self.queries).clone()
    }
}

#[async_trait::async_trait]
impl BuildResolver for FakeResolver {
    async fn resolve(&self, query: &BuildQuery) -> std::result::Result<BuildRef, ResolveError> {
        lock(&self.queries).push(query.clone());
        if let Some(left) = lock(&self.remaining).get_mut(&query.build) {
            match left.checked_sub(1) {
                Some(rest) => *left = rest,
                None => self.mark_missing(&query.build),
            }
        }
        if lock(&self.missing).contains(&query.build) {
            return Err(ResolveError::NotFound(format!(
                "Unable to find build for {} {}",
                query.branch, query.build
            )));
        }
        let build = match lock(&self.replaced).get_mut(&query.build) {
            Some((0, replacement)) => replacement.clone(),
            Some((left, _)) => {
                *left -= 1;
                query.build.clone()
            }
            None => query.build.clone(),
        };
        let (id, changeset) = if build == "latest" {
            ("20240110093015".to_string(), TIP_CHANGESET.to_string())
        } else {
            ("20240105093015".to_string(), build.clone())
        };
        Ok(BuildRef {
            branch: query.branch.clone(),
            id,
            name: format!("{}-{}-{}", query.branch, build, query.flags),
            changeset,
        })
    }

    async fn resolve_esr(&self, alias: &str) -> std::result::Result<Option<String>, ResolveError> {
        Ok(lock(&self.esr).get(alias).cloned())
    }
}

/// Hands out a fake path named after the build.
#[derive(Debug, Default)]
pub struct FakeBuildManager {
    acquired: AtomicUsize,
    broken: Mutex<HashSet<String>>,
}

impl FakeBuildManager {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn mark_broken(&self, build_name: &str) {
        lock(&self.broken).insert(build_name.to_string());
    }
}

#[async_trait::async_trait]
impl BuildManager for FakeBuildManager {
    async fn acquire(
        &self,
        build: &BuildRef,
        _target: TargetKind,
    ) -> std::result::Result<BuildLease, BuildError> {
        if lock(&self.broken).contains(&build.name) {
            return Err(BuildError::Acquire {
                name: build.name.clone(),
                message: "download failed".into(),
            });
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(BuildLease::new(Path::new("/builds").join(&build.name)))
    }
}

// ── Evaluator ──────────────────────────────────────────────────────

/// Returns the verdict of the first rule whose pattern occurs in the build
/// name, or the default. A crashing trace run leaves a `latest-trace`
/// directory in the candidate's log directory.
#[derive(Debug)]
pub struct ScriptedEvaluator {
    rules: Mutex<Vec<(String, Verdict)>>,
    default: Mutex<Verdict>,
    runtime_flags: Mutex<Vec<String>>,
    calls: Mutex<Vec<(Candidate, PathBuf)>>,
}

impl Default for ScriptedEvaluator {
    fn default() -> Self {
        Self {
            rules: Mutex::default(),
            default: Mutex::new(Verdict::Passed),
            runtime_flags: Mutex::default(),
            calls: Mutex::default(),
        }
    }
}

impl ScriptedEvaluator {
    pub fn on(&self, pattern: &str, verdict: Verdict) {
        lock(&self.rules).push((pattern.to_string(), verdict));
    }

    pub fn set_default(&self, verdict: Verdict) {
        *lock(&self.default) = verdict;
    }

    pub fn set_runtime_flags(&self, flags: &[&str]) {
        *lock(&self.runtime_flags) = flags.iter().map(ToString::to_string).collect();
    }

    pub fn calls(&self) -> Vec<(Candidate, PathBuf)> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait::async_trait]
impl Evaluator for ScriptedEvaluator {
    async fn evaluate(
        &self,
        candidate: &Candidate,
        build_path: &Path,
    ) -> std::result::Result<Verdict, EvaluateError> {
        lock(&self.calls).push((candidate.clone(), build_path.to_path_buf()));
        let name = build_path.to_string_lossy();
        let verdict = lock(&self.rules)
            .iter()
            .find(|(pattern, _)| name.contains(pattern.as_str()))
            .map_or_else(|| *lock(&self.default), |(_, verdict)| *verdict);

        if let (Verdict::Crashed, Candidate::Browser(browser)) = (verdict, candidate) {
            if let (true, Some(logs)) = (browser.trace, &browser.logs) {
                let trace = logs.join("reports/run-0/rr-traces/latest-trace");
                std::fs::create_dir_all(trace).map_err(|e| EvaluateError::Tool(e.to_string()))?;
            }
        }
        Ok(verdict)
    }

    async fn valid_runtime_flags(
        &self,
        _build_id: &str,
    ) -> std::result::Result<Vec<String>, EvaluateError> {
        Ok(lock(&self.runtime_flags).clone())
    }
}

// ── Bisector ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FakeBisector {
    failure: Mutex<Option<String>>,
    setup_error: Mutex<Option<String>>,
    requests: Mutex<Vec<BisectRequest>>,
}

impl FakeBisector {
    /// Make the next bisections run but not converge.
    pub fn fail_with(&self, message: &str) {
        *lock(&self.failure) = Some(message.to_string());
    }

    /// Make the next bisections fail to start.
    pub fn reject_with(&self, message: &str) {
        *lock(&self.setup_error) = Some(message.to_string());
    }

    pub fn requests(&self) -> Vec<BisectRequest> {
        lock(&self.requests).clone()
    }
}

fn endpoint(id: &str, changeset: &str) -> BuildRef {
    BuildRef {
        branch: "central".into(),
        id: id.into(),
        changeset: changeset.into(),
        name: format!("central-{id}"),
    }
}

#[async_trait::async_trait]
impl Bisector for FakeBisector {
    async fn bisect(
        &self,
        request: &BisectRequest,
    ) -> std::result::Result<BisectOutcome, ResolveError> {
        lock(&self.requests).push(request.clone());
        if let Some(message) = lock(&self.setup_error).clone() {
            return Err(ResolveError::Endpoint(message));
        }
        let start = endpoint("20240101093015", "1111111111111111111111111111111111111111");
        let end = endpoint("20240102093015", "2222222222222222222222222222222222222222");
        Ok(match lock(&self.failure).clone() {
            Some(message) => BisectOutcome {
                status: BisectStatus::Failed,
                message,
                start,
                end,
                pushlog: None,
            },
            None => BisectOutcome {
                status: BisectStatus::Success,
                message: String::new(),
                start,
                end,
                pushlog: Some(format!(
                    "{HG_BASE}/mozilla-central/pushloghtml?fromchange=1111111111111111111111111111111111111111&tochange=2222222222222222222222222222222222222222"
                )),
            },
        })
    }
}

// ── Trace submission ───────────────────────────────────────────────

#[derive(Debug)]
pub struct FakeTraceSubmitter {
    available: bool,
    submissions: Mutex<Vec<(PathBuf, u64)>>,
}

impl FakeTraceSubmitter {
    pub fn new(available: bool) -> Self {
        Self {
            available,
            submissions: Mutex::default(),
        }
    }

    pub fn submissions(&self) -> Vec<(PathBuf, u64)> {
        lock(&self.submissions).clone()
    }
}

#[async_trait::async_trait]
impl TraceSubmitter for FakeTraceSubmitter {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn submit(
        &self,
        trace_dir: &Path,
        bug_id: u64,
        _creds: &TraceCredentials,
    ) -> std::result::Result<(), TraceError> {
        lock(&self.submissions).push((trace_dir.to_path_buf(), bug_id));
        Ok(())
    }
}

pub fn test_creds() -> TraceCredentials {
    TraceCredentials {
        user: "triage".into(),
        group: "fuzzing".into(),
        secret_key: "secret".into(),
    }
}

// ── Bug fixtures ───────────────────────────────────────────────────

/// Builder for bug records. Defaults describe an open, unconfirmed Linux
/// x86_64 bug on central whose report quotes [`INITIAL_REV`].
#[derive(Debug, Clone)]
pub struct BugBuilder {
    record: BugRecord,
}

impl BugBuilder {
    pub fn new(id: u64) -> Self {
        let dev = UserDetail {
            email: "dev@example.com".into(),
            nick: "dev".into(),
            real_name: "Dev Eloper".into(),
            extra: Map::new(),
        };
        let record = BugRecord {
            id,
            status: "NEW".into(),
            version: TIP_VERSION.to_string(),
            product: "Core".into(),
            component: "JavaScript Engine".into(),
            op_sys: "Linux".into(),
            platform: "x86_64".into(),
            keywords: vec!["bugmon".into()],
            creation_time: "2024-01-05T09:30:15Z".into(),
            assigned_to: dev.email.clone(),
            assigned_to_detail: Some(dev),
            comments: vec![Comment {
                id: 1,
                text: format!("Found while fuzzing mozilla-central revision {INITIAL_REV}."),
                creation_time: "2024-01-05T09:30:15Z".into(),
                extra: Map::new(),
            }],
            ..BugRecord::default()
        };
        Self { record }
    }

    #[must_use]
    pub fn status(mut self, status: &str, resolution: &str) -> Self {
        self.record.status = status.into();
        self.record.resolution = resolution.into();
        self
    }

    #[must_use]
    pub fn version(mut self, version: &str) -> Self {
        self.record.version = version.into();
        self
    }

    #[must_use]
    pub fn whiteboard(mut self, whiteboard: &str) -> Self {
        self.record.whiteboard = whiteboard.into();
        self
    }

    #[must_use]
    pub fn keyword(mut self, keyword: &str) -> Self {
        self.record.keywords.push(keyword.into());
        self
    }

    #[must_use]
    pub fn os(mut self, op_sys: &str, platform: &str) -> Self {
        self.record.op_sys = op_sys.into();
        self.record.platform = platform.into();
        self
    }

    #[must_use]
    pub fn report(mut self, text: &str) -> Self {
        if let Some(first) = self.record.comments.first_mut() {
            first.text = text.into();
        }
        self
    }

    #[must_use]
    pub fn comment(mut self, text: &str, creation_time: &str) -> Self {
        let id = self.record.comments.len() as u64 + 1;
        self.record.comments.push(Comment {
            id,
            text: text.into(),
            creation_time: creation_time.into(),
            extra: Map::new(),
        });
        self
    }

    /// A comment linking the fix for `branch` at [`PATCH_REV`].
    #[must_use]
    pub fn fixed_on(self, branch: &str) -> Self {
        let url = triage_core::hg::repo_url(HG_BASE, branch);
        self.comment(&format!("{url}/rev/{PATCH_REV}"), "2024-02-01T00:00:00Z")
    }

    #[must_use]
    pub fn attachment(mut self, file_name: &str, body: &[u8]) -> Self {
        let id = self.record.attachments.len() as u64 + 100;
        self.record.attachments.push(Attachment {
            id,
            file_name: file_name.into(),
            content_type: "text/plain".into(),
            description: file_name.into(),
            is_obsolete: false,
            creation_time: "2024-01-05T09:30:15Z".into(),
            data: STANDARD.encode(body),
            extra: Map::new(),
        });
        self
    }

    #[must_use]
    pub fn status_flag(mut self, name: &str, value: &str) -> Self {
        self.record
            .extra
            .insert(name.into(), Value::String(value.into()));
        self
    }

    pub fn record(self) -> BugRecord {
        self.record
    }

    pub fn build(self) -> Bug {
        Bug::new(self.record, "bugmon").expect("fixture bug")
    }
}

// ── Harness ────────────────────────────────────────────────────────

/// Every fake wired into one [`Collaborators`] bundle.
#[derive(Debug)]
pub struct Harness {
    pub tracker: Arc<FakeTracker>,
    pub releases: Arc<FakeReleases>,
    pub resolver: Arc<FakeResolver>,
    pub builds: Arc<FakeBuildManager>,
    pub evaluator: Arc<ScriptedEvaluator>,
    pub bisector: Arc<FakeBisector>,
    pub traces: Arc<FakeTraceSubmitter>,
    pub config: Arc<TriageConfig>,
    workdir: tempfile::TempDir,
    sessions: AtomicUsize,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_trace_tool(true)
    }

    pub fn with_trace_tool(available: bool) -> Self {
        Self {
            tracker: Arc::default(),
            releases: Arc::default(),
            resolver: Arc::default(),
            builds: Arc::default(),
            evaluator: Arc::default(),
            bisector: Arc::default(),
            traces: Arc::new(FakeTraceSubmitter::new(available)),
            config: Arc::new(TriageConfig::default()),
            workdir: tempfile::tempdir().expect("harness tempdir"),
            sessions: AtomicUsize::new(0),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            tracker: self.tracker.clone(),
            releases: self.releases.clone(),
            resolver: self.resolver.clone(),
            builds: self.builds.clone(),
            evaluator: self.evaluator.clone(),
            bisector: self.bisector.clone(),
            traces: self.traces.clone(),
        }
    }

    pub fn session(&self, bug: Bug, options: SessionOptions) -> Result<TriageSession> {
        let n = self.sessions.fetch_add(1, Ordering::SeqCst);
        let dir = self.workdir.path().join(format!("session-{n}"));
        std::fs::create_dir_all(&dir)?;
        TriageSession::new(
            bug,
            self.collaborators(),
            Arc::clone(&self.config),
            &dir,
            options,
        )
    }

    /// Process `bug` with default options and return the outcome with the
    /// bug as left by the session.
    pub async fn process(&self, bug: Bug) -> (Result<SessionOutcome>, Bug) {
        self.process_with(bug, SessionOptions::default(), false).await
    }

    pub async fn process_with(
        &self,
        bug: Bug,
        options: SessionOptions,
        force_confirm: bool,
    ) -> (Result<SessionOutcome>, Bug) {
        let mut session = match self.session(bug, options) {
            Ok(session) => session,
            Err(e) => panic!("session setup failed: {e}"),
        };
        let outcome = session.process(force_confirm).await;
        (outcome, session.into_bug())
    }
}

/// Text of the comment queued on `bug`, or an empty string.
pub fn queued_comment(bug: &Bug) -> &str {
    bug.pending_comment().map_or("", |c| c.body.as_str())
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
