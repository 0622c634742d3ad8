//! Collaborators backed by external command-line tools.
//!
//! Each tool is configured as an argv prefix. The operation name is appended
//! as the last argument, the request is written to stdin as JSON, and the
//! response is read from stdout as JSON. A non-zero exit status means the
//! operation failed; stderr carries the reason.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::bisect::{BisectOutcome, BisectRequest, Bisector};
use crate::build::{BuildLease, BuildManager, BuildQuery, BuildRef, BuildResolver, TargetKind};
use crate::config::{ToolsSection, TransportSection};
use crate::error::{BuildError, EvaluateError, ResolveError};
use crate::evaluate::{Evaluator, Verdict};
use crate::repro::Candidate;

#[derive(thiserror::Error, Debug)]
enum ToolError {
    #[error("no command configured")]
    Unconfigured,

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("{0}")]
    Exit(String),

    #[error("invalid response: {0}")]
    Output(#[from] serde_json::Error),
}

/// One configured tool command.
#[derive(Debug, Clone)]
pub struct ExternalTool {
    argv: Vec<String>,
    timeout: Option<Duration>,
}

impl ExternalTool {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn call<Req, Resp>(&self, operation: &str, request: &Req) -> Result<Resp, ToolError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let (program, args) = self.argv.split_first().ok_or(ToolError::Unconfigured)?;
        let payload = serde_json::to_vec(request)?;
        debug!(program, operation, bytes = payload.len(), "Invoking external tool");

        let mut command = Command::new(program);
        command.kill_on_drop(true);
        command.args(args);
        command.arg(operation);
        command.stdin(Stdio::piped());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let spawn_err = |source| ToolError::Spawn {
            program: program.clone(),
            source,
        };
        let mut child = command.spawn().map_err(spawn_err)?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await.map_err(spawn_err)?;
            stdin.shutdown().await.map_err(spawn_err)?;
        }

        let wait = child.wait_with_output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| ToolError::Timeout {
                    program: program.clone(),
                    secs: limit.as_secs(),
                })?,
            None => wait.await,
        }
        .map_err(spawn_err)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let reason = if stderr.is_empty() {
                match output.status.code() {
                    Some(code) => format!("{program} {operation} exited with status {code}"),
                    None => format!("{program} {operation} was terminated by a signal"),
                }
            } else {
                stderr
            };
            return Err(ToolError::Exit(reason));
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

// ── Wire messages ───────────────────────────────────────────────────

#[derive(Serialize)]
struct EsrRequest<'a> {
    alias: &'a str,
}

#[derive(Deserialize)]
struct EsrResponse {
    branch: Option<String>,
}

#[derive(Serialize)]
struct FetchRequest<'a> {
    build: &'a BuildRef,
    target: TargetKind,
    dest: &'a Path,
}

#[derive(Deserialize)]
struct FetchResponse {
    path: PathBuf,
}

#[derive(Serialize)]
struct EvaluateRequest<'a> {
    candidate: &'a Candidate,
    build_path: &'a Path,
}

#[derive(Deserialize)]
struct EvaluateResponse {
    verdict: Verdict,
}

#[derive(Serialize)]
struct FlagsRequest<'a> {
    build_id: &'a str,
}

#[derive(Deserialize)]
struct FlagsResponse {
    flags: Vec<String>,
}

// ── Collaborators ───────────────────────────────────────────────────

/// Resolver, build manager, evaluator and bisector implemented by the
/// commands in `[tools]`.
#[derive(Debug, Clone)]
pub struct ExternalTools {
    resolver: ExternalTool,
    builds: ExternalTool,
    evaluator: ExternalTool,
    bisector: ExternalTool,
}

impl ExternalTools {
    pub fn new(
        resolver: ExternalTool,
        builds: ExternalTool,
        evaluator: ExternalTool,
        bisector: ExternalTool,
    ) -> Self {
        Self {
            resolver,
            builds,
            evaluator,
            bisector,
        }
    }

    /// Lookups share the HTTP timeout; downloads, evaluation and bisection
    /// run unbounded since the tools enforce their own limits.
    pub fn from_config(tools: &ToolsSection, transport: &TransportSection) -> Self {
        Self::new(
            ExternalTool::new(tools.resolver.clone())
                .with_timeout(Duration::from_secs(transport.timeout_secs)),
            ExternalTool::new(tools.build_manager.clone()),
            ExternalTool::new(tools.evaluator.clone()),
            ExternalTool::new(tools.bisector.clone()),
        )
    }
}

#[async_trait::async_trait]
impl BuildResolver for ExternalTools {
    #[instrument(skip_all, fields(branch = %query.branch, build = %query.build))]
    async fn resolve(&self, query: &BuildQuery) -> Result<BuildRef, ResolveError> {
        self.resolver
            .call("resolve", query)
            .await
            .map_err(|e| match e {
                ToolError::Exit(reason) => ResolveError::NotFound(reason),
                other => ResolveError::Tool(other.to_string()),
            })
    }

    async fn resolve_esr(&self, alias: &str) -> Result<Option<String>, ResolveError> {
        let response: EsrResponse = self
            .resolver
            .call("esr", &EsrRequest { alias })
            .await
            .map_err(|e| ResolveError::Tool(e.to_string()))?;
        Ok(response.branch)
    }
}

#[async_trait::async_trait]
impl BuildManager for ExternalTools {
    #[instrument(skip_all, fields(build = %build.name))]
    async fn acquire(
        &self,
        build: &BuildRef,
        target: TargetKind,
    ) -> Result<BuildLease, BuildError> {
        let dest = tempfile::Builder::new().prefix("bugtriage-build-").tempdir()?;
        let request = FetchRequest {
            build,
            target,
            dest: dest.path(),
        };
        let response: FetchResponse =
            self.builds
                .call("fetch", &request)
                .await
                .map_err(|e| BuildError::Acquire {
                    name: build.name.clone(),
                    message: e.to_string(),
                })?;
        Ok(BuildLease::with_guard(response.path, dest))
    }
}

#[async_trait::async_trait]
impl Evaluator for ExternalTools {
    #[instrument(skip_all, fields(candidate = %candidate))]
    async fn evaluate(
        &self,
        candidate: &Candidate,
        build_path: &Path,
    ) -> Result<Verdict, EvaluateError> {
        let request = EvaluateRequest {
            candidate,
            build_path,
        };
        let response: EvaluateResponse =
            self.evaluator
                .call("evaluate", &request)
                .await
                .map_err(|e| match e {
                    ToolError::Output(e) => EvaluateError::Output(e.to_string()),
                    other => EvaluateError::Tool(other.to_string()),
                })?;
        Ok(response.verdict)
    }

    async fn valid_runtime_flags(&self, build_id: &str) -> Result<Vec<String>, EvaluateError> {
        let response: FlagsResponse = self
            .evaluator
            .call("flags", &FlagsRequest { build_id })
            .await
            .map_err(|e| EvaluateError::Tool(e.to_string()))?;
        Ok(response.flags)
    }
}

#[async_trait::async_trait]
impl Bisector for ExternalTools {
    #[instrument(skip_all, fields(branch = %request.branch, find_fix = request.find_fix))]
    async fn bisect(&self, request: &BisectRequest) -> Result<BisectOutcome, ResolveError> {
        self.bisector
            .call("bisect", request)
            .await
            .map_err(|e| match e {
                ToolError::Exit(reason) => ResolveError::Endpoint(reason),
                other => ResolveError::Tool(other.to_string()),
            })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::build::{BuildFlags, Platform};
    use crate::repro::EngineCandidate;

    /// `sh -c <script> tool <operation>`: the operation lands in `$1`.
    fn shell(script: &str) -> ExternalTool {
        ExternalTool::new(vec![
            "sh".into(),
            "-c".into(),
            script.into(),
            "tool".into(),
        ])
    }

    fn tools(script: &str) -> ExternalTools {
        ExternalTools::new(shell(script), shell(script), shell(script), shell(script))
    }

    fn query() -> BuildQuery {
        BuildQuery::new(
            "central",
            Some("7bd6cb8b76c0"),
            BuildFlags::default(),
            TargetKind::Engine,
            &Platform::new("Linux", "x86_64"),
        )
    }

    fn candidate() -> Candidate {
        Candidate::Engine(EngineCandidate {
            build_flags: BuildFlags::default(),
            entry_point: PathBuf::from("/tmp/test.js"),
            runtime_flags: vec!["--fuzzing-safe".into()],
        })
    }

    #[tokio::test]
    async fn resolve_reads_build_from_stdout() {
        let tools = tools(
            r#"cat >/dev/null; echo '{"branch":"central","id":"20240105093015","changeset":"7bd6cb8b76c078f5e687574decdde97f1e4affce","name":"m-c-opt"}'"#,
        );
        let build = tools.resolve(&query()).await.unwrap();
        assert_eq!(build.id, "20240105093015");
        assert_eq!(build.short_changeset(), "7bd6cb8b76c0");
    }

    #[tokio::test]
    async fn request_is_written_to_stdin() {
        // Echo the branch field back as the build name.
        let tools = tools(
            r#"read line; case "$line" in *'"branch":"central"'*) n=seen;; *) n=missing;; esac; echo "{\"branch\":\"central\",\"id\":\"1\",\"changeset\":\"abc\",\"name\":\"$n\"}""#,
        );
        let build = tools.resolve(&query()).await.unwrap();
        assert_eq!(build.name, "seen");
    }

    #[tokio::test]
    async fn non_zero_exit_is_not_found() {
        let tools = tools("cat >/dev/null; echo 'no builds for 2024-01-05' >&2; exit 3");
        let err = tools.resolve(&query()).await.unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(ref m) if m == "no builds for 2024-01-05"));
    }

    #[tokio::test]
    async fn operation_name_is_last_argument() {
        let tools = tools(r#"cat >/dev/null; echo "{\"branch\": \"$1\"}""#);
        assert_eq!(tools.resolve_esr("esr-stable").await.unwrap().as_deref(), Some("esr"));
    }

    #[tokio::test]
    async fn evaluate_parses_verdict() {
        let tools = tools(r#"cat >/dev/null; echo '{"verdict":"crashed"}'"#);
        let verdict = tools.evaluate(&candidate(), Path::new("/tmp")).await.unwrap();
        assert_eq!(verdict, Verdict::Crashed);
    }

    #[tokio::test]
    async fn garbage_output_is_output_error() {
        let tools = tools("cat >/dev/null; echo not-json");
        let err = tools.evaluate(&candidate(), Path::new("/tmp")).await.unwrap_err();
        assert!(matches!(err, EvaluateError::Output(_)));
    }

    #[tokio::test]
    async fn fetch_lease_keeps_directory_alive() {
        let tools = tools(
            r#"dest=$(sed 's/.*"dest":"\([^"]*\)".*/\1/'); mkdir -p "$dest/dist"; echo "{\"path\":\"$dest/dist\"}""#,
        );
        let build = BuildRef {
            branch: "central".into(),
            id: "20240105093015".into(),
            changeset: "7bd6cb8b76c0".into(),
            name: "m-c-opt".into(),
        };
        let lease = tools.acquire(&build, TargetKind::Engine).await.unwrap();
        let path = lease.path().to_path_buf();
        assert!(path.is_dir());
        drop(lease);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let tool = shell("sleep 5").with_timeout(Duration::from_millis(100));
        let tools = ExternalTools::new(tool, shell(""), shell(""), shell(""));
        let err = tools.resolve(&query()).await.unwrap_err();
        assert!(matches!(err, ResolveError::Tool(ref m) if m.contains("timed out")));
    }

    #[tokio::test]
    async fn empty_argv_is_unconfigured() {
        let tools = ExternalTools::new(
            ExternalTool::new(Vec::new()),
            shell(""),
            shell(""),
            shell(""),
        );
        let err = tools.resolve(&query()).await.unwrap_err();
        assert!(matches!(err, ResolveError::Tool(ref m) if m == "no command configured"));
    }
}
