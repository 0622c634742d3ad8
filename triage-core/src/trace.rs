//! Trace capture support: locating the recorded trace, describing the build
//! it came from, and handing it to the submission tool.

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Serialize;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::error::TraceError;

const USER_ENV: &str = "PERNOSCO_USER";
const GROUP_ENV: &str = "PERNOSCO_GROUP";
const SECRET_ENV: &str = "PERNOSCO_USER_SECRET_KEY";

/// Credentials for the trace submission service.
#[derive(Clone)]
pub struct TraceCredentials {
    pub user: String,
    pub group: String,
    pub secret_key: String,
}

impl Debug for TraceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceCredentials")
            .field("user", &self.user)
            .field("group", &self.group)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

impl TraceCredentials {
    /// Read credentials from the environment. All three variables must be
    /// set; otherwise trace submission is disabled.
    pub fn from_env() -> Option<Self> {
        let read = |name: &str| {
            let value = std::env::var(name).ok().filter(|v| !v.is_empty());
            if value.is_none() {
                warn!("Cannot find Pernosco env variable {name}!");
            }
            value
        };
        Some(Self {
            user: read(USER_ENV)?,
            group: read(GROUP_ENV)?,
            secret_key: read(SECRET_ENV)?,
        })
    }

    fn env_pairs(&self) -> [(&'static str, &str); 3] {
        [
            (USER_ENV, self.user.as_str()),
            (GROUP_ENV, self.group.as_str()),
            (SECRET_ENV, self.secret_key.as_str()),
        ]
    }
}

/// Find the single `latest-trace` directory under `log_dir`.
///
/// Returns `Ok(None)` when no trace was recorded and an error when more than
/// one was, since the submission would be ambiguous.
pub fn find_trace(log_dir: &Path) -> Result<Option<PathBuf>, TraceError> {
    let root = glob::Pattern::escape(&log_dir.to_string_lossy());
    let pattern = format!("{root}/reports/*/rr-traces/*");
    let Ok(paths) = glob::glob(&pattern) else {
        return Ok(None);
    };

    let mut found = None;
    for path in paths.flatten() {
        if !path.is_dir() || path.file_name().is_none_or(|n| n != "latest-trace") {
            continue;
        }
        if found.is_some() {
            return Err(TraceError::MultipleTraces);
        }
        found = Some(std::fs::canonicalize(&path)?);
    }
    Ok(found)
}

#[derive(Debug, Serialize)]
struct BuildDescriptor<'a> {
    branch: &'a str,
    rev: &'a str,
}

/// Record which build a trace came from next to the trace itself.
pub fn write_build_descriptor(trace_dir: &Path, branch: &str, rev: &str) -> Result<(), TraceError> {
    let json = serde_json::to_string(&BuildDescriptor { branch, rev })
        .map_err(|e| TraceError::Io(std::io::Error::other(e)))?;
    std::fs::write(trace_dir.join("build.json"), json)?;
    Ok(())
}

/// Uploads recorded traces.
#[async_trait::async_trait]
pub trait TraceSubmitter: Send + Sync + Debug {
    /// Whether the submission tool is installed.
    fn is_available(&self) -> bool;

    async fn submit(
        &self,
        trace_dir: &Path,
        bug_id: u64,
        creds: &TraceCredentials,
    ) -> Result<(), TraceError>;
}

/// Submits traces with the `pernosco-submit` command-line tool.
#[derive(Debug, Clone)]
pub struct PernoscoSubmitter {
    tool: String,
}

impl PernoscoSubmitter {
    pub fn new(tool: impl Into<String>) -> Self {
        Self { tool: tool.into() }
    }

    fn resolve_tool(&self) -> Option<PathBuf> {
        let tool = Path::new(&self.tool);
        if tool.components().count() > 1 {
            return tool.is_file().then(|| tool.to_path_buf());
        }
        let path = std::env::var_os("PATH")?;
        std::env::split_paths(&path)
            .map(|dir| dir.join(tool))
            .find(|candidate| candidate.is_file())
    }
}

#[async_trait::async_trait]
impl TraceSubmitter for PernoscoSubmitter {
    fn is_available(&self) -> bool {
        self.resolve_tool().is_some()
    }

    async fn submit(
        &self,
        trace_dir: &Path,
        bug_id: u64,
        creds: &TraceCredentials,
    ) -> Result<(), TraceError> {
        let tool = self
            .resolve_tool()
            .ok_or_else(|| TraceError::ToolUnavailable(self.tool.clone()))?;

        info!(bug = bug_id, trace = %trace_dir.display(), "Uploading pernosco session...");
        let mut command = Command::new(tool);
        command.kill_on_drop(true);
        command.arg("upload");
        command.arg(trace_dir);
        command.args(["--title", &bug_id.to_string()]);
        command.args(["--no-local-sources", "--consent-to-current-privacy-policy"]);
        command.envs(creds.env_pairs());
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let output = command.output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(bug = bug_id, stderr = %stderr, "Failed to upload pernosco session");
            return Err(TraceError::Submit(stderr));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_trace(root: &Path, report: &str) -> PathBuf {
        let dir = root.join("reports").join(report).join("rr-traces").join("latest-trace");
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn finds_single_trace() {
        let logs = tempfile::tempdir().unwrap();
        let trace = make_trace(logs.path(), "r1");
        std::fs::create_dir_all(logs.path().join("reports/r1/rr-traces/firefox-0")).unwrap();

        let found = find_trace(logs.path()).unwrap().unwrap();
        assert_eq!(found, std::fs::canonicalize(trace).unwrap());
    }

    #[test]
    fn no_trace_is_none() {
        let logs = tempfile::tempdir().unwrap();
        assert!(find_trace(logs.path()).unwrap().is_none());
    }

    #[test]
    fn multiple_traces_are_an_error() {
        let logs = tempfile::tempdir().unwrap();
        make_trace(logs.path(), "r1");
        make_trace(logs.path(), "r2");
        assert!(matches!(find_trace(logs.path()), Err(TraceError::MultipleTraces)));
    }

    #[test]
    fn descriptor_is_written_beside_trace() {
        let logs = tempfile::tempdir().unwrap();
        let trace = make_trace(logs.path(), "r1");
        write_build_descriptor(&trace, "central", "7bd6cb8b76c0").unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(trace.join("build.json")).unwrap())
                .unwrap();
        assert_eq!(json, serde_json::json!({"branch": "central", "rev": "7bd6cb8b76c0"}));
    }

    #[test]
    fn missing_tool_is_unavailable() {
        let submitter = PernoscoSubmitter::new("/nonexistent/pernosco-submit");
        assert!(!submitter.is_available());
    }

    #[tokio::test]
    async fn submit_without_tool_fails() {
        let submitter = PernoscoSubmitter::new("/nonexistent/pernosco-submit");
        let creds = TraceCredentials {
            user: "u".into(),
            group: "g".into(),
            secret_key: "s".into(),
        };
        let err = submitter
            .submit(Path::new("/tmp"), 1, &creds)
            .await
            .unwrap_err();
        assert!(matches!(err, TraceError::ToolUnavailable(_)));
    }
}
