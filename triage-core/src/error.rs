/// Top-level triage error type.
///
/// All fallible operations in `triage-core` return [`Result<T, TriageError>`](Result).
/// Each variant wraps a collaborator-specific error enum so callers can tell a
/// tracker outage apart from a missing build without string matching.
#[derive(thiserror::Error, Debug)]
pub enum TriageError {
    /// Error talking to the issue tracker or another HTTP endpoint.
    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    /// No build matched a (branch, build id, flags, platform) query.
    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    /// The build manager could not provide a local build.
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// The evaluator could not run a testcase.
    #[error("Evaluation error: {0}")]
    Evaluate(#[from] EvaluateError),

    /// Attachments could not be materialized.
    #[error("Attachment error: {0}")]
    Attachment(#[from] AttachmentError),

    /// Trace capture or submission failed.
    #[error("Trace error: {0}")]
    Trace(#[from] TraceError),

    /// Configuration parsing or validation failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A bug record is missing something the workflow requires.
    #[error("Bug error: {0}")]
    Bug(#[from] BugError),

    /// JSON serialization of a bug record failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem I/O inside the session working directory.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from HTTP endpoints (issue tracker, revision lookup).
#[derive(thiserror::Error, Debug)]
pub enum TrackerError {
    /// Network-level failure, including exhausted retries.
    #[error("Network error: {0}")]
    Network(String),

    /// The endpoint returned a non-success HTTP status.
    #[error("API error (HTTP {status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("Response parse error: {0}")]
    Parse(String),

    /// The requested bug does not exist or is not visible.
    #[error("Bug {0} not found")]
    NotFound(u64),
}

/// Errors resolving a build reference.
#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    /// No build is available for the query.
    #[error("{0}")]
    NotFound(String),

    /// A bisection endpoint could not be resolved.
    #[error("{0}")]
    Endpoint(String),

    /// The resolver tool itself failed.
    #[error("resolver failed: {0}")]
    Tool(String),
}

/// Errors from the build manager.
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    /// Download or extraction of the build failed.
    #[error("Failed to obtain build {name}: {message}")]
    Acquire {
        /// Canonical build name.
        name: String,
        /// Description of the failure.
        message: String,
    },

    /// Filesystem I/O while preparing the build directory.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the evaluator.
#[derive(thiserror::Error, Debug)]
pub enum EvaluateError {
    /// The evaluator process could not be started or crashed itself.
    #[error("Evaluator failed: {0}")]
    Tool(String),

    /// The evaluator returned something other than a verdict.
    #[error("Unexpected evaluator output: {0}")]
    Output(String),
}

/// Errors while writing bug attachments to disk.
#[derive(thiserror::Error, Debug)]
pub enum AttachmentError {
    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors during trace capture.
#[derive(thiserror::Error, Debug)]
pub enum TraceError {
    /// More than one candidate trace directory was produced.
    #[error("Multiple rr recordings detected!")]
    MultipleTraces,

    /// The submission tool is not installed or not configured.
    #[error("{0} is not properly configured!")]
    ToolUnavailable(String),

    /// The submission tool exited with a failure.
    #[error("Failed to upload trace: {0}")]
    Submit(String),

    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors in configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist at the expected path.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),

    /// A required environment variable is not set.
    #[error("{0} must be set")]
    MissingEnv(String),
}

/// Preconditions on a bug record.
#[derive(thiserror::Error, Debug)]
pub enum BugError {
    /// The bug was filed against a branch with no builds.
    #[error("Bug {0} is filed against an unsupported branch")]
    UnsupportedBranch(u64),

    /// Neither the report nor the creation date yields a baseline build.
    #[error("Failed to identify build id from date: {0}")]
    NoInitialBuild(String),
}

/// Convenience alias for `Result<T, TriageError>`.
pub type Result<T> = std::result::Result<T, TriageError>;
