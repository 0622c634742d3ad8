use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::build::{BuildFlags, TargetKind};
use crate::config::EvaluatorSection;

/// Evaluator settings for a full-browser attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserCandidate {
    pub build_flags: BuildFlags,
    /// Testcase file, or a directory holding a `test_info.json` manifest.
    pub entry_point: PathBuf,
    pub env: BTreeMap<String, String>,
    pub prefs: Option<PathBuf>,
    pub use_harness: bool,
    /// `xvfb` or `default`.
    pub display: String,
    pub repeat: u32,
    pub relaunch: u32,
    pub timeout_secs: u64,
    /// Overall budget for a trace recording; unset for ordinary runs.
    pub time_limit_secs: Option<u64>,
    /// Record an rr trace of the run into `logs`.
    pub trace: bool,
    pub logs: Option<PathBuf>,
}

/// Evaluator settings for an engine-shell attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCandidate {
    pub build_flags: BuildFlags,
    pub entry_point: PathBuf,
    pub runtime_flags: Vec<String>,
}

/// One way of trying to reproduce a bug. Immutable once built; variations
/// such as trace capture produce a new candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "lowercase")]
pub enum Candidate {
    #[serde(rename = "firefox")]
    Browser(BrowserCandidate),
    #[serde(rename = "js")]
    Engine(EngineCandidate),
}

impl Candidate {
    pub fn build_flags(&self) -> BuildFlags {
        match self {
            Self::Browser(c) => c.build_flags,
            Self::Engine(c) => c.build_flags,
        }
    }

    pub fn target(&self) -> TargetKind {
        match self {
            Self::Browser(_) => TargetKind::Browser,
            Self::Engine(_) => TargetKind::Engine,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Browser(_) => "BrowserConfiguration",
            Self::Engine(_) => "JSConfiguration",
        }
    }

    /// Copy of this candidate configured to record a trace: an unoptimized
    /// build, long repeat count, single relaunch and an extended time
    /// budget, with logs written to `logs`. Engine candidates cannot be
    /// traced and yield `None`.
    pub fn with_trace_capture(
        &self,
        settings: &EvaluatorSection,
        logs: impl Into<PathBuf>,
    ) -> Option<Self> {
        let Self::Browser(browser) = self else {
            return None;
        };
        let mut traced = browser.clone();
        traced.build_flags.no_opt = true;
        traced.trace = true;
        traced.logs = Some(logs.into());
        traced.repeat = settings.trace_repeat;
        traced.relaunch = settings.trace_relaunch;
        traced.time_limit_secs = Some(settings.trace_time_limit_secs);
        Some(Self::Browser(traced))
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Browser(c) => {
                let env = c
                    .env
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                write!(
                    f,
                    "{} (flags: {}, entry_point: {}, use_harness: {}, use_prefs: {}, env_variables: {{{env}}})",
                    self.kind_name(),
                    c.build_flags,
                    c.entry_point.display(),
                    c.use_harness,
                    c.prefs.is_some(),
                )
            }
            Self::Engine(c) => write!(
                f,
                "{} (flags: {}, entry_point: {}, runtime_flags: [{}])",
                self.kind_name(),
                c.build_flags,
                c.entry_point.display(),
                c.runtime_flags.join(" "),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn browser() -> Candidate {
        Candidate::Browser(BrowserCandidate {
            build_flags: BuildFlags {
                asan: true,
                fuzzing: true,
                ..BuildFlags::default()
            },
            entry_point: PathBuf::from("testcase.html"),
            env: BTreeMap::new(),
            prefs: None,
            use_harness: true,
            display: "xvfb".into(),
            repeat: 10,
            relaunch: 1,
            timeout_secs: 60,
            time_limit_secs: None,
            trace: false,
            logs: None,
        })
    }

    #[test]
    fn trace_capture_is_a_new_candidate() {
        let original = browser();
        let traced = original
            .with_trace_capture(&EvaluatorSection::default(), "/tmp/logs")
            .unwrap();
        assert!(traced.build_flags().no_opt);
        assert!(!original.build_flags().no_opt);
        let Candidate::Browser(b) = traced else {
            panic!("expected browser candidate");
        };
        assert_eq!(b.repeat, 100);
        assert_eq!(b.relaunch, 1);
        assert_eq!(b.time_limit_secs, Some(300));
        assert!(b.trace);
    }

    #[test]
    fn engine_candidates_cannot_trace() {
        let engine = Candidate::Engine(EngineCandidate {
            build_flags: BuildFlags::default(),
            entry_point: PathBuf::from("test.js"),
            runtime_flags: vec!["--fuzzing-safe".into()],
        });
        assert!(
            engine
                .with_trace_capture(&EvaluatorSection::default(), "/tmp")
                .is_none()
        );
        assert_eq!(engine.target(), TargetKind::Engine);
    }

    #[test]
    fn serializes_with_target_tag() {
        let value = serde_json::to_value(browser()).unwrap();
        assert_eq!(value["target"], "firefox");
        assert_eq!(value["entry_point"], "testcase.html");
    }
}
