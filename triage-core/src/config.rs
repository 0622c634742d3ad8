use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// When an explicit `analyze` command forces a re-run of confirm/verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ReanalysisPolicy {
    /// `analyze` only counts when the bug is in a state the action applies to.
    #[default]
    OpenStatusOnly,
    /// `analyze` always re-runs confirm, regardless of status.
    Unconditional,
}

/// Top-level triage configuration, matching `bugtriage.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriageConfig {
    #[serde(default)]
    pub tracker: TrackerSection,
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub hg: HgSection,
    #[serde(default)]
    pub policy: PolicySection,
    #[serde(default)]
    pub evaluator: EvaluatorSection,
    #[serde(default)]
    pub tools: ToolsSection,
}

impl TriageConfig {
    /// Load a config file, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Invalid(format!("{}: {e}", path.display())))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.policy.command_marker.is_empty()
            || self.policy.command_marker.contains([']', '[', ','])
        {
            return Err(ConfigError::Invalid(format!(
                "command_marker {:?} must be non-empty and free of brackets and commas",
                self.policy.command_marker
            )));
        }
        if self.evaluator.repeat == 0 || self.evaluator.trace_repeat == 0 {
            return Err(ConfigError::Invalid("repeat counts must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSection {
    /// REST root; the `api_root_env` variable takes precedence when set.
    pub api_root: String,
    pub api_root_env: String,
    pub api_key_env: String,
    pub include_fields: String,
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            api_root: "https://bugzilla.mozilla.org/rest".into(),
            api_root_env: "BZ_API_ROOT".into(),
            api_key_env: "BZ_API_KEY".into(),
            include_fields: "_default".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub timeout_secs: u64,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 500,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HgSection {
    pub base_url: String,
    pub milestone_path: String,
}

impl Default for HgSection {
    fn default() -> Self {
        Self {
            base_url: "https://hg.mozilla.org".into(),
            milestone_path: "mozilla-central/raw-file/tip/config/milestone.txt".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    /// Name used when the bot refers to itself in comments.
    pub bot_name: String,
    /// Keyword that opts a bug into automation.
    pub automation_keyword: String,
    /// Whiteboard marker holding the command list, as in `[bugmon:confirm]`.
    pub command_marker: String,
    pub open_statuses: Vec<String>,
    pub unsupported_resolutions: Vec<String>,
    pub reanalysis: ReanalysisPolicy,
    pub status_flag_prefix: String,
    pub accessibility_components: Vec<String>,
    pub accessibility_env: String,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            bot_name: "Bugmon".into(),
            automation_keyword: "bugmon".into(),
            command_marker: "bugmon".into(),
            open_statuses: vec![
                "ASSIGNED".into(),
                "NEW".into(),
                "UNCONFIRMED".into(),
                "REOPENED".into(),
            ],
            unsupported_resolutions: vec![
                "DUPLICATE".into(),
                "INVALID".into(),
                "WORKSFORME".into(),
                "WONTFIX".into(),
            ],
            reanalysis: ReanalysisPolicy::OpenStatusOnly,
            status_flag_prefix: "cf_status_firefox".into(),
            accessibility_components: vec!["Disability Access APIs".into()],
            accessibility_env: "GNOME_ACCESSIBILITY".into(),
        }
    }
}

impl PolicySection {
    pub fn is_open(&self, status: &str) -> bool {
        self.open_statuses.iter().any(|s| s == status)
    }

    pub fn is_unsupported_resolution(&self, resolution: &str) -> bool {
        self.unsupported_resolutions.iter().any(|r| r == resolution)
    }
}

/// Evaluator settings applied to every candidate, plus the extended
/// settings used while recording a trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorSection {
    pub repeat: u32,
    pub relaunch: u32,
    pub timeout_secs: u64,
    pub trace_repeat: u32,
    pub trace_relaunch: u32,
    pub trace_time_limit_secs: u64,
}

impl Default for EvaluatorSection {
    fn default() -> Self {
        Self {
            repeat: 10,
            relaunch: 1,
            timeout_secs: 60,
            trace_repeat: 100,
            trace_relaunch: 1,
            trace_time_limit_secs: 300,
        }
    }
}

/// Command lines for the external build, evaluation and bisection tools.
/// Each entry is an argv prefix; the operation name is appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub resolver: Vec<String>,
    pub build_manager: Vec<String>,
    pub evaluator: Vec<String>,
    pub bisector: Vec<String>,
    pub trace_submit: String,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            resolver: vec!["bugtriage-fetch".into()],
            build_manager: vec!["bugtriage-fetch".into()],
            evaluator: vec!["bugtriage-evaluate".into()],
            bisector: vec!["bugtriage-bisect".into()],
            trace_submit: "pernosco-submit".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tracker_conventions() {
        let config = TriageConfig::default();
        assert_eq!(config.tracker.api_key_env, "BZ_API_KEY");
        assert_eq!(config.policy.command_marker, "bugmon");
        assert_eq!(config.policy.reanalysis, ReanalysisPolicy::OpenStatusOnly);
        assert!(config.policy.is_open("REOPENED"));
        assert!(!config.policy.is_open("RESOLVED"));
        assert!(config.policy.is_unsupported_resolution("WONTFIX"));
        assert_eq!(config.evaluator.trace_repeat, 100);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = TriageConfig::parse(
            r#"
            [policy]
            reanalysis = "unconditional"

            [transport]
            max_retries = 5

            [tools]
            evaluator = ["my-eval"]
            "#,
        )
        .unwrap();
        assert_eq!(config.policy.reanalysis, ReanalysisPolicy::Unconditional);
        assert_eq!(config.policy.bot_name, "Bugmon");
        assert_eq!(config.transport.max_retries, 5);
        assert_eq!(config.transport.backoff_ms, 500);
        assert_eq!(config.tools.evaluator, ["my-eval"]);
        assert_eq!(config.tools.resolver, ["bugtriage-fetch"]);
        assert_eq!(config.hg.base_url, "https://hg.mozilla.org");
        assert_eq!(config.evaluator.repeat, 10);
    }

    #[test]
    fn rejects_marker_with_brackets() {
        let mut config = TriageConfig::default();
        config.policy.command_marker = "bug]mon".into();
        let toml = toml::to_string(&config).unwrap();
        assert!(matches!(
            TriageConfig::parse(&toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = TriageConfig::load(Some(Path::new("/nonexistent/bugtriage.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn bad_toml_is_parse_error() {
        assert!(matches!(
            TriageConfig::parse("[policy\nbot_name = 1"),
            Err(ConfigError::Parse(_))
        ));
    }
}
