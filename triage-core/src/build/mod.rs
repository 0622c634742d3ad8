//! Build descriptions shared by the resolver, the build manager, the
//! reproducer and the bisector.

pub mod traits;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use traits::{BuildManager, BuildResolver};

/// Which artifact family a configuration runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Full browser application.
    #[serde(rename = "firefox")]
    Browser,
    /// Standalone JavaScript engine shell.
    #[serde(rename = "js")]
    Engine,
}

impl TargetKind {
    /// Detection order: browser-style configurations first.
    pub const ALL: [TargetKind; 2] = [TargetKind::Browser, TargetKind::Engine];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Browser => "firefox",
            Self::Engine => "js",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compile-time profile of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct BuildFlags {
    pub asan: bool,
    pub tsan: bool,
    pub debug: bool,
    pub fuzzing: bool,
    pub coverage: bool,
    pub valgrind: bool,
    pub no_opt: bool,
    pub fuzzilli: bool,
}

impl BuildFlags {
    /// Infer the profile from report text and the keyword set.
    pub fn from_report(text: &str, keywords: &[String]) -> Self {
        Self {
            asan: text.contains("AddressSanitizer") || text.contains("--enable-address-sanitizer"),
            tsan: text.contains("ThreadSanitizer") || text.contains("--enable-thread-sanitizer"),
            debug: text.contains("--enable-debug") || keywords.iter().any(|k| k == "assertion"),
            fuzzing: text.contains("--enable-fuzzing"),
            coverage: text.contains("--enable-coverage"),
            valgrind: text.contains("--enable-valgrind"),
            no_opt: text.contains("--disable-optimize"),
            fuzzilli: text.contains("--enable-js-fuzzilli"),
        }
    }

    /// True when no flag is set (a plain optimized build).
    pub fn is_optimized(&self) -> bool {
        *self == Self::default()
    }

    fn names(&self) -> Vec<&'static str> {
        [
            (self.asan, "asan"),
            (self.tsan, "tsan"),
            (self.debug, "debug"),
            (self.coverage, "ccov"),
            (self.valgrind, "valgrind"),
            (self.no_opt, "noopt"),
            (self.fuzzing, "fuzzing"),
            (self.fuzzilli, "fuzzilli"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect()
    }
}

impl fmt::Display for BuildFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.names();
        if names.is_empty() {
            f.write_str("opt")
        } else {
            f.write_str(&names.join("-"))
        }
    }
}

/// Operating system and architecture a build targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    pub system: String,
    pub machine: String,
}

impl Platform {
    pub fn new(system: impl Into<String>, machine: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            machine: machine.into(),
        }
    }

    /// The platform this process runs on.
    pub fn host() -> Self {
        let system = match std::env::consts::OS {
            "linux" => "Linux",
            "windows" => "Windows",
            "macos" => "Darwin",
            other => other,
        };
        Self::new(system, std::env::consts::ARCH)
    }

    pub fn is_linux_x86_64(&self) -> bool {
        self.system == "Linux" && self.machine == "x86_64"
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.system, self.machine)
    }
}

/// Direction to search when no build exists for the exact id requested.
/// Lookups only ever move forward from the requested id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchOrder {
    Asc,
}

/// Identifier for "the newest build on a branch".
pub const LATEST: &str = "latest";

/// One build lookup: which branch, which build, which profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildQuery {
    pub branch: String,
    /// Revision, date, or [`LATEST`].
    pub build: String,
    pub flags: BuildFlags,
    pub target: TargetKind,
    pub platform: Platform,
    /// `None` requires an exact match; `latest` lookups never carry a bias.
    pub order: Option<SearchOrder>,
}

impl BuildQuery {
    /// Build a query for an explicit id (searching forward) or for tip.
    pub fn new(
        branch: &str,
        build_id: Option<&str>,
        flags: BuildFlags,
        target: TargetKind,
        platform: &Platform,
    ) -> Self {
        let (build, order) = match build_id {
            Some(id) => (id.to_string(), Some(SearchOrder::Asc)),
            None => (LATEST.to_string(), None),
        };
        Self {
            branch: branch.to_string(),
            build,
            flags,
            target,
            platform: platform.clone(),
            order,
        }
    }
}

/// A resolved, downloadable build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRef {
    pub branch: String,
    /// Build date id, e.g. `20240105093015`.
    pub id: String,
    pub changeset: String,
    /// Stable name used as the cache key.
    pub name: String,
}

impl BuildRef {
    pub fn short_changeset(&self) -> &str {
        self.changeset.get(..12).unwrap_or(&self.changeset)
    }

    /// Human-readable build string used in bug comments.
    pub fn build_str(&self) -> String {
        format!("mozilla-{} {}-{}", self.branch, self.id, self.short_changeset())
    }
}

impl fmt::Display for BuildRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build_str())
    }
}

/// A local build checked out from the build manager. Whatever guard the
/// manager attaches is dropped with the lease, releasing the build.
pub struct BuildLease {
    path: PathBuf,
    _guard: Option<Box<dyn Send + Sync>>,
}

impl BuildLease {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _guard: None,
        }
    }

    pub fn with_guard(path: impl Into<PathBuf>, guard: impl Send + Sync + 'static) -> Self {
        Self {
            path: path.into(),
            _guard: Some(Box::new(guard)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for BuildLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildLease")
            .field("path", &self.path)
            .field("guarded", &self._guard.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_from_report_text() {
        let flags = BuildFlags::from_report(
            "ASAN build: ==1==ERROR: AddressSanitizer: heap-use-after-free\n--enable-fuzzing",
            &[],
        );
        assert!(flags.asan);
        assert!(flags.fuzzing);
        assert!(!flags.debug);
        assert_eq!(flags.to_string(), "asan-fuzzing");
    }

    #[test]
    fn assertion_keyword_implies_debug() {
        let flags = BuildFlags::from_report("nothing to see", &["assertion".to_string()]);
        assert!(flags.debug);
    }

    #[test]
    fn no_markers_is_optimized() {
        let flags = BuildFlags::from_report("Crash in foo()", &["crash".to_string()]);
        assert!(flags.is_optimized());
        assert_eq!(flags.to_string(), "opt");
    }

    #[test]
    fn tip_query_has_no_bias() {
        let query = BuildQuery::new(
            "central",
            None,
            BuildFlags::default(),
            TargetKind::Engine,
            &Platform::new("Linux", "x86_64"),
        );
        assert_eq!(query.build, LATEST);
        assert_eq!(query.order, None);

        let query = BuildQuery::new(
            "central",
            Some("7bd6cb8b76c0"),
            BuildFlags::default(),
            TargetKind::Engine,
            &Platform::new("Linux", "x86_64"),
        );
        assert_eq!(query.order, Some(SearchOrder::Asc));
        assert_eq!(serde_json::to_string(&query.order).unwrap(), r#""asc""#);
    }

    #[test]
    fn build_str_truncates_changeset() {
        let build = BuildRef {
            branch: "central".into(),
            id: "20240105093015".into(),
            changeset: "7bd6cb8b76c078f5e687574decdde97f1e4affce".into(),
            name: "m-c-20240105093015-fuzzing-asan-opt".into(),
        };
        assert_eq!(build.build_str(), "mozilla-central 20240105093015-7bd6cb8b76c0");
    }

    #[test]
    fn target_kind_serializes_as_tool_names() {
        assert_eq!(serde_json::to_string(&TargetKind::Browser).unwrap(), "\"firefox\"");
        assert_eq!(serde_json::to_string(&TargetKind::Engine).unwrap(), "\"js\"");
    }
}
