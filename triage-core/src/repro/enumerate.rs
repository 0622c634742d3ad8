//! Candidate enumeration: the ordered search space of ways to reproduce a
//! bug, from most to least likely.
//!
//! Each axis (build flags, testcase, environment, harness, prefs) is
//! collected up front since they are small; candidates themselves are built
//! lazily from a mixed-radix index over the product, so a caller that stops
//! at the first crash never materializes the rest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::candidate::{BrowserCandidate, Candidate, EngineCandidate};
use crate::build::{BuildFlags, TargetKind};
use crate::config::{EvaluatorSection, PolicySection};

const BROWSER_ALLOWED: [&str; 5] = ["*.html", "*.htm", "*.svg", "*.xml", "*"];
const BROWSER_EXCLUDED: [&str; 2] = ["js", "txt"];
const ENGINE_ALLOWED: [&str; 2] = ["*.js", "*"];
const MANIFEST: &str = "test_info.json";

/// Bug facts the enumeration depends on.
#[derive(Debug, Clone)]
pub struct EnumerationContext {
    pub build_flags: BuildFlags,
    pub env: BTreeMap<String, String>,
    pub component: String,
    pub runtime_flags: Vec<String>,
    pub settings: EvaluatorSection,
    pub accessibility_components: Vec<String>,
    pub accessibility_env: String,
}

impl EnumerationContext {
    pub fn new(
        build_flags: BuildFlags,
        env: BTreeMap<String, String>,
        component: &str,
        settings: &EvaluatorSection,
        policy: &PolicySection,
    ) -> Self {
        Self {
            build_flags,
            env,
            component: component.to_string(),
            runtime_flags: Vec::new(),
            settings: settings.clone(),
            accessibility_components: policy.accessibility_components.clone(),
            accessibility_env: policy.accessibility_env.clone(),
        }
    }

    #[must_use]
    pub fn with_runtime_flags(mut self, flags: Vec<String>) -> Self {
        self.runtime_flags = flags;
        self
    }
}

/// Build-flag profiles to try: the bug's own profile first when it is a
/// fuzzing build, then fuzzing builds with ASan or debug added. Plain
/// builds and profiles no fuzzing build uses (a sanitizer with debug, or
/// two sanitizers) are skipped; no profile repeats.
pub fn iter_build_flags(flags: BuildFlags) -> Vec<BuildFlags> {
    let mut yielded = Vec::new();
    if !flags.is_optimized() && flags.fuzzing && is_fuzzing_profile(flags) {
        yielded.push(flags);
    }
    for (asan, debug) in [(true, false), (false, true)] {
        let mut profile = flags;
        profile.asan |= asan;
        profile.debug |= debug;
        profile.fuzzing = true;
        if is_fuzzing_profile(profile) && !yielded.contains(&profile) {
            yielded.push(profile);
        }
    }
    yielded
}

fn is_fuzzing_profile(flags: BuildFlags) -> bool {
    let sanitized = flags.asan || flags.tsan;
    !(sanitized && flags.debug) && !(flags.asan && flags.tsan)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.contains(&e))
}

/// Files under `dir` matching `allowed` in priority order, minus excluded
/// extensions, each listed once.
fn glob_tests(dir: &Path, allowed: &[&str], excluded: &[&str]) -> Vec<PathBuf> {
    let root = glob::Pattern::escape(&dir.to_string_lossy());
    let mut found: Vec<PathBuf> = Vec::new();
    for pattern in allowed {
        let paths = match glob::glob(&format!("{root}/**/{pattern}")) {
            Ok(paths) => paths,
            Err(e) => {
                warn!(pattern, error = %e, "Invalid testcase pattern");
                continue;
            }
        };
        for path in paths.flatten() {
            if path.is_file() && !has_extension(&path, excluded) && !found.contains(&path) {
                found.push(path);
            }
        }
    }
    found
}

/// Browser entry points. A `test_info.json` manifest promotes its directory
/// to the front of the list in place of the manifest itself.
pub fn browser_tests(dir: &Path) -> Vec<PathBuf> {
    let mut tests = glob_tests(dir, &BROWSER_ALLOWED, &BROWSER_EXCLUDED);
    if let Some(pos) = tests
        .iter()
        .position(|p| p.file_name().is_some_and(|n| n == MANIFEST))
    {
        let manifest = tests.remove(pos);
        if let Some(parent) = manifest.parent() {
            tests.insert(0, parent.to_path_buf());
        }
    }
    tests
}

pub fn engine_tests(dir: &Path) -> Vec<PathBuf> {
    glob_tests(dir, &ENGINE_ALLOWED, &[])
}

/// A `.js` attachment containing `user_pref` calls. The last one found wins.
pub fn identify_prefs(dir: &Path) -> Option<PathBuf> {
    glob_tests(dir, &["*.js"], &[])
        .into_iter()
        .rfind(|path| std::fs::read_to_string(path).is_ok_and(|text| text.contains("user_pref")))
}

/// Environment maps to try: the bug's own, then (for accessibility bugs
/// that don't already set it) the same with the accessibility toggle on.
pub fn iter_env(ctx: &EnumerationContext) -> Vec<BTreeMap<String, String>> {
    let mut envs = vec![ctx.env.clone()];
    if ctx.accessibility_components.contains(&ctx.component)
        && !ctx.env.contains_key(&ctx.accessibility_env)
    {
        let mut env = ctx.env.clone();
        env.insert(ctx.accessibility_env.clone(), "1".to_string());
        envs.push(env);
    }
    envs
}

fn display() -> String {
    let mode = if cfg!(windows) { "default" } else { "xvfb" };
    mode.to_string()
}

/// Every candidate for `target`, in enumeration order.
pub fn candidates(
    ctx: &EnumerationContext,
    target: TargetKind,
    test_dir: &Path,
) -> Box<dyn Iterator<Item = Candidate> + Send> {
    match target {
        TargetKind::Browser => Box::new(browser_candidates(ctx, test_dir)),
        TargetKind::Engine => Box::new(engine_candidates(ctx, test_dir)),
    }
}

fn browser_candidates(
    ctx: &EnumerationContext,
    test_dir: &Path,
) -> impl Iterator<Item = Candidate> + Send + use<> {
    let prefs = identify_prefs(test_dir);
    let flags = iter_build_flags(ctx.build_flags);
    let tests: Vec<PathBuf> = browser_tests(test_dir)
        .into_iter()
        .filter(|t| Some(t) != prefs.as_ref())
        .collect();
    let envs = iter_env(ctx);
    let harness = [true, false];
    let pref_axis: Vec<Option<PathBuf>> = match prefs {
        Some(p) => vec![Some(p), None],
        None => vec![None],
    };
    let settings = ctx.settings.clone();
    let display = display();

    let total = flags.len() * tests.len() * envs.len() * harness.len() * pref_axis.len();
    (0..total).map(move |index| {
        let mut rest = index;
        let mut digit = |radix: usize| {
            let d = rest % radix;
            rest /= radix;
            d
        };
        // Least significant axis first.
        let prefs = digit(pref_axis.len());
        let use_harness = digit(harness.len());
        let env = digit(envs.len());
        let test = digit(tests.len());
        let flag = digit(flags.len());
        Candidate::Browser(BrowserCandidate {
            build_flags: flags[flag],
            entry_point: tests[test].clone(),
            env: envs[env].clone(),
            prefs: pref_axis[prefs].clone(),
            use_harness: harness[use_harness],
            display: display.clone(),
            repeat: settings.repeat,
            relaunch: settings.relaunch,
            timeout_secs: settings.timeout_secs,
            time_limit_secs: None,
            trace: false,
            logs: None,
        })
    })
}

fn engine_candidates(
    ctx: &EnumerationContext,
    test_dir: &Path,
) -> impl Iterator<Item = Candidate> + Send + use<> {
    let flags = iter_build_flags(ctx.build_flags);
    let tests = engine_tests(test_dir);
    let runtime_flags = ctx.runtime_flags.clone();

    let total = flags.len() * tests.len();
    (0..total).map(move |index| {
        Candidate::Engine(EngineCandidate {
            build_flags: flags[index / tests.len()],
            entry_point: tests[index % tests.len()].clone(),
            runtime_flags: runtime_flags.clone(),
        })
    })
}
