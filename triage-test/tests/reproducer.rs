use std::path::PathBuf;

use triage_core::build::{BuildFlags, Platform};
use triage_core::evaluate::Verdict;
use triage_core::repro::{Candidate, EngineCandidate, Reproducer, Reproduction};
use triage_test::{Harness, INITIAL_REV};

fn candidate() -> Candidate {
    Candidate::Engine(EngineCandidate {
        build_flags: BuildFlags {
            asan: true,
            fuzzing: true,
            ..BuildFlags::default()
        },
        entry_point: PathBuf::from("/tmp/testcase.js"),
        runtime_flags: vec!["--fuzzing-safe".into()],
    })
}

fn reproducer(harness: &Harness) -> Reproducer {
    Reproducer::new(harness.collaborators(), Platform::new("Linux", "x86_64"))
}

#[tokio::test]
async fn cached_verdict_skips_evaluator() {
    let harness = Harness::new();
    harness.evaluator.set_default(Verdict::Crashed);
    let mut repro = reproducer(&harness);

    let first = repro.reproduce(&candidate(), "central", None, true).await;
    let second = repro.reproduce(&candidate(), "central", None, true).await;

    assert!(first.is_crashed());
    assert_eq!(first, second);
    assert_eq!(harness.evaluator.call_count(), 1);
    assert_eq!(harness.builds.acquired(), 1);
    // Resolution always happens; only evaluation is cached.
    assert_eq!(harness.resolver.queries().len(), 2);
}

#[tokio::test]
async fn uncached_runs_still_record_verdicts() {
    let harness = Harness::new();
    let mut repro = reproducer(&harness);

    repro
        .reproduce(&candidate(), "central", Some(INITIAL_REV), false)
        .await;
    repro
        .reproduce(&candidate(), "central", Some(INITIAL_REV), false)
        .await;
    assert_eq!(harness.evaluator.call_count(), 2);

    let cached = repro
        .reproduce(&candidate(), "central", Some(INITIAL_REV), true)
        .await;
    assert!(cached.is_passed());
    assert_eq!(harness.evaluator.call_count(), 2);
    assert_eq!(repro.cache().len(), 1);
}

#[tokio::test]
async fn cache_is_keyed_by_branch() {
    let harness = Harness::new();
    let mut repro = reproducer(&harness);

    repro.reproduce(&candidate(), "central", None, true).await;
    repro.reproduce(&candidate(), "beta", None, true).await;

    assert_eq!(harness.evaluator.call_count(), 2);
    assert_eq!(repro.cache().len(), 2);
}

#[tokio::test]
async fn unresolvable_build_fails_and_is_not_cached() {
    let harness = Harness::new();
    harness.resolver.mark_missing(INITIAL_REV);
    let mut repro = reproducer(&harness);

    let result = repro
        .reproduce(&candidate(), "central", Some(INITIAL_REV), true)
        .await;

    assert_eq!(result, Reproduction::Failed);
    assert_eq!(harness.evaluator.call_count(), 0);
    assert!(repro.cache().is_empty());
}

#[tokio::test]
async fn unobtainable_build_fails() {
    let harness = Harness::new();
    harness.builds.mark_broken("central-latest-asan-fuzzing");
    let mut repro = reproducer(&harness);

    let result = repro.reproduce(&candidate(), "central", None, true).await;

    assert_eq!(result, Reproduction::Failed);
    assert_eq!(harness.evaluator.call_count(), 0);
    assert!(repro.cache().is_empty());
}

#[tokio::test]
async fn evaluator_failure_is_cached_as_failed() {
    let harness = Harness::new();
    harness.evaluator.set_default(Verdict::Failed);
    let mut repro = reproducer(&harness);

    let first = repro.reproduce(&candidate(), "central", None, true).await;
    let second = repro.reproduce(&candidate(), "central", None, true).await;

    assert_eq!(first, Reproduction::Failed);
    assert_eq!(second, Reproduction::Failed);
    assert_eq!(harness.evaluator.call_count(), 1);
}

#[tokio::test]
async fn tip_query_has_no_build_id() {
    let harness = Harness::new();
    let mut repro = reproducer(&harness);

    repro.reproduce(&candidate(), "central", None, true).await;

    let queries = harness.resolver.queries();
    assert_eq!(queries[0].build, "latest");
    assert_eq!(queries[0].order, None);
}
