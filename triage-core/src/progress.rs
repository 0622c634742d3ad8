//! Progress reporting for batch runs over many bugs.
//!
//! The CLI uses `IndicatifReporter` for a progress bar on stderr.
//! Library callers can use `NoopReporter` or provide their own implementation.

use std::sync::atomic::{AtomicU64, Ordering};

use indicatif::{ProgressBar, ProgressStyle};

/// Receives batch lifecycle events.
pub trait ProgressReporter: Send + Sync {
    /// A batch of `total` bugs is about to be processed.
    fn begin(&self, total: u64);

    /// Work on one bug has started.
    fn bug_started(&self, bug_id: u64);

    /// Work on one bug has ended; `summary` is a short outcome label.
    fn bug_finished(&self, bug_id: u64, summary: &str);

    /// The batch is done.
    fn finish(&self);
}

#[derive(Debug, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn begin(&self, _total: u64) {}
    fn bug_started(&self, _bug_id: u64) {}
    fn bug_finished(&self, _bug_id: u64, _summary: &str) {}
    fn finish(&self) {}
}

/// Reporter backed by an `indicatif` progress bar.
#[derive(Debug)]
pub struct IndicatifReporter {
    bar: ProgressBar,
    processed: AtomicU64,
}

impl IndicatifReporter {
    /// A reporter drawing to stderr, or a hidden one when `visible` is false.
    pub fn new(visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        Self {
            bar,
            processed: AtomicU64::new(0),
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
}

impl ProgressReporter for IndicatifReporter {
    fn begin(&self, total: u64) {
        self.processed.store(0, Ordering::Relaxed);
        self.bar.set_length(total);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len}")
        {
            self.bar.set_style(style.progress_chars("=> "));
        }
        self.bar.reset();
    }

    fn bug_started(&self, bug_id: u64) {
        self.bar.set_message(format!("bug {bug_id}"));
    }

    fn bug_finished(&self, bug_id: u64, summary: &str) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.bar.println(format!("Bug {bug_id}: {summary}"));
        self.bar.inc(1);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_reporter_is_silent() {
        let reporter = NoopReporter;
        reporter.begin(2);
        reporter.bug_started(1);
        reporter.bug_finished(1, "updated");
        reporter.finish();
    }

    #[test]
    fn indicatif_reporter_counts_bugs() {
        let reporter = IndicatifReporter::new(false);
        reporter.begin(3);
        for id in [10, 11] {
            reporter.bug_started(id);
            reporter.bug_finished(id, "no changes");
        }
        reporter.finish();
        assert_eq!(reporter.processed(), 2);
    }
}
