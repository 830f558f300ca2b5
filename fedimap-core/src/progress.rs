//! Progress reporting for crawl passes.
//!
//! A pass has no fixed size (the frontier grows while it drains), so the
//! CLI shows a spinner with a running count and the current frontier size.
//! Library callers use `NoopReporter` or supply their own implementation.

use std::sync::atomic::{AtomicU64, Ordering};

use indicatif::{ProgressBar, ProgressStyle};

/// Receives progress events from the crawl orchestrator.
pub trait ProgressReporter: Send + Sync {
    /// A pass is starting with `seeded` instances in the frontier.
    fn start(&self, task: &str, seeded: u64);

    /// One instance was acknowledged; `queued` is what remains in the frontier.
    fn advance(&self, instance: &str, queued: u64);

    /// The frontier drained.
    fn finish(&self);

    /// Display an informational message without disturbing the spinner.
    fn message(&self, msg: &str);
}

/// No-op reporter for library callers that don't need progress output.
#[derive(Debug, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn start(&self, _task: &str, _seeded: u64) {}
    fn advance(&self, _instance: &str, _queued: u64) {}
    fn finish(&self) {}
    fn message(&self, _msg: &str) {}
}

/// Spinner backed by `indicatif` for CLI use.
#[derive(Debug)]
pub struct IndicatifReporter {
    bar: ProgressBar,
    processed: AtomicU64,
}

impl Default for IndicatifReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatifReporter {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new_spinner())
    }

    /// A reporter that tracks counts but draws nothing (quiet mode, tests).
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(bar: ProgressBar) -> Self {
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.green} {prefix} {pos} done, {msg} [{elapsed}]")
        {
            bar.set_style(style);
        }
        Self {
            bar,
            processed: AtomicU64::new(0),
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn is_hidden(&self) -> bool {
        self.bar.is_hidden()
    }
}

impl ProgressReporter for IndicatifReporter {
    fn start(&self, task: &str, seeded: u64) {
        self.processed.store(0, Ordering::Relaxed);
        self.bar.reset();
        self.bar.set_prefix(task.to_string());
        self.bar.set_message(format!("{seeded} queued"));
        self.bar
            .enable_steady_tick(std::time::Duration::from_millis(120));
    }

    fn advance(&self, instance: &str, queued: u64) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.bar.inc(1);
        self.bar.set_message(format!("{queued} queued (last: {instance})"));
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn message(&self, msg: &str) {
        self.bar.println(msg);
    }
}
