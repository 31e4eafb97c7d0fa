//! Cooperative cancellation and progress reporting for long-running runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Snapshot passed to a [`ProgressObserver`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub elapsed: Duration,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    /// Remaining time extrapolated from the average pace so far.
    pub fn eta(&self) -> Option<Duration> {
        if self.completed == 0 {
            return None;
        }
        let remaining = self.total.saturating_sub(self.completed) as f64;
        let secs = self.elapsed.as_secs_f64() * remaining / self.completed as f64;
        Some(Duration::from_secs_f64(secs))
    }
}

/// Receives progress notifications. Must not influence the computation.
pub trait ProgressObserver {
    fn on_progress(&mut self, progress: &Progress);
}

impl<F> ProgressObserver for F
where
    F: FnMut(&Progress),
{
    fn on_progress(&mut self, progress: &Progress) {
        self(progress)
    }
}

/// Number of units between notifications so that roughly `updates` fire per run.
pub(crate) fn report_interval(total: usize, updates: usize) -> usize {
    (total / updates.max(1)).max(1)
}
