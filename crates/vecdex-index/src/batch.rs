//! Background batch job state.
//!
//! Two halves with different synchronization:
//! - [`BatchProgress`]: lock-free running flag and counters, readable at any
//!   time without touching the index lock.
//! - [`BatchRecord`]: outcome of the last completed job, kept under the index
//!   lock and consumed by the first reader when it carries an error.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Running flag and progress counters of the current batch job.
#[derive(Debug, Default)]
pub struct BatchProgress {
    running: AtomicBool,
    processed: AtomicUsize,
    total: AtomicUsize,
}

impl BatchProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the single batch slot.
    ///
    /// Returns `None` if a job is already running. The returned guard clears
    /// the running flag when dropped.
    pub fn try_claim(self: &Arc<Self>) -> Option<ClaimGuard> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        Some(ClaimGuard {
            progress: Arc::clone(self),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn advance(&self) {
        self.processed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> IndexingProgress {
        IndexingProgress::new(
            self.processed.load(Ordering::SeqCst),
            self.total.load(Ordering::SeqCst),
        )
    }
}

/// RAII claim on [`BatchProgress`]; releases the running flag on drop.
///
/// Dropped on every exit path of a job, including unwinding.
#[derive(Debug)]
pub struct ClaimGuard {
    progress: Arc<BatchProgress>,
}

impl ClaimGuard {
    /// Reset the counters for a job of `total` entries.
    pub fn begin(&self, total: usize) {
        self.progress.processed.store(0, Ordering::SeqCst);
        self.progress.total.store(total, Ordering::SeqCst);
    }

    pub(crate) fn progress(&self) -> &BatchProgress {
        &self.progress
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.progress.running.store(false, Ordering::SeqCst);
    }
}

/// Point-in-time progress of the current or last batch job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexingProgress {
    pub current: usize,
    pub total: usize,
    /// `current / total` in `[0, 1]`, 0 when `total` is 0
    pub percentage: f64,
}

impl IndexingProgress {
    pub fn new(current: usize, total: usize) -> Self {
        let percentage = if total > 0 {
            current as f64 / total as f64
        } else {
            0.0
        };
        Self {
            current,
            total,
            percentage,
        }
    }
}

/// Summary of the last successfully completed batch job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Wall-clock time of the whole job
    pub duration_ms: f64,
    /// Entries inserted
    pub count: usize,
    /// Completion time, `None` before the first job completes
    pub finished_at: Option<DateTime<Utc>>,
}

/// Outcome of the most recent completed job. Lives under the index lock.
#[derive(Debug, Default)]
pub(crate) struct BatchRecord {
    report: BatchReport,
    error: Option<String>,
}

impl BatchRecord {
    pub(crate) fn complete(&mut self, duration_ms: f64, count: usize) {
        self.report = BatchReport {
            duration_ms,
            count,
            finished_at: Some(Utc::now()),
        };
        self.error = None;
    }

    pub(crate) fn fail(&mut self, message: String) {
        self.error = Some(message);
    }

    /// Drop a pending error that was already reported elsewhere.
    pub(crate) fn clear_error(&mut self) {
        self.error = None;
    }

    /// The last report, or the pending error (delivered once, then cleared).
    pub(crate) fn take(&mut self) -> Result<BatchReport, String> {
        match self.error.take() {
            Some(message) => Err(message),
            None => Ok(self.report.clone()),
        }
    }
}
