//! Run results.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::domain::{RunId, SyncMeta, SyncStatus};
use crate::error::{SyncError, SyncFailure};

/// Page accounting of one run.
///
/// `pages == synced + empty + failed + dropped + skipped` once the run is over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PageCounts {
    pub pages: u64,
    pub synced: u64,
    pub empty: u64,
    /// Failed and reported to the run (`stop_on_error`).
    pub failed: u64,
    /// Failed and ignored.
    pub dropped: u64,
    /// Never started because the run had already failed.
    pub skipped: u64,
    pub rows_written: u64,
}

/// Shared counters updated by page workers.
#[derive(Debug, Default)]
pub(crate) struct PageTally {
    synced: AtomicU64,
    empty: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    rows_written: AtomicU64,
}

impl PageTally {
    pub fn synced(&self, rows: u64) {
        self.synced.fetch_add(1, Ordering::Relaxed);
        self.rows_written.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn empty(&self) {
        self.empty.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts for a run of `pages` pages; every page not accounted for was skipped.
    pub fn snapshot(&self, pages: u64) -> PageCounts {
        let synced = self.synced.load(Ordering::Relaxed);
        let empty = self.empty.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let dropped = self.dropped.load(Ordering::Relaxed);
        PageCounts {
            pages,
            synced,
            empty,
            failed,
            dropped,
            skipped: pages.saturating_sub(synced + empty + failed + dropped),
            rows_written: self.rows_written.load(Ordering::Relaxed),
        }
    }
}

/// Outcome of a run that got past its setup.
#[derive(Debug, Clone)]
pub struct SyncRun {
    pub run_id: RunId,
    pub task: String,
    pub meta: SyncMeta,
    pub counts: PageCounts,
    /// `after_sync` failure. Does not change `meta.status()`.
    pub after_sync_error: Option<SyncError>,
}

impl SyncRun {
    pub fn total(&self) -> u64 {
        self.meta.total
    }

    pub fn status(&self) -> SyncStatus {
        self.meta.status()
    }

    /// The run error, or else the `after_sync` error.
    pub fn error(&self) -> Option<&SyncError> {
        self.meta.error().or(self.after_sync_error.as_ref())
    }

    pub fn is_success(&self) -> bool {
        self.error().is_none()
    }

    /// `Err` carrying the total whenever the run or its cleanup failed.
    pub fn into_result(self) -> Result<SyncRun, SyncFailure> {
        match self.error() {
            Some(error) => Err(SyncFailure::new(self.meta.total, error.clone())),
            None => Ok(self),
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run: self.run_id.to_string(),
            task: self.task.clone(),
            status: self.status(),
            total: self.meta.total,
            version: self.meta.version,
            counts: self.counts,
            error: self.error().map(ToString::to_string),
        }
    }
}

/// Serializable view of a [`SyncRun`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run: String,
    pub task: String,
    pub status: SyncStatus,
    pub total: u64,
    pub version: u64,
    pub counts: PageCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
