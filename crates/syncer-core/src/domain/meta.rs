//! Per-run sync state.

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Status of one sync run.
///
/// State transitions:
/// - Pending -> Running -> Success
/// - Pending -> Running -> Failed
/// - Pending -> Failed (a hook failed before any page ran)
///
/// Terminal states never move again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl SyncStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SyncStatus::Success | SyncStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            SyncStatus::Pending => 0,
            SyncStatus::Running => 1,
            SyncStatus::Success | SyncStatus::Failed => 2,
        }
    }

    /// Whether `self -> next` is a forward move.
    pub fn can_advance_to(self, next: SyncStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

/// Mutable state owned by exactly one run.
///
/// `total` is fixed when the run starts; `version` is written once by the
/// target's `before_sync` hook.
#[derive(Debug, Clone)]
pub struct SyncMeta {
    pub version: u64,
    pub total: u64,
    status: SyncStatus,
    error: Option<SyncError>,
}

impl SyncMeta {
    pub fn new(total: u64) -> Self {
        Self {
            version: 0,
            total,
            status: SyncStatus::Pending,
            error: None,
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn error(&self) -> Option<&SyncError> {
        self.error.as_ref()
    }

    /// Pending -> Running. Returns false if the transition is not allowed.
    pub fn start(&mut self) -> bool {
        self.advance(SyncStatus::Running)
    }

    pub fn succeed(&mut self) -> bool {
        self.advance(SyncStatus::Success)
    }

    /// Records `error` as the terminal error. The first failure wins.
    pub fn fail(&mut self, error: SyncError) -> bool {
        if self.advance(SyncStatus::Failed) {
            self.error = Some(error);
            true
        } else {
            false
        }
    }

    fn advance(&mut self, next: SyncStatus) -> bool {
        if self.status.can_advance_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }
}
