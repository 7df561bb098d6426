use thiserror::Error;

use crate::ports::{DatasourceError, TargetError};
use crate::resolve::MappingError;

/// Errors of one sync run.
///
/// Setup errors abort before any page runs; page errors only fail a run whose
/// task has `stop_on_error` set.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("invalid task {task}: {reason}")]
    InvalidTask { task: String, reason: String },

    #[error("invalid mapping for task {task}: {source}")]
    InvalidMapping {
        task: String,
        #[source]
        source: MappingError,
    },

    #[error("cannot connect to `{locator}`: {source}")]
    Connection {
        locator: String,
        #[source]
        source: DatasourceError,
    },

    #[error("counting source rows failed: {0}")]
    Meta(#[source] DatasourceError),

    #[error("target not found: {0}")]
    TargetNotFound(String),

    #[error("before_sync failed: {0}")]
    BeforeSync(#[source] TargetError),

    #[error("after_sync failed: {0}")]
    AfterSync(#[source] TargetError),

    #[error("fetching page {page} failed: {source}")]
    PageFetch {
        page: u64,
        #[source]
        source: DatasourceError,
    },

    #[error("writing page {page} failed: {source}")]
    PageWrite {
        page: u64,
        #[source]
        source: TargetError,
    },

    #[error("page {page} panicked: {reason}")]
    PagePanic { page: u64, reason: String },
}

impl SyncError {
    /// Raised before any page was submitted.
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            SyncError::TaskNotFound(_)
                | SyncError::InvalidTask { .. }
                | SyncError::InvalidMapping { .. }
                | SyncError::Connection { .. }
                | SyncError::Meta(_)
                | SyncError::TargetNotFound(_)
        )
    }
}

/// A failed run: the error plus the row total counted before it happened
/// (`0` when counting never completed).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{error}")]
pub struct SyncFailure {
    pub total: u64,
    #[source]
    pub error: SyncError,
}

impl SyncFailure {
    pub fn new(total: u64, error: SyncError) -> Self {
        Self { total, error }
    }

    /// A failure before the total was known.
    pub fn setup(error: SyncError) -> Self {
        Self::new(0, error)
    }
}

impl From<SyncError> for SyncFailure {
    fn from(error: SyncError) -> Self {
        Self::setup(error)
    }
}
