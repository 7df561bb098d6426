//! SchedulePrimitive port - 定期実行の仕組み
//!
//! The scheduler adapter only decides *what* to register; timers, threads and
//! the interval grammar for non-day cadences belong to the primitive.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::NaiveTime;

pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Callback fired on every trigger.
pub type Job = Arc<dyn Fn() -> JobFuture + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("invalid interval `{interval}`: {reason}")]
    InvalidInterval { interval: String, reason: String },

    #[error("invalid time of day `{0}` (expected HH:MM or HH:MM:SS)")]
    InvalidAt(String),

    #[error("scheduler unavailable: {0}")]
    Unavailable(String),
}

/// Timer backend that owns the registered triggers.
///
/// Every registration carries a tag so all triggers of one task can be removed
/// together.
pub trait SchedulePrimitive: Send + Sync {
    /// Fire every `days` days, at `at` local time when given.
    fn every_days(
        &self,
        days: u32,
        at: Option<NaiveTime>,
        tag: &str,
        job: Job,
    ) -> Result<(), ScheduleError>;

    /// Fire on a cadence written in the primitive's own interval grammar.
    fn every(&self, interval: &str, tag: &str, job: Job) -> Result<(), ScheduleError>;

    /// Fire once, as soon as possible.
    fn once(&self, tag: &str, job: Job) -> Result<(), ScheduleError>;

    /// Cancel every trigger carrying `tag`; returns how many were removed.
    fn remove_by_tag(&self, tag: &str) -> usize;
}
