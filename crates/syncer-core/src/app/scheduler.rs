//! Scheduler adapter - タスクのスケジュール登録
//!
//! Interval grammar:
//! - `<n>d`, `<n>day`, `<n>days` run every n days, at the task's `at` time if set
//! - anything else is forwarded untouched to the primitive
//!
//! Every trigger of a task is tagged `syncer:<id>`.

use std::sync::Arc;

use chrono::NaiveTime;

use crate::domain::SyncTask;
use crate::ports::{Job, JobFuture, ScheduleError, SchedulePrimitive};

use super::syncer::Syncer;

const DAY_SUFFIXES: [&str; 3] = ["days", "day", "d"];

/// Parsed `interval` of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntervalSpec {
    Days(u32),
    /// Left for the primitive to interpret.
    Forward(String),
}

impl IntervalSpec {
    pub fn parse(interval: &str) -> Result<Self, ScheduleError> {
        let interval = interval.trim();
        if interval.is_empty() {
            return Err(ScheduleError::InvalidInterval {
                interval: interval.to_string(),
                reason: "interval is empty".into(),
            });
        }

        let days = DAY_SUFFIXES.iter().find_map(|suffix| {
            let count = interval.strip_suffix(suffix)?.trim();
            count.parse::<u32>().ok()
        });
        match days {
            Some(0) => Err(ScheduleError::InvalidInterval {
                interval: interval.to_string(),
                reason: "day count must be positive".into(),
            }),
            Some(n) => Ok(IntervalSpec::Days(n)),
            None => Ok(IntervalSpec::Forward(interval.to_string())),
        }
    }
}

/// Parse a time of day written `HH:MM` or `HH:MM:SS`.
pub fn parse_at(at: &str) -> Result<NaiveTime, ScheduleError> {
    let at = at.trim();
    NaiveTime::parse_from_str(at, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(at, "%H:%M"))
        .map_err(|_| ScheduleError::InvalidAt(at.to_string()))
}

pub fn task_tag(id: &str) -> String {
    format!("syncer:{id}")
}

/// Registers the syncer's tasks on a scheduling primitive.
pub struct Scheduler {
    syncer: Arc<Syncer>,
    primitive: Arc<dyn SchedulePrimitive>,
}

impl Scheduler {
    pub fn new(syncer: Arc<Syncer>, primitive: Arc<dyn SchedulePrimitive>) -> Self {
        Self { syncer, primitive }
    }

    /// Schedule every registered task; returns how many got a trigger.
    ///
    /// Stops at the first task whose schedule is invalid.
    pub fn schedule_all(&self) -> Result<usize, ScheduleError> {
        let mut scheduled = 0;
        for task in self.syncer.tasks().snapshot() {
            if self.schedule(&task)? {
                scheduled += 1;
            }
        }
        tracing::info!(scheduled, "tasks scheduled");
        Ok(scheduled)
    }

    /// Register the triggers of `task`. Returns false when the task has
    /// neither an interval nor `immediately`.
    ///
    /// Triggers look the task up by id when they fire, so re-adding a task
    /// changes what later runs do.
    pub fn schedule(&self, task: &SyncTask) -> Result<bool, ScheduleError> {
        let tag = task_tag(&task.id);
        let spec = task.interval().map(IntervalSpec::parse).transpose()?;
        let at = task.at.as_deref().map(parse_at).transpose()?;

        if let Some(spec) = spec {
            match spec {
                IntervalSpec::Days(days) => {
                    self.primitive.every_days(days, at, &tag, self.job(&task.id))?;
                }
                IntervalSpec::Forward(interval) => {
                    if at.is_some() {
                        tracing::warn!(task = %task.id, %interval, "`at` only applies to day intervals, ignored");
                    }
                    self.primitive.every(&interval, &tag, self.job(&task.id))?;
                }
            }
        }
        if task.immediately {
            self.primitive.once(&tag, self.job(&task.id))?;
        }

        let scheduled = task.interval().is_some() || task.immediately;
        if scheduled {
            tracing::debug!(task = %task.id, %tag, "task scheduled");
        }
        Ok(scheduled)
    }

    /// Cancel every trigger of task `id`.
    pub fn unschedule(&self, id: &str) -> usize {
        self.primitive.remove_by_tag(&task_tag(id))
    }

    fn job(&self, id: &str) -> Job {
        let syncer = Arc::clone(&self.syncer);
        let id = id.to_string();
        Arc::new(move || -> JobFuture {
            let syncer = Arc::clone(&syncer);
            let id = id.clone();
            Box::pin(async move {
                match syncer.do_sync(&id).await {
                    Ok(run) => tracing::info!(
                        task = %id,
                        run = %run.run_id,
                        total = run.total(),
                        "scheduled sync done"
                    ),
                    Err(failure) => tracing::warn!(
                        task = %id,
                        total = failure.total,
                        error = %failure.error,
                        "scheduled sync failed"
                    ),
                }
            })
        })
    }
}
