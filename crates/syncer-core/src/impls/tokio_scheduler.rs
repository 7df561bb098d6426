//! TokioScheduler - tokio タイマーによるスケジューラ
//!
//! Each trigger is one spawned tokio task; cancelling a tag aborts its tasks.
//! Non-day intervals use the humantime grammar (`45s`, `10m`, `1h 30m`).

use std::collections::HashMap;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, NaiveTime};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::ports::{Job, ScheduleError, SchedulePrimitive};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Scheduling primitive backed by the current tokio runtime.
pub struct TokioScheduler {
    handle: Handle,
    triggers: Mutex<HashMap<String, Vec<JoinHandle<()>>>>,
}

impl TokioScheduler {
    /// Scheduler bound to the runtime this is called from.
    pub fn new() -> Result<Self, ScheduleError> {
        let handle = Handle::try_current().map_err(|e| ScheduleError::Unavailable(e.to_string()))?;
        Ok(Self::with_handle(handle))
    }

    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            triggers: Mutex::new(HashMap::new()),
        }
    }

    /// Tags with at least one live trigger.
    pub fn tags(&self) -> Vec<String> {
        let mut triggers = self.triggers.lock();
        triggers.retain(|_, joins| {
            joins.retain(|j| !j.is_finished());
            !joins.is_empty()
        });
        let mut tags: Vec<String> = triggers.keys().cloned().collect();
        tags.sort();
        tags
    }

    /// Abort every trigger.
    pub fn shutdown(&self) {
        for (_, joins) in self.triggers.lock().drain() {
            for j in joins {
                j.abort();
            }
        }
    }

    fn track(&self, tag: &str, join: JoinHandle<()>) {
        self.triggers
            .lock()
            .entry(tag.to_string())
            .or_default()
            .push(join);
    }

    fn spawn_every(&self, tag: &str, first: Duration, period: Duration, job: Job) {
        let tag_owned = tag.to_string();
        let join = self.handle.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + first, period);
            // 前回の実行が長引いた場合は取りこぼした tick をまとめて撃たない
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                tracing::debug!(tag = %tag_owned, "trigger fired");
                job().await;
            }
        });
        self.track(tag, join);
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Parse a forwarded interval (`45s`, `10m`, `1h 30m`).
pub fn parse_interval(interval: &str) -> Result<Duration, ScheduleError> {
    let invalid = |reason: String| ScheduleError::InvalidInterval {
        interval: interval.to_string(),
        reason,
    };
    let period = humantime::parse_duration(interval.trim()).map_err(|e| invalid(e.to_string()))?;
    if period.is_zero() {
        return Err(invalid("interval must be positive".into()));
    }
    Ok(period)
}

/// Delay from `now` until the next `at` wall-clock time.
pub fn delay_until(now: NaiveDateTime, at: NaiveTime) -> Duration {
    let today = now.date().and_time(at);
    let next = if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    };
    (next - now).to_std().unwrap_or_default()
}

impl SchedulePrimitive for TokioScheduler {
    fn every_days(
        &self,
        days: u32,
        at: Option<NaiveTime>,
        tag: &str,
        job: Job,
    ) -> Result<(), ScheduleError> {
        if days == 0 {
            return Err(ScheduleError::InvalidInterval {
                interval: format!("{days}d"),
                reason: "day count must be positive".into(),
            });
        }
        let period = DAY * days;
        let first = match at {
            Some(at) => delay_until(Local::now().naive_local(), at),
            None => period,
        };
        self.spawn_every(tag, first, period, job);
        Ok(())
    }

    fn every(&self, interval: &str, tag: &str, job: Job) -> Result<(), ScheduleError> {
        let period = parse_interval(interval)?;
        self.spawn_every(tag, period, period, job);
        Ok(())
    }

    fn once(&self, tag: &str, job: Job) -> Result<(), ScheduleError> {
        let join = self.handle.spawn(async move { job().await });
        self.track(tag, join);
        Ok(())
    }

    fn remove_by_tag(&self, tag: &str) -> usize {
        let Some(joins) = self.triggers.lock().remove(tag) else {
            return 0;
        };
        let live = joins.iter().filter(|j| !j.is_finished()).count();
        for j in joins {
            j.abort();
        }
        live
    }
}
