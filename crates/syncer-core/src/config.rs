//! Task files and run options.
//!
//! タスク定義は JSON 配列で与える。読み込み時に全タスクを検証し、
//! 問題のあるタスクの id をエラーに含める。

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::scheduler::{IntervalSpec, parse_at};
use crate::domain::SyncTask;
use crate::resolve::FieldMapping;

/// Tuning knobs shared by every run of one orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Pages that may wait in the pool queue before submission blocks.
    pub backlog: usize,
    /// Lower bound of the pause before each page write.
    pub jitter_min_ms: u64,
    /// Upper bound of the pause before each page write.
    pub jitter_max_ms: u64,
}

impl SyncOptions {
    pub const DEFAULT_BACKLOG: usize = 1000;

    /// Options without the pre-write pause.
    pub fn without_jitter() -> Self {
        Self {
            jitter_min_ms: 0,
            jitter_max_ms: 0,
            ..Self::default()
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            backlog: Self::DEFAULT_BACKLOG,
            jitter_min_ms: 10,
            jitter_max_ms: 30,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed task file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate task id: {0}")]
    DuplicateId(String),

    #[error("task {task}: {reason}")]
    InvalidTask { task: String, reason: String },
}

/// Read and validate a JSON task file.
pub fn load_tasks(path: impl AsRef<Path>) -> Result<Vec<SyncTask>, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_tasks(&raw)
}

/// Parse and validate a JSON array of tasks.
pub fn parse_tasks(raw: &str) -> Result<Vec<SyncTask>, ConfigError> {
    let tasks: Vec<SyncTask> = serde_json::from_str(raw)?;
    if let Some(id) = duplicate_ids(&tasks).into_iter().next() {
        return Err(ConfigError::DuplicateId(id));
    }
    for task in &tasks {
        validate_task(task)?;
    }
    tracing::debug!(count = tasks.len(), "task file loaded");
    Ok(tasks)
}

/// Ids used by more than one task, each listed once in file order.
pub fn duplicate_ids(tasks: &[SyncTask]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    tasks
        .iter()
        .filter(|task| !seen.insert(task.id.as_str()) && reported.insert(task.id.as_str()))
        .map(|task| task.id.clone())
        .collect()
}

/// Everything that can be checked without touching a datasource or target.
pub fn validate_task(task: &SyncTask) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidTask {
        task: task.id.clone(),
        reason,
    };
    task.validate().map_err(invalid)?;
    FieldMapping::parse(&task.mapping).map_err(|e| invalid(e.to_string()))?;
    if let Some(interval) = task.interval() {
        IntervalSpec::parse(interval).map_err(|e| invalid(e.to_string()))?;
    }
    if let Some(at) = task.at.as_deref() {
        parse_at(at).map_err(|e| invalid(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TASKS: &str = r#"[
        {
            "id": "users",
            "source": "memory://crm/users",
            "mapping": {"name": "name|trim", "age": "age|int"},
            "filters": [{"field": "age", "operator": ">=", "value": 18}],
            "orders": [{"field": "id", "direction": "asc"}],
            "size": 20,
            "workers": 4,
            "stop_on_error": true,
            "target": "default",
            "target_config": {"table": "users", "uniques": ["id"]},
            "interval": "3d",
            "at": "02:30"
        },
        {
            "id": "orders",
            "source": "memory://crm/orders",
            "target": "default",
            "interval": "45s",
            "immediately": true
        }
    ]"#;

    #[test]
    fn parses_a_task_file() {
        let tasks = parse_tasks(TASKS).unwrap();
        assert_eq!(tasks.len(), 2);

        let users = &tasks[0];
        assert_eq!(users.size, 20);
        assert_eq!(users.workers, 4);
        assert!(users.stop_on_error);
        assert_eq!(users.filters.len(), 1);
        assert_eq!(users.mapping["name"], "name|trim");

        let orders = &tasks[1];
        assert_eq!(orders.size, 100);
        assert_eq!(orders.workers, 1);
        assert!(orders.immediately);
    }

    #[test]
    fn invalid_task_names_its_id() {
        let raw = r#"[{"id": "broken", "source": "memory://a/b", "target": "default", "size": 0}]"#;
        let err = parse_tasks(raw).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTask { ref task, .. } if task == "broken"));
    }

    #[test]
    fn bad_mapping_is_rejected() {
        let raw = r#"[{"id": "m", "source": "memory://a/b", "target": "default",
                       "mapping": {"name": "|trim"}}]"#;
        assert!(matches!(
            parse_tasks(raw),
            Err(ConfigError::InvalidTask { .. })
        ));
    }

    #[test]
    fn bad_schedule_is_rejected() {
        let bad_days = r#"[{"id": "s", "source": "memory://a/b", "target": "default", "interval": "0d"}]"#;
        let bad_at = r#"[{"id": "s", "source": "memory://a/b", "target": "default",
                          "interval": "1d", "at": "25:00"}]"#;
        assert!(parse_tasks(bad_days).is_err());
        assert!(parse_tasks(bad_at).is_err());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let raw = r#"[
            {"id": "a", "source": "memory://a/b", "target": "default"},
            {"id": "a", "source": "memory://a/c", "target": "default"}
        ]"#;
        assert!(matches!(parse_tasks(raw), Err(ConfigError::DuplicateId(id)) if id == "a"));
    }

    #[test]
    fn duplicate_ids_are_listed_once() {
        let tasks = ["a", "b", "a", "c", "a", "b"]
            .map(|id| SyncTask::new(id, "memory://crm/users", "default"));
        assert_eq!(duplicate_ids(&tasks), vec!["a".to_string(), "b".to_string()]);
        assert!(duplicate_ids(&tasks[..2]).is_empty());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = load_tasks("/nonexistent/tasks.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn options_default_and_partial_override() {
        assert_eq!(SyncOptions::default().backlog, 1000);
        let opts: SyncOptions = serde_json::from_str(r#"{"jitter_max_ms": 5}"#).unwrap();
        assert_eq!(opts.backlog, 1000);
        assert_eq!(opts.jitter_min_ms, 10);
        assert_eq!(opts.jitter_max_ms, 5);
    }
}
