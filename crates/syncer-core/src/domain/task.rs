use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::filter::{Filter, Order};

fn default_size() -> u64 {
    100
}

fn default_workers() -> usize {
    1
}

/// Target-specific configuration, kept as raw JSON until a target decodes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetConfig(serde_json::Value);

impl TargetConfig {
    pub fn new(raw: serde_json::Value) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.0
    }

    /// Decode into the target's own config type. A missing blob decodes from `{}`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.0 {
            serde_json::Value::Null => serde_json::from_value(serde_json::json!({})),
            raw => serde_json::from_value(raw.clone()),
        }
    }
}

/// One sync task definition.
///
/// `mapping` maps a source field to a mapping expression
/// (`dest|resolver:arg;other_dest|resolver`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncTask {
    pub id: String,
    pub source: String,

    #[serde(default)]
    pub mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub orders: Vec<Order>,

    pub target: String,
    #[serde(default)]
    pub target_config: TargetConfig,

    /// Page size.
    #[serde(default = "default_size")]
    pub size: u64,
    /// Page worker concurrency.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub stop_on_error: bool,

    /// Time of day (`HH:MM[:SS]`), only meaningful with a day interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default)]
    pub immediately: bool,
}

impl SyncTask {
    /// Minimal task: everything but identity, locator and target defaulted.
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            mapping: BTreeMap::new(),
            filters: Vec::new(),
            orders: Vec::new(),
            target: target.into(),
            target_config: TargetConfig::default(),
            size: default_size(),
            workers: default_workers(),
            stop_on_error: false,
            at: None,
            interval: None,
            immediately: false,
        }
    }

    pub fn with_mapping(mut self, field: impl Into<String>, expr: impl Into<String>) -> Self {
        self.mapping.insert(field.into(), expr.into());
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    pub fn with_paging(mut self, size: u64, workers: usize) -> Self {
        self.size = size;
        self.workers = workers;
        self
    }

    pub fn with_target_config(mut self, raw: serde_json::Value) -> Self {
        self.target_config = TargetConfig::new(raw);
        self
    }

    pub fn stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }

    pub fn every(mut self, interval: impl Into<String>) -> Self {
        self.interval = Some(interval.into());
        self
    }

    /// Non-empty interval, if the task is scheduled at all.
    pub fn interval(&self) -> Option<&str> {
        self.interval.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Structural checks that do not need any registry.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("task id must not be empty".into());
        }
        if self.size == 0 {
            return Err("size must be greater than zero".into());
        }
        if self.workers == 0 {
            return Err("workers must be greater than zero".into());
        }
        for filter in &self.filters {
            filter.check_shape()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::filter::FilterOp;

    #[test]
    fn task_json_uses_defaults() {
        let json = r#"
        {
          "id": "sync_roles",
          "source": "memory://remote/roles",
          "mapping": { "name": "name|trim" },
          "target": "default"
        }"#;
        let task: SyncTask = serde_json::from_str(json).expect("deserialize");
        assert_eq!(task.size, 100);
        assert_eq!(task.workers, 1);
        assert!(!task.stop_on_error);
        assert!(task.interval().is_none());
        assert_eq!(task.target_config, TargetConfig::default());
    }

    #[test]
    fn full_task_json() {
        let json = r#"
        {
          "id": "users",
          "source": "memory://remote/users?pk=uid",
          "mapping": { "age": "age|int" },
          "filters": [{ "field": "age", "operator": "between", "value": [18, 60] }],
          "orders": [{ "field": "uid", "direction": "desc" }],
          "size": 20,
          "workers": 4,
          "stop_on_error": true,
          "target": "default",
          "target_config": { "table": "users", "uniques": ["uid"] },
          "interval": "1d",
          "at": "02:30",
          "immediately": true
        }"#;
        let task: SyncTask = serde_json::from_str(json).expect("deserialize");
        assert_eq!(task.filters[0].operator, FilterOp::Between);
        assert_eq!(task.interval(), Some("1d"));
        assert_eq!(task.at.as_deref(), Some("02:30"));
        assert!(task.validate().is_ok());

        #[derive(Deserialize)]
        struct Conf {
            table: String,
            uniques: Vec<String>,
        }
        let conf: Conf = task.target_config.decode().unwrap();
        assert_eq!(conf.table, "users");
        assert_eq!(conf.uniques, vec!["uid".to_string()]);
    }

    #[test]
    fn zero_size_is_invalid() {
        let task = SyncTask::new("t", "memory://a/b", "default").with_paging(0, 1);
        assert!(task.validate().unwrap_err().contains("size"));
    }

    #[test]
    fn blank_interval_means_unscheduled() {
        let task = SyncTask::new("t", "memory://a/b", "default").every("  ");
        assert!(task.interval().is_none());
    }
}
