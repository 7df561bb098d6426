//! MemoryTarget - 開発用のバージョン付き書き込み先
//!
//! Implements the versioning protocol over in-memory tables:
//! - `before_sync`: version = max(recorded version) + 1
//! - `sync_from`: stamp version / sync time / active flag, then upsert on `uniques`
//! - `after_sync`: mark older versions inactive, prune beyond `max_version`

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::format::{Item, StrftimeItems};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::domain::{Row, SyncMeta, TargetConfig, Value};
use crate::ports::{Clock, SystemClock, Target, TargetError};

pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const ACTIVE: i64 = 1;
const INACTIVE: i64 = 0;

/// `target_config` understood by [`MemoryTarget`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryTargetConfig {
    pub table: String,
    /// Conflict key of the upsert. Empty means plain inserts.
    #[serde(default)]
    pub uniques: Vec<String>,
    /// Columns rewritten on conflict. Empty means every incoming column.
    #[serde(default)]
    pub updates: Vec<String>,

    #[serde(default)]
    pub version_field: Option<String>,
    #[serde(default)]
    pub sync_time_field: Option<String>,
    /// chrono format string; defaults to [`DEFAULT_TIME_FORMAT`].
    #[serde(default)]
    pub sync_time_fmt: Option<String>,
    #[serde(default)]
    pub sync_status_field: Option<String>,
    /// Number of past versions kept. `0` keeps everything.
    #[serde(default)]
    pub max_version: u64,
}

impl MemoryTargetConfig {
    fn decode(config: &TargetConfig) -> Result<Self, TargetError> {
        let config: Self = config.decode()?;
        if config.table.trim().is_empty() {
            return Err(TargetError::Config("table is required".into()));
        }
        let fmt = config.time_format();
        if StrftimeItems::new(fmt).any(|item| matches!(item, Item::Error)) {
            return Err(TargetError::Config(format!("invalid sync_time_fmt: {fmt}")));
        }
        Ok(config)
    }

    fn version_field(&self) -> Option<&str> {
        non_empty(self.version_field.as_deref())
    }

    fn sync_time_field(&self) -> Option<&str> {
        non_empty(self.sync_time_field.as_deref())
    }

    fn status_field(&self) -> Option<&str> {
        non_empty(self.sync_status_field.as_deref())
    }

    fn time_format(&self) -> &str {
        non_empty(self.sync_time_fmt.as_deref()).unwrap_or(DEFAULT_TIME_FORMAT)
    }

    /// Columns the target itself stamps; always refreshed on conflict.
    fn bookkeeping_fields(&self) -> impl Iterator<Item = &str> {
        [self.version_field(), self.sync_time_field(), self.status_field()]
            .into_iter()
            .flatten()
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// In-memory implementation of the target versioning protocol.
pub struct MemoryTarget {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Seed `table` with existing rows.
    pub fn insert_table(&self, table: impl Into<String>, rows: Vec<Row>) {
        self.tables.write().insert(table.into(), rows);
    }

    /// Copy of the rows of `table` (empty if it was never written).
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.read().get(table).cloned().unwrap_or_default()
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn max_version(&self, table: &str, field: &str) -> u64 {
        self.tables
            .read()
            .get(table)
            .into_iter()
            .flatten()
            .filter_map(|r| r.get(field).and_then(Value::as_i64))
            .max()
            .map_or(0, |v| v.max(0) as u64)
    }
}

impl Default for MemoryTarget {
    fn default() -> Self {
        Self::new()
    }
}

fn row_version(row: &Row, field: &str) -> Option<u64> {
    row.get(field).and_then(Value::as_i64).map(|v| v.max(0) as u64)
}

fn same_key(a: &Row, b: &Row, uniques: &[String]) -> bool {
    uniques.iter().all(|col| match (a.get(col), b.get(col)) {
        (Some(x), Some(y)) => x.loosely_eq(y),
        _ => false,
    })
}

#[async_trait]
impl Target for MemoryTarget {
    async fn before_sync(&self, config: &TargetConfig, meta: &mut SyncMeta) -> Result<(), TargetError> {
        let config = MemoryTargetConfig::decode(config)?;
        if let Some(field) = config.version_field() {
            meta.version = self.max_version(&config.table, field) + 1;
        }
        Ok(())
    }

    async fn sync_from(
        &self,
        config: &TargetConfig,
        rows: Vec<Row>,
        meta: &SyncMeta,
    ) -> Result<(), TargetError> {
        let config = MemoryTargetConfig::decode(config)?;
        let synced_at = self.clock.now().format(config.time_format()).to_string();

        let stamped = rows.into_iter().map(|mut row| {
            if let Some(field) = config.version_field() {
                row.insert(field.to_string(), Value::from(meta.version));
            }
            if let Some(field) = config.sync_time_field() {
                row.insert(field.to_string(), Value::String(synced_at.clone()));
            }
            if let Some(field) = config.status_field() {
                row.insert(field.to_string(), Value::Int(ACTIVE));
            }
            row
        });

        let mut tables = self.tables.write();
        let table = tables.entry(config.table.clone()).or_default();
        for incoming in stamped {
            let existing = if config.uniques.is_empty() {
                None
            } else {
                table.iter_mut().find(|r| same_key(r, &incoming, &config.uniques))
            };

            match existing {
                Some(current) if config.updates.is_empty() => current.extend(incoming),
                Some(current) => {
                    for col in config.updates.iter().map(String::as_str).chain(config.bookkeeping_fields()) {
                        if let Some(v) = incoming.get(col) {
                            current.insert(col.to_string(), v.clone());
                        }
                    }
                }
                None => table.push(incoming),
            }
        }
        Ok(())
    }

    async fn after_sync(&self, config: &TargetConfig, meta: &SyncMeta) -> Result<(), TargetError> {
        let config = MemoryTargetConfig::decode(config)?;
        let Some(version_field) = config.version_field() else {
            return Ok(());
        };

        let mut tables = self.tables.write();
        let Some(table) = tables.get_mut(&config.table) else {
            return Ok(());
        };

        if let Some(status_field) = config.status_field() {
            for row in table.iter_mut() {
                if row_version(row, version_field).is_some_and(|v| v < meta.version) {
                    row.insert(status_field.to_string(), Value::Int(INACTIVE));
                }
            }
        }

        if config.max_version > 0 {
            let floor = meta.version.saturating_sub(config.max_version);
            let before = table.len();
            table.retain(|row| {
                !row_version(row, version_field).is_some_and(|v| v > 0 && v < floor)
            });
            tracing::debug!(
                table = %config.table,
                pruned = before - table.len(),
                floor,
                "pruned old versions"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::row;
    use crate::ports::FixedClock;
    use chrono::NaiveDate;

    fn config(extra: serde_json::Value) -> TargetConfig {
        let mut base = serde_json::json!({
            "table": "users",
            "uniques": ["id"],
            "version_field": "version",
            "sync_status_field": "active",
            "sync_time_field": "synced_at",
        });
        if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        TargetConfig::new(base)
    }

    fn fixed_target() -> MemoryTarget {
        let at = NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(7, 8, 9)
            .unwrap();
        MemoryTarget::with_clock(Arc::new(FixedClock::new(at)))
    }

    fn user(id: i64, version: i64) -> Row {
        row([
            ("id", Value::Int(id)),
            ("version", Value::Int(version)),
            ("active", Value::Int(1)),
        ])
    }

    #[tokio::test]
    async fn before_sync_bumps_max_version() {
        let target = MemoryTarget::new();
        target.insert_table("users", vec![user(1, 4), user(2, 9)]);

        let mut meta = SyncMeta::new(1);
        target.before_sync(&config(serde_json::json!({})), &mut meta).await.unwrap();
        assert_eq!(meta.version, 10);
    }

    #[tokio::test]
    async fn empty_table_starts_at_version_one() {
        let target = MemoryTarget::new();
        let mut meta = SyncMeta::new(1);
        target.before_sync(&config(serde_json::json!({})), &mut meta).await.unwrap();
        assert_eq!(meta.version, 1);
    }

    #[tokio::test]
    async fn sync_from_stamps_and_upserts() {
        let target = fixed_target();
        target.insert_table(
            "users",
            vec![row([("id", Value::Int(1)), ("name", Value::from("old")), ("version", Value::Int(1))])],
        );
        let conf = config(serde_json::json!({}));
        let mut meta = SyncMeta::new(2);
        target.before_sync(&conf, &mut meta).await.unwrap();

        let rows = vec![
            row([("id", Value::Int(1)), ("name", Value::from("new"))]),
            row([("id", Value::Int(2)), ("name", Value::from("fresh"))]),
        ];
        target.sync_from(&conf, rows, &meta).await.unwrap();

        let stored = target.rows("users");
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0]["name"], Value::from("new"));
        assert_eq!(stored[0]["version"], Value::Int(2));
        assert_eq!(stored[0]["active"], Value::Int(1));
        assert_eq!(stored[1]["synced_at"], Value::from("2024-05-06 07:08:09"));
    }

    #[tokio::test]
    async fn updates_limit_rewritten_columns() {
        let target = fixed_target();
        target.insert_table(
            "users",
            vec![row([
                ("id", Value::Int(1)),
                ("name", Value::from("keep")),
                ("email", Value::from("old@x")),
                ("version", Value::Int(1)),
            ])],
        );
        let conf = config(serde_json::json!({ "updates": ["email"], "sync_time_fmt": "%d/%m/%Y" }));
        let meta = {
            let mut m = SyncMeta::new(1);
            target.before_sync(&conf, &mut m).await.unwrap();
            m
        };

        let rows = vec![row([
            ("id", Value::Int(1)),
            ("name", Value::from("ignored")),
            ("email", Value::from("new@x")),
        ])];
        target.sync_from(&conf, rows, &meta).await.unwrap();

        let stored = &target.rows("users")[0];
        assert_eq!(stored["name"], Value::from("keep"));
        assert_eq!(stored["email"], Value::from("new@x"));
        assert_eq!(stored["version"], Value::Int(2));
        assert_eq!(stored["synced_at"], Value::from("06/05/2024"));
    }

    #[tokio::test]
    async fn no_uniques_appends() {
        let target = MemoryTarget::new();
        let conf = TargetConfig::new(serde_json::json!({ "table": "log" }));
        let meta = SyncMeta::new(1);
        let r = row([("id", Value::Int(1))]);
        target.sync_from(&conf, vec![r.clone()], &meta).await.unwrap();
        target.sync_from(&conf, vec![r], &meta).await.unwrap();
        assert_eq!(target.rows("log").len(), 2);
    }

    #[tokio::test]
    async fn after_sync_retention_window() {
        let target = MemoryTarget::new();
        target.insert_table("users", (1..=10).map(|v| user(v, v)).collect());
        let conf = config(serde_json::json!({ "max_version": 3 }));
        let mut meta = SyncMeta::new(10);
        meta.version = 10;

        target.after_sync(&conf, &meta).await.unwrap();

        let stored = target.rows("users");
        let versions: Vec<i64> = stored.iter().map(|r| r["version"].as_i64().unwrap()).collect();
        assert_eq!(versions, vec![7, 8, 9, 10]);
        for r in &stored {
            let expected = if r["version"] == Value::Int(10) { 1 } else { 0 };
            assert_eq!(r["active"], Value::Int(expected));
        }
    }

    #[tokio::test]
    async fn after_sync_keeps_unversioned_rows() {
        let target = MemoryTarget::new();
        target.insert_table("users", vec![user(1, 0), user(2, 1)]);
        let conf = config(serde_json::json!({ "max_version": 1 }));
        let mut meta = SyncMeta::new(1);
        meta.version = 5;

        target.after_sync(&conf, &meta).await.unwrap();
        let versions: Vec<Value> = target.rows("users").iter().map(|r| r["version"].clone()).collect();
        assert_eq!(versions, vec![Value::Int(0)]);
    }

    #[tokio::test]
    async fn missing_table_is_config_error() {
        let target = MemoryTarget::new();
        let mut meta = SyncMeta::new(1);
        let err = target
            .before_sync(&TargetConfig::default(), &mut meta)
            .await
            .unwrap_err();
        assert!(matches!(err, TargetError::Config(_)));
    }

    #[tokio::test]
    async fn invalid_time_format_is_config_error() {
        let target = fixed_target();
        let conf = config(serde_json::json!({ "sync_time_fmt": "%Y-%Q" }));
        let meta = SyncMeta::new(1);

        let err = target
            .sync_from(&conf, vec![row([("id", Value::Int(1))])], &meta)
            .await
            .unwrap_err();
        assert!(matches!(err, TargetError::Config(ref reason) if reason.contains("%Y-%Q")));
        assert!(target.rows("users").is_empty());
    }
}
