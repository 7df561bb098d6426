//! SyncerBuilder - レジストリとタスクのワイヤリング
//!
//! # Fail-fast 設計
//! - build() 時に全タスクを検証する
//! - タスクが参照する target と datasource の scheme が登録済みかチェック
//! - 不足があれば BuildError を返す（実行時に初めて気づくことがない）

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::config::{SyncOptions, validate_task};
use crate::domain::SyncTask;
use crate::ports::{Clock, Connector, Target};
use crate::registry::{DatasourceRegistry, TargetRegistry, parse_locator};
use crate::resolve::{Resolver, ResolverRegistry};

use super::syncer::Syncer;

/// Builds a [`Syncer`].
///
/// # 使用例
/// ```ignore
/// let syncer = SyncerBuilder::new()
///     .datasource("memory", Arc::new(MemoryConnector::new()))
///     .target("default", Arc::new(MemoryTarget::new()))
///     .tasks(config::load_tasks("tasks.json")?)
///     .build()?;
/// ```
pub struct SyncerBuilder {
    datasources: DatasourceRegistry,
    targets: TargetRegistry,
    resolvers: ResolverRegistry,
    tasks: Vec<SyncTask>,
    options: SyncOptions,
    clock: Option<Arc<dyn Clock>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("task {task} is invalid: {reason}")]
    InvalidTask { task: String, reason: String },

    #[error("task {0} is defined more than once")]
    DuplicateTask(String),

    #[error("missing targets: {0:?}. These targets are used by tasks but not registered.")]
    MissingTargets(Vec<String>),

    #[error("unknown datasource schemes: {0:?}. No connector is registered for them.")]
    UnknownSchemes(Vec<String>),
}

impl SyncerBuilder {
    /// Builder with the built-in resolvers and no datasource or target.
    pub fn new() -> Self {
        Self {
            datasources: DatasourceRegistry::new(),
            targets: TargetRegistry::new(),
            resolvers: ResolverRegistry::new(),
            tasks: Vec::new(),
            options: SyncOptions::default(),
            clock: None,
        }
    }

    pub fn datasource(self, scheme: impl Into<String>, connector: Arc<dyn Connector>) -> Self {
        self.datasources.register(scheme, connector);
        self
    }

    pub fn target(self, name: impl Into<String>, target: Arc<dyn Target>) -> Self {
        self.targets.register(name, target);
        self
    }

    pub fn resolver<R: Resolver + 'static>(self, name: impl Into<String>, resolver: R) -> Self {
        self.resolvers.register(name, resolver);
        self
    }

    pub fn task(mut self, task: SyncTask) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn tasks(mut self, tasks: impl IntoIterator<Item = SyncTask>) -> Self {
        self.tasks.extend(tasks);
        self
    }

    pub fn options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the tasks against the registries and build the syncer.
    ///
    /// # 検証
    /// - 各タスクの構造（size, workers, mapping, interval, at）
    /// - task id の重複
    /// - 参照される target が全て登録済み
    /// - source の scheme に connector が登録済み
    pub fn build(self) -> Result<Syncer, BuildError> {
        let mut seen = HashSet::new();
        let mut missing_targets = BTreeSet::new();
        let mut unknown_schemes = BTreeSet::new();

        for task in &self.tasks {
            if !seen.insert(task.id.as_str()) {
                return Err(BuildError::DuplicateTask(task.id.clone()));
            }
            validate_task(task).map_err(|e| BuildError::InvalidTask {
                task: task.id.clone(),
                reason: e.to_string(),
            })?;

            if !self.targets.contains(&task.target) {
                missing_targets.insert(task.target.clone());
            }
            let locator = parse_locator(&task.source).map_err(|e| BuildError::InvalidTask {
                task: task.id.clone(),
                reason: e.to_string(),
            })?;
            if !self.datasources.contains(locator.scheme()) {
                unknown_schemes.insert(locator.scheme().to_string());
            }
        }

        if !missing_targets.is_empty() {
            return Err(BuildError::MissingTargets(missing_targets.into_iter().collect()));
        }
        if !unknown_schemes.is_empty() {
            return Err(BuildError::UnknownSchemes(unknown_schemes.into_iter().collect()));
        }

        let mut syncer = Syncer::new(
            Arc::new(self.datasources),
            Arc::new(self.targets),
            Arc::new(self.resolvers),
        )
        .with_options(self.options);
        if let Some(clock) = self.clock {
            syncer = syncer.with_clock(clock);
        }
        tracing::debug!(tasks = self.tasks.len(), "syncer built");
        syncer.tasks().add(self.tasks);
        Ok(syncer)
    }
}

impl Default for SyncerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Row, Value};
    use crate::impls::{MemoryConnector, MemoryTarget};

    fn base() -> SyncerBuilder {
        SyncerBuilder::new()
            .datasource("memory", Arc::new(MemoryConnector::new()))
            .target("default", Arc::new(MemoryTarget::new()))
    }

    #[test]
    fn build_registers_tasks() {
        let syncer = base()
            .task(SyncTask::new("a", "memory://crm/a", "default"))
            .task(SyncTask::new("b", "MEMORY://crm/b", "default"))
            .build()
            .unwrap();

        assert_eq!(syncer.tasks().ids(), vec!["a".to_string(), "b".to_string()]);
        assert!(syncer.resolvers().contains("trim"));
    }

    #[test]
    fn missing_targets_are_listed() {
        let err = base()
            .task(SyncTask::new("a", "memory://crm/a", "warehouse"))
            .task(SyncTask::new("b", "memory://crm/b", "lake"))
            .task(SyncTask::new("c", "memory://crm/c", "lake"))
            .build()
            .err()
            .unwrap();

        match err {
            BuildError::MissingTargets(names) => {
                assert_eq!(names, vec!["lake".to_string(), "warehouse".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_schemes_are_listed() {
        let err = base()
            .task(SyncTask::new("a", "mysql://db/users", "default"))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, BuildError::UnknownSchemes(ref s) if s == &vec!["mysql".to_string()]));
    }

    #[test]
    fn invalid_and_duplicate_tasks_fail() {
        let invalid = base()
            .task(SyncTask::new("a", "memory://crm/a", "default").with_paging(10, 0))
            .build();
        assert!(matches!(invalid, Err(BuildError::InvalidTask { .. })));

        let duplicate = base()
            .task(SyncTask::new("a", "memory://crm/a", "default"))
            .task(SyncTask::new("a", "memory://crm/b", "default"))
            .build();
        assert!(matches!(duplicate, Err(BuildError::DuplicateTask(_))));
    }

    #[test]
    fn custom_resolvers_are_available() {
        let syncer = base()
            .resolver("upper", |value: Value, _row: &Row, _args: &[String]| match value {
                Value::String(s) => Value::String(s.to_uppercase()),
                other => other,
            })
            .build()
            .unwrap();

        assert_eq!(
            syncer.resolvers().resolve(Value::from("abc"), &Row::new(), "upper", &[]),
            Value::from("ABC")
        );
    }
}
