//! Syncer - 同期 run のオーケストレーション
//!
//! 1 回の run の流れ:
//! 1. タスク検証・マッピング解析・データソース接続・件数取得（setup）
//! 2. target の `before_sync` で version を確定
//! 3. ページをワーカープールに流して `sync_from`
//! 4. 全ページ完了か、最初に報告されたエラーで終了判定
//! 5. `after_sync` を必ず 1 回だけ呼ぶ

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::config::SyncOptions;
use crate::domain::{Filter, Order, RunId, SyncMeta, SyncTask, TargetConfig};
use crate::error::{SyncError, SyncFailure};
use crate::ports::{Clock, Datasource, ListOptions, SystemClock, Target};
use crate::registry::{DatasourceRegistry, TargetRegistry, TaskRegistry};
use crate::resolve::{FieldMapping, ResolverRegistry};

use super::pool::{PageJob, PageOutcome, PagePool, PoolConfig};
use super::report::{PageCounts, PageTally, SyncRun};

/// Number of pages needed for `total` rows at `size` rows per page.
pub fn page_count(total: u64, size: u64) -> u64 {
    if size == 0 {
        return 0;
    }
    total.div_ceil(size)
}

/// Runs sync tasks against the registered datasources and targets.
pub struct Syncer {
    tasks: TaskRegistry,
    datasources: Arc<DatasourceRegistry>,
    targets: Arc<TargetRegistry>,
    resolvers: Arc<ResolverRegistry>,
    options: SyncOptions,
    clock: Arc<dyn Clock>,
}

impl Syncer {
    pub fn new(
        datasources: Arc<DatasourceRegistry>,
        targets: Arc<TargetRegistry>,
        resolvers: Arc<ResolverRegistry>,
    ) -> Self {
        Self {
            tasks: TaskRegistry::new(),
            datasources,
            targets,
            resolvers,
            options: SyncOptions::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Clock used for run ids.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    pub fn datasources(&self) -> &DatasourceRegistry {
        &self.datasources
    }

    pub fn targets(&self) -> &TargetRegistry {
        &self.targets
    }

    pub fn resolvers(&self) -> &ResolverRegistry {
        &self.resolvers
    }

    pub fn options(&self) -> SyncOptions {
        self.options
    }

    /// Run the registered task `id`.
    pub async fn do_sync(&self, id: &str) -> Result<SyncRun, SyncFailure> {
        let task = self
            .tasks
            .get(id)
            .ok_or_else(|| SyncError::TaskNotFound(id.to_string()))?;
        self.run(&task).await
    }

    /// Run `task`; any failure, including `after_sync`, is an `Err`.
    pub async fn run(&self, task: &SyncTask) -> Result<SyncRun, SyncFailure> {
        self.run_report(task).await?.into_result()
    }

    /// Run `task`, returning `Err` only when no page could start.
    ///
    /// Page and `after_sync` failures are reported inside the [`SyncRun`].
    pub async fn run_report(&self, task: &SyncTask) -> Result<SyncRun, SyncFailure> {
        let run_id = RunId::at(self.clock.as_ref());
        let span = tracing::info_span!("sync", task = %task.id, run = %run_id);
        self.execute(task, run_id).instrument(span).await
    }

    async fn execute(&self, task: &SyncTask, run_id: RunId) -> Result<SyncRun, SyncFailure> {
        let result = self.execute_inner(task, run_id).await;
        if let Err(failure) = &result {
            tracing::error!(total = failure.total, error = %failure.error, "sync aborted");
        }
        result
    }

    async fn execute_inner(&self, task: &SyncTask, run_id: RunId) -> Result<SyncRun, SyncFailure> {
        task.validate().map_err(|reason| SyncError::InvalidTask {
            task: task.id.clone(),
            reason,
        })?;
        let mapping = FieldMapping::parse(&task.mapping).map_err(|source| SyncError::InvalidMapping {
            task: task.id.clone(),
            source,
        })?;

        let datasource = self
            .datasources
            .connect(&task.source)
            .await
            .map_err(|source| SyncError::Connection {
                locator: task.source.clone(),
                source,
            })?;
        let total = datasource
            .list_meta(&task.filters)
            .await
            .map_err(SyncError::Meta)?
            .total;

        let mut meta = SyncMeta::new(total);
        if total == 0 {
            meta.start();
            meta.succeed();
            tracing::info!("source is empty, nothing to sync");
            return Ok(SyncRun {
                run_id,
                task: task.id.clone(),
                meta,
                counts: PageCounts::default(),
                after_sync_error: None,
            });
        }

        let target = self
            .targets
            .get(&task.target)
            .ok_or_else(|| SyncFailure::new(total, SyncError::TargetNotFound(task.target.clone())))?;

        if let Err(e) = target.before_sync(&task.target_config, &mut meta).await {
            let error = SyncError::BeforeSync(e);
            meta.fail(error.clone());
            return Err(SyncFailure::new(total, error));
        }
        meta.start();

        let pages = page_count(total, task.size);
        tracing::info!(
            total,
            pages,
            version = meta.version,
            workers = task.workers,
            "sync started"
        );

        let job = Arc::new(PageSync {
            datasource,
            target: Arc::clone(&target),
            config: task.target_config.clone(),
            meta: meta.clone(),
            mapping,
            resolvers: Arc::clone(&self.resolvers),
            filters: task.filters.clone(),
            orders: task.orders.clone(),
            size: task.size,
            jitter: (self.options.jitter_min_ms, self.options.jitter_max_ms),
        });
        let tally = Arc::new(PageTally::default());
        let (errors_tx, mut errors_rx) = mpsc::channel(task.workers);
        let pool = PagePool::spawn(
            PoolConfig {
                workers: task.workers,
                backlog: self.options.backlog,
                pages,
                stop_on_error: task.stop_on_error,
            },
            job,
            Arc::clone(&tally),
            errors_tx,
        );

        let (shutdown, drained) = pool.into_parts();
        tokio::pin!(drained);
        let failure = tokio::select! {
            biased;
            Some(error) = errors_rx.recv() => Some(error),
            () = &mut drained => None,
        };

        match failure {
            Some(error) => {
                tracing::error!(error = %error, "page failed, stopping run");
                meta.fail(error);
                shutdown.request();
                drained.await;
            }
            None => {
                meta.succeed();
            }
        }

        let counts = tally.snapshot(pages);
        let after_sync_error = match target.after_sync(&task.target_config, &meta).await {
            Ok(()) => None,
            Err(e) => {
                let error = SyncError::AfterSync(e);
                tracing::error!(error = %error, "after_sync failed");
                Some(error)
            }
        };

        tracing::info!(
            status = ?meta.status(),
            synced = counts.synced,
            empty = counts.empty,
            failed = counts.failed,
            dropped = counts.dropped,
            skipped = counts.skipped,
            rows = counts.rows_written,
            "sync finished"
        );

        Ok(SyncRun {
            run_id,
            task: task.id.clone(),
            meta,
            counts,
            after_sync_error,
        })
    }
}

/// One run's page job: fetch, map, pause, write.
struct PageSync {
    datasource: Arc<dyn Datasource>,
    target: Arc<dyn Target>,
    config: TargetConfig,
    meta: SyncMeta,
    mapping: FieldMapping,
    resolvers: Arc<ResolverRegistry>,
    filters: Vec<Filter>,
    orders: Vec<Order>,
    size: u64,
    jitter: (u64, u64),
}

impl PageSync {
    fn jitter(&self) -> Duration {
        let (min, max) = self.jitter;
        let ms = if max > min {
            rand::thread_rng().gen_range(min..=max)
        } else {
            min
        };
        Duration::from_millis(ms)
    }
}

#[async_trait]
impl PageJob for PageSync {
    async fn run_page(&self, page: u64) -> Result<PageOutcome, SyncError> {
        let options = ListOptions {
            page,
            limit: self.size,
            without_meta: true,
            filters: self.filters.clone(),
            orders: self.orders.clone(),
            ..ListOptions::default()
        };
        let listed = self
            .datasource
            .list(options)
            .await
            .map_err(|source| SyncError::PageFetch { page, source })?;
        if listed.rows.is_empty() {
            return Ok(PageOutcome::Empty);
        }

        // マッピング未指定なら取得した行をそのまま書き込む
        let rows = if self.mapping.is_empty() {
            listed.rows
        } else {
            listed
                .rows
                .iter()
                .map(|row| self.mapping.apply(row, &self.resolvers))
                .collect()
        };
        let written = rows.len() as u64;

        let pause = self.jitter();
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }

        self.target
            .sync_from(&self.config, rows, &self.meta)
            .await
            .map_err(|source| SyncError::PageWrite { page, source })?;
        Ok(PageOutcome::Synced(written))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Filter, FilterOp, Row, SyncStatus, Value, row};
    use crate::impls::{MemoryConnector, MemoryTarget};
    use crate::ports::{DatasourceError, TargetError};
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Target that counts hook calls and can fail on demand.
    #[derive(Default)]
    struct SpyTarget {
        inner: MemoryTarget,
        before: AtomicUsize,
        pages: AtomicUsize,
        after: AtomicUsize,
        fail_pages: bool,
        /// Fail only the page carrying this id.
        fail_on_id: Option<i64>,
        panic_pages: bool,
        fail_before: bool,
        fail_after: bool,
    }

    #[async_trait]
    impl Target for SpyTarget {
        async fn before_sync(&self, config: &TargetConfig, meta: &mut SyncMeta) -> Result<(), TargetError> {
            self.before.fetch_add(1, Ordering::SeqCst);
            if self.fail_before {
                return Err(TargetError::Version("no version table".into()));
            }
            self.inner.before_sync(config, meta).await
        }

        async fn sync_from(
            &self,
            config: &TargetConfig,
            rows: Vec<Row>,
            meta: &SyncMeta,
        ) -> Result<(), TargetError> {
            self.pages.fetch_add(1, Ordering::SeqCst);
            if self.panic_pages {
                panic!("target crashed");
            }
            let hit = self
                .fail_on_id
                .is_some_and(|id| rows.iter().any(|r| r.get("id") == Some(&Value::Int(id))));
            if self.fail_pages || hit {
                return Err(TargetError::Write("disk full".into()));
            }
            self.inner.sync_from(config, rows, meta).await
        }

        async fn after_sync(&self, config: &TargetConfig, meta: &SyncMeta) -> Result<(), TargetError> {
            self.after.fetch_add(1, Ordering::SeqCst);
            if self.fail_after {
                return Err(TargetError::Write("cleanup failed".into()));
            }
            self.inner.after_sync(config, meta).await
        }
    }

    fn users(n: i64) -> Vec<Row> {
        (1..=n)
            .map(|i| row([("id", Value::from(i)), ("name", Value::from(format!(" user{i} ")))]))
            .collect()
    }

    fn fixture(rows: Vec<Row>, target: Arc<dyn Target>) -> Syncer {
        let connector = Arc::new(MemoryConnector::new());
        connector.store("crm").insert_table("users", rows);

        let datasources = Arc::new(DatasourceRegistry::new());
        datasources.register("memory", connector);
        let targets = Arc::new(TargetRegistry::new());
        targets.register("default", target);

        Syncer::new(datasources, targets, Arc::new(ResolverRegistry::new()))
            .with_options(SyncOptions::without_jitter())
    }

    fn task() -> SyncTask {
        SyncTask::new("users", "memory://crm/users", "default")
            .with_mapping("id", "id")
            .with_mapping("name", "name|trim")
            .with_target_config(serde_json::json!({
                "table": "users",
                "uniques": ["id"],
                "version_field": "version",
                "sync_status_field": "active",
            }))
    }

    #[rstest]
    #[case(95, 20, 5)]
    #[case(100, 20, 5)]
    #[case(1, 100, 1)]
    #[case(0, 20, 0)]
    fn pages_round_up(#[case] total: u64, #[case] size: u64, #[case] pages: u64) {
        assert_eq!(page_count(total, size), pages);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn syncs_every_page() {
        let target = Arc::new(MemoryTarget::new());
        let syncer = fixture(users(95), target.clone());

        let run = syncer.run(&task().with_paging(20, 3)).await.unwrap();

        assert_eq!(run.total(), 95);
        assert_eq!(run.status(), SyncStatus::Success);
        assert_eq!(run.counts.pages, 5);
        assert_eq!(run.counts.synced, 5);
        assert_eq!(run.counts.rows_written, 95);

        let rows = target.rows("users");
        assert_eq!(rows.len(), 95);
        let first = rows.iter().find(|r| r["id"] == Value::Int(1)).unwrap();
        assert_eq!(first["name"], Value::from("user1"));
        assert_eq!(first["version"], Value::Int(1));
    }

    #[tokio::test]
    async fn versions_increase_across_runs() {
        let target = Arc::new(MemoryTarget::new());
        let syncer = fixture(users(30), target.clone());
        let task = task().with_paging(10, 2);

        let first = syncer.run(&task).await.unwrap();
        let second = syncer.run(&task).await.unwrap();

        assert_eq!(first.meta.version, 1);
        assert_eq!(second.meta.version, 2);
        let rows = target.rows("users");
        assert_eq!(rows.len(), 30);
        assert!(rows.iter().all(|r| r["version"] == Value::Int(2)));
        assert!(rows.iter().all(|r| r["active"] == Value::Int(1)));
    }

    #[tokio::test]
    async fn rows_missing_from_a_later_run_become_inactive() {
        let target = Arc::new(MemoryTarget::new());
        let syncer = fixture(users(10), target.clone());
        syncer.run(&task()).await.unwrap();

        let shrunk = task().with_filter(Filter::new("id", FilterOp::Le, Value::Int(5)));
        syncer.run(&shrunk).await.unwrap();

        let rows = target.rows("users");
        let active = rows.iter().filter(|r| r["active"] == Value::Int(1)).count();
        assert_eq!(active, 5);
        assert_eq!(rows.len(), 10);
    }

    #[tokio::test]
    async fn stop_on_error_fails_the_run_and_cleans_up_once() {
        let target = Arc::new(SpyTarget {
            fail_pages: true,
            ..SpyTarget::default()
        });
        let syncer = fixture(users(50), target.clone());
        let task = task().with_paging(10, 2).stop_on_error(true);

        let run = syncer.run_report(&task).await.unwrap();

        assert_eq!(run.status(), SyncStatus::Failed);
        assert!(matches!(run.meta.error(), Some(SyncError::PageWrite { .. })));
        assert_eq!(target.after.load(Ordering::SeqCst), 1);
        assert!(run.counts.failed >= 1);
        assert_eq!(
            run.counts.failed + run.counts.skipped + run.counts.synced,
            5
        );

        let failure = syncer.run(&task).await.unwrap_err();
        assert_eq!(failure.total, 50);
        assert!(matches!(failure.error, SyncError::PageWrite { .. }));
    }

    #[tokio::test]
    async fn single_failing_page_fails_the_run() {
        let target = Arc::new(SpyTarget {
            fail_on_id: Some(25),
            ..SpyTarget::default()
        });
        let syncer = fixture(users(50), target.clone());
        let task = task().with_paging(10, 2).stop_on_error(true);

        let run = syncer.run_report(&task).await.unwrap();

        assert_eq!(run.status(), SyncStatus::Failed);
        assert!(matches!(run.meta.error(), Some(SyncError::PageWrite { page: 3, .. })));
        assert_eq!(run.counts.failed, 1);
        assert_eq!(
            run.counts.failed + run.counts.skipped + run.counts.synced,
            5
        );
        assert_eq!(target.after.load(Ordering::SeqCst), 1);
        assert!(target.inner.rows("users").iter().all(|r| r["id"] != Value::Int(25)));
    }

    #[tokio::test]
    async fn panicking_target_fails_the_run() {
        let target = Arc::new(SpyTarget {
            panic_pages: true,
            ..SpyTarget::default()
        });
        let syncer = fixture(users(30), target.clone());
        let task = task().with_paging(10, 1).stop_on_error(true);

        let run = syncer.run_report(&task).await.unwrap();

        assert_eq!(run.status(), SyncStatus::Failed);
        assert!(matches!(run.meta.error(), Some(SyncError::PagePanic { .. })));
        assert_eq!(run.counts.failed, 1);
        assert_eq!(target.after.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_target_pages_are_dropped_without_stop_on_error() {
        let target = Arc::new(SpyTarget {
            panic_pages: true,
            ..SpyTarget::default()
        });
        let syncer = fixture(users(30), target.clone());

        let run = syncer.run(&task().with_paging(10, 2)).await.unwrap();

        assert_eq!(run.counts.dropped, 3);
        assert_eq!(run.counts.skipped, 0);
        assert_eq!(target.pages.load(Ordering::SeqCst), 3);
        assert_eq!(target.after.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bad_time_format_aborts_before_any_page() {
        let target = Arc::new(MemoryTarget::new());
        let syncer = fixture(users(30), target.clone());
        let task = task().with_paging(10, 2).with_target_config(serde_json::json!({
            "table": "users",
            "sync_time_field": "synced_at",
            "sync_time_fmt": "%Q",
        }));

        let failure = syncer.run(&task).await.unwrap_err();

        assert_eq!(failure.total, 30);
        assert!(matches!(
            failure.error,
            SyncError::BeforeSync(TargetError::Config(_))
        ));
        assert!(target.rows("users").is_empty());
    }

    #[tokio::test]
    async fn page_errors_are_dropped_without_stop_on_error() {
        let target = Arc::new(SpyTarget {
            fail_pages: true,
            ..SpyTarget::default()
        });
        let syncer = fixture(users(50), target.clone());

        let run = syncer.run(&task().with_paging(10, 2)).await.unwrap();

        assert_eq!(run.status(), SyncStatus::Success);
        assert_eq!(run.counts.dropped, 5);
        assert_eq!(target.pages.load(Ordering::SeqCst), 5);
        assert_eq!(target.after.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_source_leaves_target_untouched() {
        let target = Arc::new(SpyTarget::default());
        let syncer = fixture(Vec::new(), target.clone());

        let run = syncer.run(&task()).await.unwrap();

        assert_eq!(run.total(), 0);
        assert_eq!(run.status(), SyncStatus::Success);
        assert_eq!(target.before.load(Ordering::SeqCst), 0);
        assert_eq!(target.after.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn before_sync_failure_aborts_with_total() {
        let target = Arc::new(SpyTarget {
            fail_before: true,
            ..SpyTarget::default()
        });
        let syncer = fixture(users(7), target.clone());

        let failure = syncer.run(&task()).await.unwrap_err();

        assert_eq!(failure.total, 7);
        assert!(matches!(failure.error, SyncError::BeforeSync(_)));
        assert_eq!(target.pages.load(Ordering::SeqCst), 0);
        assert_eq!(target.after.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn after_sync_failure_keeps_success_status() {
        let target = Arc::new(SpyTarget {
            fail_after: true,
            ..SpyTarget::default()
        });
        let syncer = fixture(users(3), target.clone());

        let run = syncer.run_report(&task()).await.unwrap();
        assert_eq!(run.status(), SyncStatus::Success);
        assert!(matches!(run.error(), Some(SyncError::AfterSync(_))));

        let failure = syncer.run(&task()).await.unwrap_err();
        assert_eq!(failure.total, 3);
    }

    #[tokio::test]
    async fn setup_errors() {
        let syncer = fixture(users(3), Arc::new(MemoryTarget::new()));

        let unknown_scheme = SyncTask::new("x", "mysql://db/users", "default");
        let err = syncer.run(&unknown_scheme).await.unwrap_err();
        assert_eq!(err.total, 0);
        assert!(matches!(
            err.error,
            SyncError::Connection { source: DatasourceError::UnregisteredScheme(_), .. }
        ));

        let unknown_target = SyncTask::new("x", "memory://crm/users", "warehouse");
        let err = syncer.run(&unknown_target).await.unwrap_err();
        assert_eq!(err.total, 3);
        assert_eq!(err.error, SyncError::TargetNotFound("warehouse".into()));

        let bad_mapping = task().with_mapping("email", "|trim");
        let err = syncer.run(&bad_mapping).await.unwrap_err();
        assert!(matches!(err.error, SyncError::InvalidMapping { .. }));

        let bad_paging = task().with_paging(0, 1);
        let err = syncer.run(&bad_paging).await.unwrap_err();
        assert!(matches!(err.error, SyncError::InvalidTask { .. }));
    }

    #[tokio::test]
    async fn do_sync_looks_up_registered_tasks() {
        let target = Arc::new(MemoryTarget::new());
        let syncer = fixture(users(4), target.clone());
        syncer.tasks().add([task()]);

        let run = syncer.do_sync("users").await.unwrap();
        assert_eq!(run.counts.rows_written, 4);

        let err = syncer.do_sync("missing").await.unwrap_err();
        assert_eq!(err.error, SyncError::TaskNotFound("missing".into()));
    }

    #[tokio::test]
    async fn unmapped_task_writes_source_rows() {
        let target = Arc::new(MemoryTarget::new());
        let syncer = fixture(users(2), target.clone());
        let task = SyncTask::new("raw", "memory://crm/users", "default")
            .with_target_config(serde_json::json!({"table": "raw"}));

        syncer.run(&task).await.unwrap();

        let rows = target.rows("raw");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], Value::from(" user1 "));
    }
}
