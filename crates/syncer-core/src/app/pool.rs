//! PagePool - ページ単位のワーカープール
//!
//! - feeder が 1..=pages を bounded な backlog に積む
//! - `workers` 本のワーカーが backlog からページを取り出して処理する
//! - shutdown 要求後は新しいページを取らない（処理中のページは最後まで走る）
//! - ページ処理は個別の task で走らせ、panic もページの失敗として数える

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::error::SyncError;

use super::report::PageTally;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PageOutcome {
    Empty,
    Synced(u64),
}

/// Work done for one page.
#[async_trait]
pub(crate) trait PageJob: Send + Sync {
    async fn run_page(&self, page: u64) -> Result<PageOutcome, SyncError>;
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PoolConfig {
    pub workers: usize,
    pub backlog: usize,
    pub pages: u64,
    /// Report page errors on the error channel instead of dropping them.
    pub stop_on_error: bool,
}

impl PoolConfig {
    fn worker_count(&self) -> usize {
        let pages = usize::try_from(self.pages).unwrap_or(usize::MAX);
        self.workers.min(pages).max(1)
    }
}

/// Running pool. Call [`PagePool::into_parts`] to drive it.
pub(crate) struct PagePool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

/// Stops workers from taking new pages.
pub(crate) struct PoolShutdown(watch::Sender<bool>);

impl PoolShutdown {
    pub fn request(&self) {
        // ワーカーが全員終わっていれば受信側はもういない
        let _ = self.0.send(true);
    }
}

impl PagePool {
    /// Spawn the feeder and up to `config.workers` workers on the current
    /// runtime, never more workers than pages.
    ///
    /// The first reported error (if any) arrives on `errors`; the channel
    /// never blocks a worker.
    pub fn spawn(
        config: PoolConfig,
        job: Arc<dyn PageJob>,
        tally: Arc<PageTally>,
        errors: mpsc::Sender<SyncError>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (page_tx, page_rx) = mpsc::channel(config.backlog.max(1));
        let page_rx = Arc::new(Mutex::new(page_rx));
        let errors = config.stop_on_error.then_some(errors);

        let workers = config.worker_count();

        let mut joins = Vec::with_capacity(workers + 1);
        joins.push(tokio::spawn(
            feed(config.pages, page_tx, shutdown_rx.clone()).in_current_span(),
        ));
        for worker_id in 0..workers {
            let worker = page_worker(
                worker_id,
                Arc::clone(&page_rx),
                Arc::clone(&job),
                Arc::clone(&tally),
                errors.clone(),
                shutdown_rx.clone(),
            );
            joins.push(tokio::spawn(worker.in_current_span()));
        }

        Self { shutdown_tx, joins }
    }

    /// Split into the shutdown switch and a future resolving once the feeder
    /// and every worker have exited.
    pub fn into_parts(self) -> (PoolShutdown, impl Future<Output = ()> + Send) {
        let joins = self.joins;
        let drained = async move {
            for join in joins {
                if let Err(e) = join.await {
                    tracing::error!(error = %e, "page worker aborted");
                }
            }
        };
        (PoolShutdown(self.shutdown_tx), drained)
    }
}

async fn feed(pages: u64, page_tx: mpsc::Sender<u64>, mut shutdown_rx: watch::Receiver<bool>) {
    for page in 1..=pages {
        if *shutdown_rx.borrow() {
            break;
        }
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            sent = page_tx.send(page) => {
                // ワーカーが全滅している
                if sent.is_err() {
                    break;
                }
            }
        }
    }
}

async fn next_page(queue: &Mutex<mpsc::Receiver<u64>>) -> Option<u64> {
    queue.lock().await.recv().await
}

/// Run one page on its own task so a panic in the job surfaces as an error
/// instead of killing the worker.
async fn run_isolated(job: Arc<dyn PageJob>, page: u64) -> Result<PageOutcome, SyncError> {
    let join = tokio::spawn(async move { job.run_page(page).await }.in_current_span());
    match join.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(SyncError::PagePanic {
            page,
            reason: panic_reason(e.into_panic()),
        }),
        Err(e) => Err(SyncError::PagePanic {
            page,
            reason: e.to_string(),
        }),
    }
}

fn panic_reason(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map_or_else(|| "unknown panic".to_string(), |s| (*s).to_string()),
    }
}

async fn page_worker(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::Receiver<u64>>>,
    job: Arc<dyn PageJob>,
    tally: Arc<PageTally>,
    errors: Option<mpsc::Sender<SyncError>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let page = tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            page = next_page(&queue) => page,
        };
        let Some(page) = page else {
            break;
        };

        match run_isolated(Arc::clone(&job), page).await {
            Ok(PageOutcome::Empty) => {
                tally.empty();
                tracing::debug!(worker_id, page, "empty page");
            }
            Ok(PageOutcome::Synced(rows)) => {
                tally.synced(rows);
                tracing::debug!(worker_id, page, rows, "page synced");
            }
            Err(error) => match &errors {
                Some(errors) => {
                    tally.failed();
                    tracing::debug!(worker_id, page, error = %error, "page failed");
                    // 先着 1 件だけ届けば十分なので満杯なら捨てる
                    let _ = errors.try_send(error);
                }
                None => {
                    tally.dropped();
                    tracing::warn!(worker_id, page, error = %error, "page dropped");
                }
            },
        }
    }
}
