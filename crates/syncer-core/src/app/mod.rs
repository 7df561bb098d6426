//! App - アプリケーション層
//!
//! ports と registry を組み合わせて同期処理を実装します。
//!
//! # 主要コンポーネント
//! - **SyncerBuilder**: レジストリとタスクのワイヤリング（fail-fast）
//! - **Syncer**: 1 回の同期 run のオーケストレーション
//! - **PagePool**: ページ単位のワーカープール
//! - **Scheduler**: タスクを SchedulePrimitive に登録

pub mod builder;
mod pool;
pub mod report;
pub mod scheduler;
pub mod syncer;

pub use self::builder::{BuildError, SyncerBuilder};
pub use self::report::{PageCounts, RunSummary, SyncRun};
pub use self::scheduler::{IntervalSpec, Scheduler, parse_at, task_tag};
pub use self::syncer::{Syncer, page_count};
