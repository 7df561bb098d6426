//! Impls - 実装（開発用・テスト用）
//!
//! ports の実装を含めます。
//!
//! # 含まれる実装
//! - **MemoryConnector / MemoryDatasource**: `memory://store/table` で引けるインメモリ取得元
//! - **MemoryTarget**: バージョン管理付きのインメモリ書き込み先
//! - **TokioScheduler**: tokio タイマーによる SchedulePrimitive
//!
//! SQL やドキュメントストアなどの本番用実装は別クレートに置く想定です。

pub mod memory;
pub mod memory_target;
pub mod tokio_scheduler;

pub use self::memory::{MemoryConnector, MemoryDatasource, MemoryStore, matches_all};
pub use self::memory_target::{DEFAULT_TIME_FORMAT, MemoryTarget, MemoryTargetConfig};
pub use self::tokio_scheduler::TokioScheduler;
