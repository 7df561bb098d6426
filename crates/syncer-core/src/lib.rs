//! syncer-core
//!
//! Paginated extract, transform and load between pluggable datasources and
//! versioning targets.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（Value, Row, Filter, SyncTask, SyncMeta, RunId）
//! - **ports**: 抽象化レイヤー（Datasource, Connector, Target, SchedulePrimitive, Clock）
//! - **registry**: scheme / 名前 / id で引く登録簿
//! - **resolve**: 値変換とフィールドマッピング
//! - **app**: オーケストレーション（SyncerBuilder, Syncer, Scheduler）
//! - **impls**: 開発用実装（MemoryConnector, MemoryTarget, TokioScheduler）
//! - **config**: タスクファイルと実行オプション

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod registry;
pub mod resolve;

pub use app::{BuildError, PageCounts, Scheduler, SyncRun, Syncer, SyncerBuilder};
pub use config::{ConfigError, SyncOptions};
pub use error::{SyncError, SyncFailure};
