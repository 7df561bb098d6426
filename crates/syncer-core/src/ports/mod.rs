//! Ports - 抽象化レイヤー
//!
//! 外部システム（データ取得元・書き込み先・スケジューラ・時計）への
//! インターフェースを定義し、実装の詳細を隠蔽する。
//! 開発用の実装は `impls` にある。

pub mod clock;
pub mod datasource;
pub mod schedule;
pub mod target;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::datasource::{
    Connector, Datasource, DatasourceError, ListMeta, ListOptions, ListResult,
};
pub use self::schedule::{Job, JobFuture, ScheduleError, SchedulePrimitive};
pub use self::target::{Target, TargetError};
