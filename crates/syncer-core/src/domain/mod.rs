//! Domain model (rows, filters, tasks, run state).

pub mod filter;
pub mod ids;
pub mod meta;
pub mod task;
pub mod value;

pub use filter::{Direction, Filter, FilterOp, FilterValue, Order};
pub use ids::RunId;
pub use meta::{SyncMeta, SyncStatus};
pub use task::{SyncTask, TargetConfig};
pub use value::{Row, Value, row};
