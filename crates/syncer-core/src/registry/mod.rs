//! Registries - 名前で引く実装の登録簿
//!
//! All registries are explicit objects created at startup and handed to the
//! orchestrator; nothing is registered through process-wide globals.

pub mod datasource;
pub mod target;
pub mod task;

pub use self::datasource::{DatasourceRegistry, parse_locator};
pub use self::target::TargetRegistry;
pub use self::task::TaskRegistry;
