//! Target port - バージョン付き upsert の書き込み先
//!
//! The orchestrator drives one run through three hooks:
//! 1. `before_sync` assigns `meta.version` (typically max recorded + 1)
//! 2. `sync_from` stamps and upserts one page of mapped rows
//! 3. `after_sync` marks stale versions inactive and prunes old history

use async_trait::async_trait;

use crate::domain::{Row, SyncMeta, TargetConfig};

/// Errors raised by targets.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TargetError {
    #[error("invalid target config: {0}")]
    Config(String),

    #[error("version lookup failed: {0}")]
    Version(String),

    #[error("write failed: {0}")]
    Write(String),
}

impl From<serde_json::Error> for TargetError {
    fn from(e: serde_json::Error) -> Self {
        TargetError::Config(e.to_string())
    }
}

/// Sink for mapped rows.
///
/// One instance serves every run that names it; `sync_from` is called
/// concurrently by page workers.
#[async_trait]
pub trait Target: Send + Sync {
    async fn before_sync(&self, config: &TargetConfig, meta: &mut SyncMeta) -> Result<(), TargetError>;

    async fn sync_from(
        &self,
        config: &TargetConfig,
        rows: Vec<Row>,
        meta: &SyncMeta,
    ) -> Result<(), TargetError>;

    async fn after_sync(&self, config: &TargetConfig, meta: &SyncMeta) -> Result<(), TargetError>;
}
