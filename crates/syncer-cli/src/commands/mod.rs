pub mod check;
pub mod run;
pub mod schedule;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use syncer_core::impls::{MemoryConnector, MemoryTarget};
use syncer_core::{Syncer, SyncerBuilder, config};

use crate::fixtures::Fixtures;

/// Name under which the in-memory target is registered.
pub const DEFAULT_TARGET: &str = "default";

/// Syncer wired with the in-memory datasource and target.
pub fn build_syncer(tasks: &Path, fixtures: Option<&Path>) -> Result<(Syncer, Arc<MemoryTarget>)> {
    let tasks = config::load_tasks(tasks)
        .with_context(|| format!("Failed to load tasks: {}", tasks.display()))?;

    let connector = Arc::new(MemoryConnector::new());
    Fixtures::load_optional(fixtures)?.seed(&connector);
    let target = Arc::new(MemoryTarget::new());

    let syncer = SyncerBuilder::new()
        .datasource("memory", connector)
        .target(DEFAULT_TARGET, target.clone())
        .tasks(tasks)
        .build()?;
    Ok((syncer, target))
}
