use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use syncer_core::Scheduler;
use syncer_core::impls::TokioScheduler;

use super::build_syncer;

/// Execute the `schedule` command: register every scheduled task and block
/// until Ctrl-C.
pub async fn execute(tasks: &Path, fixtures: Option<&Path>) -> Result<()> {
    let (syncer, _target) = build_syncer(tasks, fixtures)?;
    let primitive = Arc::new(TokioScheduler::new()?);
    let scheduler = Scheduler::new(Arc::new(syncer), primitive.clone());

    let scheduled = scheduler.schedule_all()?;
    if scheduled == 0 {
        println!("No task has an interval or `immediately`; nothing to schedule.");
        return Ok(());
    }
    println!("Scheduled {scheduled} task(s). Press Ctrl-C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!(tags = ?primitive.tags(), "shutting down scheduler");
    primitive.shutdown();
    Ok(())
}
