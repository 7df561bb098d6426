use std::path::Path;

use anyhow::{Context, Result};
use syncer_core::app::IntervalSpec;
use syncer_core::config;
use syncer_core::domain::SyncTask;

/// Execute the `check` command: validate every task in the file.
pub fn execute(tasks_path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(tasks_path)
        .with_context(|| format!("Failed to read tasks: {}", tasks_path.display()))?;
    let tasks: Vec<SyncTask> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse tasks: {}", tasks_path.display()))?;

    let failed = check_tasks(&tasks);
    if failed == 0 {
        println!("\nAll {} task(s) passed.", tasks.len());
        Ok(())
    } else {
        anyhow::bail!("{failed} problem(s) found in task file")
    }
}

/// Print one line per task and return how many problems were found.
///
/// A repeated id counts once on top of the per-task results.
fn check_tasks(tasks: &[SyncTask]) -> usize {
    let mut failed = 0;
    for task in tasks {
        match config::validate_task(task) {
            Ok(()) => println!("{:18} OK ({})", format!("{}:", task.id), describe_schedule(task)),
            Err(e) => {
                failed += 1;
                println!("{:18} FAILED", format!("{}:", task.id));
                println!("  {e}");
            }
        }
    }
    for id in config::duplicate_ids(tasks) {
        failed += 1;
        println!("{:18} FAILED", format!("{id}:"));
        println!("  {}", config::ConfigError::DuplicateId(id));
    }
    failed
}

fn describe_schedule(task: &SyncTask) -> String {
    let interval = match task.interval().map(IntervalSpec::parse) {
        Some(Ok(IntervalSpec::Days(n))) => match task.at.as_deref() {
            Some(at) => format!("every {n}d at {at}"),
            None => format!("every {n}d"),
        },
        Some(Ok(IntervalSpec::Forward(interval))) => format!("every {interval}"),
        Some(Err(_)) | None => "manual".to_string(),
    };
    if task.immediately {
        format!("{interval}, immediately")
    } else {
        interval
    }
}
