use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};

use super::build_syncer;

/// Execute the `run` command: run one task and print its summary and the
/// resulting target tables.
pub async fn execute(id: &str, tasks: &Path, fixtures: Option<&Path>) -> Result<()> {
    let (syncer, target) = build_syncer(tasks, fixtures)?;
    let task = syncer
        .tasks()
        .get(id)
        .with_context(|| format!("Task not found: {id}"))?;

    let run = syncer.run_report(&task).await?;

    let tables: BTreeMap<String, _> = target
        .table_names()
        .into_iter()
        .map(|name| {
            let rows = target.rows(&name);
            (name, rows)
        })
        .collect();
    let output = serde_json::json!({
        "run": run.summary(),
        "tables": tables,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    match run.error() {
        Some(error) => anyhow::bail!("Sync failed: {error}"),
        None => Ok(()),
    }
}
