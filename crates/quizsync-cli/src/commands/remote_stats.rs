//! The `quizsync remote-stats` command.

use std::path::PathBuf;

use anyhow::{bail, Result};
use comfy_table::{Cell, Table};

use quizsync_core::statistics::accuracy_percent;

pub async fn execute(user: String, config_path: Option<PathBuf>) -> Result<()> {
    let store = super::open_store(config_path.as_deref())?;
    if !store.has_remote() {
        bail!("no usable remote store configured; add a [remote] table to quizsync.toml");
    }

    super::sign_in(&store, &user).await;

    let Some(aggregate) = store.remote_stats().await else {
        println!("No remote statistics for {user}.");
        return Ok(());
    };

    let mut table = Table::new();
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec![
        Cell::new("Total questions"),
        Cell::new(aggregate.total_questions),
    ]);
    table.add_row(vec![
        Cell::new("Total correct"),
        Cell::new(aggregate.total_correct),
    ]);
    table.add_row(vec![
        Cell::new("Accuracy"),
        Cell::new(format!(
            "{}%",
            accuracy_percent(aggregate.total_correct, aggregate.total_questions)
        )),
    ]);
    table.add_row(vec![
        Cell::new("Last active"),
        Cell::new(
            aggregate
                .last_active
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "never".to_string()),
        ),
    ]);
    println!("Remote statistics for {user}:");
    println!("{table}");
    Ok(())
}
