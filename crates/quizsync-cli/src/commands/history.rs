//! The `quizsync history` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

pub fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let store = super::open_store(config_path.as_deref())?;
    let history = store.history()?;

    if history.is_empty() {
        println!("No attempts recorded yet.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Id", "When", "Subject", "Score", "Minutes", "Synced"]);
    for record in &history {
        let id = record.id.to_string();
        table.add_row(vec![
            Cell::new(&id[..8]),
            Cell::new(record.timestamp.format("%Y-%m-%d %H:%M")),
            Cell::new(&record.subject),
            Cell::new(format!("{}/{}", record.score, record.total)),
            Cell::new(record.time_spent),
            Cell::new(if record.synced { "yes" } else { "no" }),
        ]);
    }
    println!("{table}");
    println!("{} attempt(s)", history.len());

    Ok(())
}
