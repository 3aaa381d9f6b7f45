//! The `quizsync stats` command.

use std::path::PathBuf;

use anyhow::{bail, Result};
use comfy_table::{Cell, Table};

use quizsync_core::model::StudyStats;
use quizsync_core::statistics::SubjectStats;

pub fn execute(format: String, by_subject: bool, config_path: Option<PathBuf>) -> Result<()> {
    let store = super::open_store(config_path.as_deref())?;
    let stats = store.get_stats()?;
    let subjects = if by_subject {
        store.subject_breakdown()?
    } else {
        Vec::new()
    };

    match format.as_str() {
        "json" => {
            let output = if by_subject {
                serde_json::json!({ "stats": stats, "subjects": subjects })
            } else {
                serde_json::to_value(stats)?
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        "text" => {
            println!("{}", stats_table(&stats));
            if by_subject {
                println!();
                println!("{}", subject_table(&subjects));
            }
        }
        other => bail!("unknown format: {other} (expected text or json)"),
    }

    Ok(())
}

fn stats_table(stats: &StudyStats) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec![
        Cell::new("Total questions"),
        Cell::new(stats.total_questions),
    ]);
    table.add_row(vec![
        Cell::new("Accuracy"),
        Cell::new(format!("{}%", stats.accuracy)),
    ]);
    table.add_row(vec![Cell::new("Study hours"), Cell::new(stats.study_hours)]);
    table.add_row(vec![Cell::new("Attempts"), Cell::new(stats.history_count)]);
    table
}

fn subject_table(subjects: &[SubjectStats]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Subject", "Attempts", "Questions", "Correct", "Accuracy"]);
    for s in subjects {
        table.add_row(vec![
            Cell::new(&s.subject),
            Cell::new(s.attempts),
            Cell::new(s.total_questions),
            Cell::new(s.total_correct),
            Cell::new(format!("{}%", s.accuracy)),
        ]);
    }
    table
}
