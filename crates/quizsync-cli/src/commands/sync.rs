//! The `quizsync sync` command.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use comfy_table::{Cell, Table};

use quizsync_core::model::UserId;

pub async fn execute(user: String, config_path: Option<PathBuf>) -> Result<()> {
    let store = super::open_store(config_path.as_deref())?;

    let Some(sweep) = store.on_auth_change(Some(UserId::new(&user))) else {
        bail!("no usable remote store configured; add a [remote] table to quizsync.toml");
    };
    let report = sweep.await.context("sync task did not complete")??;

    let mut table = Table::new();
    table.set_header(vec!["Pending", "Uploaded", "Already present", "Failed"]);
    table.add_row(vec![
        Cell::new(report.pending),
        Cell::new(report.uploaded),
        Cell::new(report.already_present),
        Cell::new(report.failed),
    ]);
    println!("Sync for {user}:");
    println!("{table}");

    if !report.is_complete() {
        bail!(
            "{} attempt(s) failed to upload and stay queued for the next sign-in",
            report.failed
        );
    }
    Ok(())
}
