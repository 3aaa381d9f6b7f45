//! The `quizsync fetch` command.

use std::path::PathBuf;

use anyhow::Result;

pub async fn execute(bank: String, config_path: Option<PathBuf>) -> Result<()> {
    let store = super::open_store(config_path.as_deref())?;
    // Failures are logged by the store and come back as an empty array.
    let questions = store.fetch_questions(&bank).await;
    println!("{}", serde_json::to_string_pretty(&questions)?);
    Ok(())
}
