//! The `quizsync save` command.

use std::path::PathBuf;

use anyhow::Result;

use quizsync_core::model::{AttemptRecord, QuestionId};

pub async fn execute(
    score: u32,
    total: u32,
    subject: String,
    time_spent: u32,
    mistakes: Option<String>,
    user: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let store = super::open_store(config_path.as_deref())?;

    // Finish the sign-in sweep first so it cannot race the save below.
    if let Some(user) = &user {
        super::sign_in(&store, user).await;
    }

    let record = AttemptRecord::new(score, total, subject)
        .with_time_spent(time_spent)
        .with_mistakes(parse_mistakes(mistakes.as_deref()));
    let id = record.id;
    let subject = record.subject.clone();

    store.save_result(record).await?;

    println!(
        "Saved attempt {id} ({score}/{total}, {subject}) in {} mode",
        store.mode()
    );
    Ok(())
}

fn parse_mistakes(raw: Option<&str>) -> Vec<QuestionId> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(QuestionId::from)
            .collect()
    })
    .unwrap_or_default()
}
