//! Subcommand implementations.

pub mod fetch;
pub mod history;
pub mod init;
pub mod remote_stats;
pub mod save;
pub mod stats;
pub mod sync;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use quizsync_core::model::UserId;
use quizsync_core::store::{ResultStore, SyncReport};
use quizsync_remote::config::load_config_from;
use quizsync_remote::{create_question_source, create_remote};
use quizsync_storage::FileStorage;

/// Build the store from the loaded configuration.
pub(crate) fn open_store(config_path: Option<&Path>) -> Result<Arc<ResultStore>> {
    let config = load_config_from(config_path)?;

    let storage = FileStorage::open(&config.data_dir).with_context(|| {
        format!(
            "failed to open data directory: {}",
            config.data_dir.display()
        )
    })?;

    let store = ResultStore::new(Arc::new(storage), config.store_config())
        .with_remote(create_remote(&config)?)
        .with_question_source(create_question_source(&config)?);

    Ok(Arc::new(store))
}

/// Sign in and wait for the sweep the sign-in launches.
///
/// Returns `None` when the store has no remote and stays local.
pub(crate) async fn sign_in(store: &Arc<ResultStore>, user: &str) -> Option<SyncReport> {
    let sweep = store.on_auth_change(Some(UserId::new(user)))?;
    match sweep.await {
        Ok(Ok(report)) => Some(report),
        // The sweep logs its own failure.
        Ok(Err(_)) => None,
        Err(e) => {
            warn!(error = %e, "sync task did not complete");
            None
        }
    }
}
