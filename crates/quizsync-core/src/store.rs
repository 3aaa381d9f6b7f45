//! The local-first result store.
//!
//! Every attempt is appended to the local history before anything else
//! happens. When a user is signed in and a remote store is available, saves
//! are mirrored remotely on a best-effort basis, and each sign-in launches a
//! single background sweep that uploads records the remote has not seen yet.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn, Instrument};
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{AggregateDelta, AggregateStats, AttemptRecord, Mode, StudyStats, UserId};
use crate::statistics::{compute_stats, compute_subject_breakdown, SubjectStats};
use crate::traits::{validate_bank_name, AppendOutcome, KeyValueStore, QuestionSource, RemoteStore};

/// Key the browser app has always used for the history array.
pub const DEFAULT_HISTORY_KEY: &str = "upsc_history";

/// Handle to a detached sync sweep.
pub type SyncTask = JoinHandle<Result<SyncReport, StoreError>>;

/// Configuration for the result store.
#[derive(Debug, Clone)]
pub struct ResultStoreConfig {
    /// Storage key holding the JSON history array.
    pub history_key: String,
    /// Maximum concurrent uploads during a sync sweep.
    pub sync_parallelism: usize,
}

impl Default for ResultStoreConfig {
    fn default() -> Self {
        Self {
            history_key: DEFAULT_HISTORY_KEY.to_string(),
            sync_parallelism: 4,
        }
    }
}

/// Summary of one sync sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Unsynced records found at the start of the sweep.
    pub pending: usize,
    /// Records newly created remotely.
    pub uploaded: usize,
    /// Records the remote already had.
    pub already_present: usize,
    /// Records whose upload failed; they stay unsynced.
    pub failed: usize,
}

impl SyncReport {
    /// Whether every pending record reached the remote.
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Debug, Default)]
struct Session {
    mode: Mode,
    user: Option<UserId>,
}

/// Owns the routing mode and the signed-in identity, and mediates every
/// access to the local history.
pub struct ResultStore {
    storage: Arc<dyn KeyValueStore>,
    remote: Option<Arc<dyn RemoteStore>>,
    questions: Option<Arc<dyn QuestionSource>>,
    config: ResultStoreConfig,
    session: RwLock<Session>,
    /// Serializes read-modify-write cycles on the history.
    write_lock: Mutex<()>,
    sweeps: AtomicU64,
}

impl ResultStore {
    /// Create a local-only store.
    pub fn new(storage: Arc<dyn KeyValueStore>, config: ResultStoreConfig) -> Self {
        Self {
            storage,
            remote: None,
            questions: None,
            config,
            session: RwLock::new(Session::default()),
            write_lock: Mutex::new(()),
            sweeps: AtomicU64::new(0),
        }
    }

    /// Make cloud mode reachable. Without a remote the store stays local
    /// whatever the auth observer reports.
    pub fn with_remote(mut self, remote: Option<Arc<dyn RemoteStore>>) -> Self {
        self.remote = remote;
        self
    }

    pub fn with_question_source(mut self, source: Arc<dyn QuestionSource>) -> Self {
        self.questions = Some(source);
        self
    }

    /// Current routing mode.
    pub fn mode(&self) -> Mode {
        self.read_session().mode
    }

    /// The signed-in user, if any.
    pub fn user(&self) -> Option<UserId> {
        self.read_session().user.clone()
    }

    /// Whether a remote store was supplied at construction.
    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Number of sync sweeps launched so far.
    pub fn sync_sweeps(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }

    // -----------------------------------------------------------------------
    // Mode management
    // -----------------------------------------------------------------------

    /// React to an identity change.
    ///
    /// Signing in switches to cloud mode and launches one sync sweep in the
    /// background; its handle is returned. Signing out switches back to local
    /// mode. Never fails.
    pub fn on_auth_change(self: &Arc<Self>, user: Option<UserId>) -> Option<SyncTask> {
        match user {
            Some(user) => {
                if self.remote.is_none() {
                    warn!(user = %user, "signed in but no remote store is configured, staying in local mode");
                    self.set_session(Mode::Local, None);
                    return None;
                }
                self.set_session(Mode::Cloud, Some(user.clone()));
                info!(user = %user, "switched to cloud mode");
                Some(self.spawn_sync(user))
            }
            None => {
                self.set_session(Mode::Local, None);
                info!("switched to local mode");
                None
            }
        }
    }

    /// Register the store's identity listener.
    ///
    /// The identity current at registration is applied immediately; the
    /// task ends when the observer is dropped.
    pub fn listen(self: &Arc<Self>, mut events: watch::Receiver<Option<UserId>>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let initial = events.borrow_and_update().clone();
            store.on_auth_change(initial);
            while events.changed().await.is_ok() {
                let user = events.borrow_and_update().clone();
                store.on_auth_change(user);
            }
            debug!("auth observer closed, listener stopped");
        })
    }

    fn spawn_sync(self: &Arc<Self>, user: UserId) -> SyncTask {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        let store = Arc::clone(self);
        let span = tracing::info_span!("sync_sweep", user = %user);
        tokio::spawn(
            async move {
                let result = store.sync_for(&user).await;
                match &result {
                    Ok(report) if report.is_complete() => info!(
                        uploaded = report.uploaded,
                        already_present = report.already_present,
                        "sync sweep finished"
                    ),
                    Ok(report) => warn!(
                        failed = report.failed,
                        pending = report.pending,
                        "sync sweep finished with failures"
                    ),
                    Err(e) => error!(error = %e, "sync sweep failed"),
                }
                result
            }
            .instrument(span),
        )
    }

    // -----------------------------------------------------------------------
    // Sync
    // -----------------------------------------------------------------------

    /// Upload every unsynced record for the signed-in user and flag the
    /// uploaded ones as synced. Does nothing in local mode.
    pub async fn sync_local_to_cloud(&self) -> Result<SyncReport, StoreError> {
        let user = {
            let session = self.read_session();
            match (&session.mode, &session.user) {
                (Mode::Cloud, Some(user)) => user.clone(),
                _ => {
                    debug!("not signed in, nothing to sync");
                    return Ok(SyncReport::default());
                }
            }
        };
        self.sync_for(&user).await
    }

    async fn sync_for(&self, user: &UserId) -> Result<SyncReport, StoreError> {
        let Some(remote) = self.remote.as_ref() else {
            return Ok(SyncReport::default());
        };

        let history = {
            let _guard = self.write_lock.lock().await;
            let (history, missing_ids) = self.read_history()?;
            // Ids handed to the remote must survive the next read.
            if missing_ids {
                self.write_history(&history)?;
            }
            history
        };

        let pending: Vec<AttemptRecord> = history.into_iter().filter(|r| !r.synced).collect();
        let mut report = SyncReport {
            pending: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            return Ok(report);
        }
        info!(count = pending.len(), "syncing records to cloud");

        let uploads: Vec<_> = pending
            .iter()
            .map(|record| async move { (record.id, remote.commit_attempt(user, record).await) })
            .collect();
        let results: Vec<(Uuid, Result<AppendOutcome, _>)> = stream::iter(uploads)
            .buffer_unordered(self.config.sync_parallelism.max(1))
            .collect()
            .await;

        let mut done = HashSet::new();
        for (id, result) in results {
            match result {
                Ok(AppendOutcome::Created) => {
                    report.uploaded += 1;
                    done.insert(id);
                }
                Ok(AppendOutcome::AlreadyPresent) => {
                    report.already_present += 1;
                    done.insert(id);
                }
                Err(e) => {
                    report.failed += 1;
                    error!(attempt = %id, error = %e, "failed to upload attempt");
                }
            }
        }

        if !done.is_empty() {
            self.mark_synced(&done).await?;
        }
        Ok(report)
    }

    async fn mark_synced(&self, ids: &HashSet<Uuid>) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let (mut history, _) = self.read_history()?;
        let mut marked = 0usize;
        for record in history.iter_mut().filter(|r| ids.contains(&r.id)) {
            record.synced = true;
            marked += 1;
        }
        if marked == 0 {
            return Ok(());
        }
        self.write_history(&history)?;
        debug!(marked, "flagged records as synced");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Save
    // -----------------------------------------------------------------------

    /// Append an attempt locally, then mirror it remotely when in cloud mode.
    ///
    /// Only local failures are returned. Remote failures are logged and the
    /// local record stays unsynced for the next sweep.
    #[instrument(skip(self, record), fields(attempt = %record.id, subject = %record.subject))]
    pub async fn save_result(&self, mut record: AttemptRecord) -> Result<bool, StoreError> {
        record.validate().map_err(StoreError::InvalidRecord)?;
        record.synced = false;

        {
            let _guard = self.write_lock.lock().await;
            let (mut history, _) = self.read_history()?;
            history.push(record.clone());
            self.write_history(&history)?;
            debug!(len = history.len(), "appended attempt to local history");
        }

        let (mode, user) = {
            let session = self.read_session();
            (session.mode, session.user.clone())
        };
        if let (Mode::Cloud, Some(user), Some(remote)) = (mode, user, self.remote.as_ref()) {
            self.mirror_to_cloud(remote.as_ref(), &user, &record).await;
        }

        Ok(true)
    }

    async fn mirror_to_cloud(&self, remote: &dyn RemoteStore, user: &UserId, record: &AttemptRecord) {
        let outcome = match remote.append_attempt(user, record).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "cloud save failed");
                return;
            }
        };

        if outcome == AppendOutcome::Created {
            if let Err(e) = remote
                .increment_aggregate(user, AggregateDelta::from(record))
                .await
            {
                error!(error = %e, "cloud aggregate update failed");
            } else {
                info!("result saved to cloud");
            }
        }

        // The document exists remotely now, whatever happened to the aggregate.
        let ids = HashSet::from([record.id]);
        if let Err(e) = self.mark_synced(&ids).await {
            warn!(error = %e, "could not flag attempt as synced, the next sweep will retry it");
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// The full local history in insertion order.
    pub fn history(&self) -> Result<Vec<AttemptRecord>, StoreError> {
        Ok(self.read_history()?.0)
    }

    /// Dashboard statistics, always computed from the local history.
    pub fn get_stats(&self) -> Result<StudyStats, StoreError> {
        let history = self.history()?;
        Ok(compute_stats(&history))
    }

    pub fn subject_breakdown(&self) -> Result<Vec<SubjectStats>, StoreError> {
        let history = self.history()?;
        Ok(compute_subject_breakdown(&history))
    }

    /// The signed-in user's remote aggregate. `None` in local mode, when the
    /// document does not exist, or when the fetch fails.
    pub async fn remote_stats(&self) -> Option<AggregateStats> {
        let user = match (self.mode(), self.user(), self.remote.as_ref()) {
            (Mode::Cloud, Some(user), Some(_)) => user,
            _ => return None,
        };
        let remote = self.remote.as_ref()?;
        match remote.fetch_aggregate(&user).await {
            Ok(stats) => stats,
            Err(e) => {
                error!(user = %user, error = %e, "failed to fetch remote aggregate");
                None
            }
        }
    }

    /// Fetch a question bank. Any failure is logged and yields an empty array.
    pub async fn fetch_questions(&self, name: &str) -> serde_json::Value {
        let empty = serde_json::Value::Array(Vec::new());

        let Some(source) = self.questions.as_ref() else {
            warn!(bank = name, "no question source configured");
            return empty;
        };
        if let Err(e) = validate_bank_name(name) {
            error!(bank = name, error = %e, "failed to load question bank");
            return empty;
        }

        match source.fetch(name).await {
            Ok(bank) => bank,
            Err(e) => {
                error!(bank = name, error = %e, "failed to load question bank");
                empty
            }
        }
    }

    // -----------------------------------------------------------------------
    // Local history encoding
    // -----------------------------------------------------------------------

    /// Returns the history and whether any stored record lacked an id.
    fn read_history(&self) -> Result<(Vec<AttemptRecord>, bool), StoreError> {
        let raw = self
            .storage
            .get(&self.config.history_key)
            .map_err(StoreError::LocalRead)?;
        match raw {
            Some(raw) if !raw.trim().is_empty() => decode_history(&raw),
            _ => Ok((Vec::new(), false)),
        }
    }

    fn write_history(&self, history: &[AttemptRecord]) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(history).map_err(StoreError::Encode)?;
        self.storage
            .set(&self.config.history_key, &encoded)
            .map_err(StoreError::LocalWrite)
    }

    fn read_session(&self) -> std::sync::RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(|p| p.into_inner())
    }

    fn set_session(&self, mode: Mode, user: Option<UserId>) {
        let mut session = self.session.write().unwrap_or_else(|p| p.into_inner());
        session.mode = mode;
        session.user = user;
    }
}

fn decode_history(raw: &str) -> Result<(Vec<AttemptRecord>, bool), StoreError> {
    let values: Vec<serde_json::Value> =
        serde_json::from_str(raw).map_err(StoreError::CorruptHistory)?;
    let missing_ids = values
        .iter()
        .any(|v| v.get("id").map_or(true, serde_json::Value::is_null));
    let records = values
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<AttemptRecord>, _>>()
        .map_err(StoreError::CorruptHistory)?;
    Ok((records, missing_ids))
}
