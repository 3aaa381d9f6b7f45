//! In-memory remote store for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use quizsync_core::error::RemoteError;
use quizsync_core::model::{AggregateDelta, AggregateStats, AttemptRecord, UserId};
use quizsync_core::traits::{AppendOutcome, RemoteStore};

#[derive(Default)]
struct UserData {
    attempts: Vec<AttemptRecord>,
    aggregate: Option<AggregateStats>,
}

/// A remote store that keeps every user's namespace in memory.
///
/// Follows the same create-if-absent semantics as the real backend and
/// counts calls so tests can assert on traffic.
#[derive(Default)]
pub struct MockRemote {
    users: Mutex<HashMap<UserId, UserData>>,
    fail_writes: AtomicBool,
    append_calls: AtomicU32,
    increment_calls: AtomicU32,
    commit_calls: AtomicU32,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail with a network error until switched back.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Attempts stored for `user`, in arrival order.
    pub fn attempts(&self, user: &UserId) -> Vec<AttemptRecord> {
        self.lock()
            .get(user)
            .map(|d| d.attempts.clone())
            .unwrap_or_default()
    }

    pub fn aggregate(&self, user: &UserId) -> Option<AggregateStats> {
        self.lock().get(user).and_then(|d| d.aggregate.clone())
    }

    pub fn append_calls(&self) -> u32 {
        self.append_calls.load(Ordering::Relaxed)
    }

    pub fn increment_calls(&self) -> u32 {
        self.increment_calls.load(Ordering::Relaxed)
    }

    pub fn commit_calls(&self) -> u32 {
        self.commit_calls.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, UserData>> {
        self.users.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_writable(&self) -> Result<(), RemoteError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(RemoteError::NetworkError("mock write failure".into()));
        }
        Ok(())
    }

    fn insert(data: &mut UserData, record: &AttemptRecord) -> AppendOutcome {
        if data.attempts.iter().any(|a| a.id == record.id) {
            return AppendOutcome::AlreadyPresent;
        }
        let mut stored = record.clone();
        stored.synced = false;
        data.attempts.push(stored);
        AppendOutcome::Created
    }

    fn bump(data: &mut UserData, delta: AggregateDelta) {
        let aggregate = data.aggregate.get_or_insert(AggregateStats {
            total_questions: 0,
            total_correct: 0,
            last_active: None,
        });
        aggregate.total_questions += delta.questions;
        aggregate.total_correct += delta.correct;
        aggregate.last_active = Some(Utc::now());
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    fn name(&self) -> &str {
        "mock"
    }

    async fn append_attempt(
        &self,
        user: &UserId,
        record: &AttemptRecord,
    ) -> Result<AppendOutcome, RemoteError> {
        self.append_calls.fetch_add(1, Ordering::Relaxed);
        self.check_writable()?;
        let mut users = self.lock();
        Ok(Self::insert(users.entry(user.clone()).or_default(), record))
    }

    async fn increment_aggregate(
        &self,
        user: &UserId,
        delta: AggregateDelta,
    ) -> Result<(), RemoteError> {
        self.increment_calls.fetch_add(1, Ordering::Relaxed);
        self.check_writable()?;
        let mut users = self.lock();
        Self::bump(users.entry(user.clone()).or_default(), delta);
        Ok(())
    }

    async fn commit_attempt(
        &self,
        user: &UserId,
        record: &AttemptRecord,
    ) -> Result<AppendOutcome, RemoteError> {
        self.commit_calls.fetch_add(1, Ordering::Relaxed);
        self.check_writable()?;
        let mut users = self.lock();
        let data = users.entry(user.clone()).or_default();
        let outcome = Self::insert(data, record);
        if outcome == AppendOutcome::Created {
            Self::bump(data, AggregateDelta::from(record));
        }
        Ok(outcome)
    }

    async fn fetch_aggregate(&self, user: &UserId) -> Result<Option<AggregateStats>, RemoteError> {
        Ok(self.aggregate(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn commit_is_idempotent_per_attempt() {
        let remote = MockRemote::new();
        let user = UserId::new("u1");
        let record = AttemptRecord::new(8, 10, "history");

        assert_eq!(
            remote.commit_attempt(&user, &record).await.unwrap(),
            AppendOutcome::Created
        );
        assert_eq!(
            remote.commit_attempt(&user, &record).await.unwrap(),
            AppendOutcome::AlreadyPresent
        );

        let agg = remote.aggregate(&user).unwrap();
        assert_eq!((agg.total_questions, agg.total_correct), (10, 8));
        assert_eq!(remote.attempts(&user).len(), 1);
        assert_eq!(remote.commit_calls(), 2);
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let remote = MockRemote::new();
        let record = AttemptRecord::new(1, 2, "polity");
        remote
            .append_attempt(&UserId::new("a"), &record)
            .await
            .unwrap();

        assert_eq!(remote.attempts(&UserId::new("a")).len(), 1);
        assert!(remote.attempts(&UserId::new("b")).is_empty());
        assert!(remote
            .fetch_aggregate(&UserId::new("b"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn stored_attempts_never_carry_synced_flag() {
        let remote = MockRemote::new();
        let user = UserId::new("u1");
        let mut record = AttemptRecord::new(3, 5, "economy");
        record.synced = true;
        remote.append_attempt(&user, &record).await.unwrap();
        assert!(!remote.attempts(&user)[0].synced);
    }

    #[tokio::test]
    async fn injected_failures_leave_state_untouched() {
        let remote = MockRemote::new();
        let user = UserId::new("u1");
        remote.set_fail_writes(true);

        let err = remote
            .commit_attempt(&user, &AttemptRecord::new(1, 1, "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::NetworkError(_)));
        assert!(remote.attempts(&user).is_empty());
        assert!(remote.aggregate(&user).is_none());
    }
}
