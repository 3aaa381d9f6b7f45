//! Core trait definitions for local storage, the remote store, and question
//! bank sources.
//!
//! The async traits are implemented by the `quizsync-remote` crate; the
//! storage trait by `quizsync-storage` and [`MemoryStorage`](crate::storage::MemoryStorage).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, RemoteError, StorageError};
use crate::model::{AggregateDelta, AggregateStats, AttemptRecord, UserId};

// ---------------------------------------------------------------------------
// Local storage
// ---------------------------------------------------------------------------

/// A string-keyed, string-valued persistent store (the device's local storage).
///
/// Writes replace the whole value; there is no partial update.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Overwrite the value stored under `key`.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

// ---------------------------------------------------------------------------
// Remote store
// ---------------------------------------------------------------------------

/// Outcome of writing an attempt document remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendOutcome {
    /// The document was created by this call.
    Created,
    /// A document with this attempt's id already existed; nothing changed.
    AlreadyPresent,
}

/// Per-user remote namespace: an attempt collection and an aggregate document.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Human-readable backend name (e.g. "firestore").
    fn name(&self) -> &str;

    /// Add the attempt to the user's collection, keyed by its id, with a
    /// server-assigned sync timestamp. The `synced` flag is never sent.
    async fn append_attempt(
        &self,
        user: &UserId,
        record: &AttemptRecord,
    ) -> Result<AppendOutcome, RemoteError>;

    /// Merge-increment the user's aggregate counters and touch `lastActive`.
    async fn increment_aggregate(
        &self,
        user: &UserId,
        delta: AggregateDelta,
    ) -> Result<(), RemoteError>;

    /// Create the attempt and increment the aggregate as one atomic commit.
    ///
    /// If the attempt already exists nothing is applied and
    /// [`AppendOutcome::AlreadyPresent`] is returned, so the aggregate is
    /// bumped at most once per attempt.
    async fn commit_attempt(
        &self,
        user: &UserId,
        record: &AttemptRecord,
    ) -> Result<AppendOutcome, RemoteError>;

    /// Read the user's aggregate document, `None` if it was never written.
    async fn fetch_aggregate(&self, user: &UserId) -> Result<Option<AggregateStats>, RemoteError>;
}

// ---------------------------------------------------------------------------
// Question banks
// ---------------------------------------------------------------------------

/// Source of static question bank documents.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Fetch and parse the named bank.
    async fn fetch(&self, name: &str) -> Result<serde_json::Value, FetchError>;
}

/// Check that a bank name is a plain file name.
pub fn validate_bank_name(name: &str) -> Result<(), FetchError> {
    let bad = name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\');
    if bad {
        return Err(FetchError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_bank_names_are_accepted() {
        assert!(validate_bank_name("bank1.json").is_ok());
        assert!(validate_bank_name("polity-2024.json").is_ok());
    }

    #[test]
    fn path_like_bank_names_are_rejected() {
        for name in ["", ".", "../secret.json", "a/b.json", "a\\b.json"] {
            assert!(
                matches!(validate_bank_name(name), Err(FetchError::InvalidName(_))),
                "{name:?} should be rejected"
            );
        }
    }
}
