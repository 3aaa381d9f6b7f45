//! Error types for the result store and its collaborators.
//!
//! Defined in `quizsync-core` so the store can tell fatal local failures
//! apart from remote and fetch failures, which it logs and swallows.

use thiserror::Error;

/// Errors raised by a local key-value storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Writing the value would exceed the backend's quota.
    #[error("storage quota exceeded: {needed} bytes needed, limit is {limit}")]
    QuotaExceeded { needed: usize, limit: usize },

    /// The key cannot be represented by this backend.
    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    /// An I/O error from the underlying medium.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by [`ResultStore`](crate::store::ResultStore) operations.
///
/// Only local failures appear here. Remote and fetch failures never reach
/// the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Persisting the local history failed. Fatal for the calling operation.
    #[error("failed to write local history: {0}")]
    LocalWrite(#[source] StorageError),

    /// Reading the local history failed.
    #[error("failed to read local history: {0}")]
    LocalRead(#[source] StorageError),

    /// The stored history is not a JSON array of attempts.
    #[error("local history is corrupt: {0}")]
    CorruptHistory(#[source] serde_json::Error),

    /// Serializing the history failed.
    #[error("failed to encode local history: {0}")]
    Encode(#[source] serde_json::Error),

    /// The record violates a data model invariant.
    #[error("invalid attempt record: {0}")]
    InvalidRecord(String),
}

/// Errors that can occur when talking to the remote store.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// No usable remote configuration.
    #[error("remote store not configured")]
    NotConfigured,

    /// The remote rejected our credentials.
    #[error("authentication failed: {0}")]
    Unauthenticated(String),

    /// The remote returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The response body could not be decoded.
    #[error("failed to decode remote response: {0}")]
    Decode(String),
}

/// Errors that can occur while fetching a question bank.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The bank name is not a plain file name.
    #[error("invalid question bank name: {0:?}")]
    InvalidName(String),

    /// The server answered with a non-success status.
    #[error("HTTP error! status: {status}")]
    Http { status: u16 },

    /// The request never completed.
    #[error("network error: {0}")]
    Network(String),

    /// The body was not valid JSON.
    #[error("failed to parse question bank: {0}")]
    Parse(String),
}
