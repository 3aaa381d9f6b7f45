//! quizsync-remote: Remote store, question bank, and configuration backends.
//!
//! Implements the `RemoteStore` trait on top of the Firestore REST API and
//! the `QuestionSource` trait over plain HTTP, and loads `quizsync.toml`.

pub mod config;
pub mod firestore;
pub mod mock;
pub mod questions;

pub use config::{
    create_question_source, create_remote, load_config, QuizsyncConfig, RemoteConfig,
};
pub use firestore::FirestoreRemote;
pub use mock::MockRemote;
pub use questions::HttpQuestionSource;
pub use quizsync_core::error::{FetchError, RemoteError};
