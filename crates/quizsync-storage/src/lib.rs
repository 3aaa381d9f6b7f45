//! quizsync-storage: Durable local storage for the result store.
//!
//! Provides a directory-backed [`KeyValueStore`](quizsync_core::traits::KeyValueStore)
//! that plays the role of the browser's local storage for native builds.

pub mod file;

pub use file::FileStorage;
