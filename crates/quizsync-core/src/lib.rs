//! quizsync-core: Result store, statistics, and collaborator traits.
//!
//! This crate defines the attempt data model, the local-first
//! [`ResultStore`](store::ResultStore), and the traits its storage, remote,
//! and question-bank collaborators implement.

pub mod auth;
pub mod error;
pub mod model;
pub mod statistics;
pub mod storage;
pub mod store;
pub mod traits;
