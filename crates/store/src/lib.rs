//! SQLite record store for workspaces, file records and sync tasks.
//!
//! The store holds the flat, path-addressed file records of each workspace
//! and the durable ledger of every sync attempt: one task per batch and one
//! outcome record per file in that batch.
//!
//! # Architecture
//! - **FileRecords** are keyed by `(workspace, path)`. Writing a path again
//!   updates the row in place; there is no version history.
//! - **SyncTasks** own their **SyncTaskRecords**. Deleting a task (or its
//!   workspace) deletes the records with it.

mod db;
pub mod error;
pub mod models;
mod repo;

pub use crate::db::Database;
pub use crate::repo::Repository;
