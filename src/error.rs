//! Core error types for the shelfsync library

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using `anyhow::Error`
pub type Result<T> = anyhow::Result<T>;

/// Errors raised by the synchronization engine.
///
/// Per-item read failures never appear here: they are collected into the
/// operation result as `tracker::ItemError` values, and the item is
/// retried on the next scan. Only failures that affect a whole run are
/// raised.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A snapshot could not be created or verified. No changes were made.
    #[error("backup failed before apply: {0}")]
    BackupFailure(String),

    /// A write failed during apply; rollback to the pre-apply snapshot
    /// was triggered.
    #[error("write failed during apply for {path}: {reason}")]
    ApplyWrite {
        /// Path of the item whose write failed
        path: PathBuf,
        /// Underlying I/O failure
        reason: String,
    },

    /// Rollback after a failed apply itself failed. The personal tree may
    /// be inconsistent and requires manual intervention.
    #[error("rollback of snapshot {snapshot_id} failed: {reason}")]
    RollbackFailure {
        /// Snapshot that could not be restored
        snapshot_id: String,
        /// Underlying failure
        reason: String,
    },
}
