//! Sync orchestration: state machine, operation records, history
//!
//! A sync run moves through `Idle → Scanning → Classifying →
//! AwaitingResolution → Applying → Committed`, or down the
//! `Failed → RolledBack` path. Every run appends one append-only
//! [`SyncOperation`] record to the history log.

mod apply;
mod orchestrator;
mod reporting;

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use apply::{ApplyAction, ApplyExecutor};
pub use orchestrator::{ItemDiff, StatusSummary, SyncOrchestrator};
pub use reporting::SyncReporter;

use crate::conflict::Classification;
use crate::error::Result;
use crate::tracker::ItemError;

/// History log file name, relative to the state directory
const HISTORY_FILE: &str = "history.jsonl";

/// Orchestrator state machine positions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No operation in flight
    Idle,
    /// Hashing both trees
    Scanning,
    /// Classifying the changed set
    Classifying,
    /// Suspended on caller resolution input; nothing written yet
    AwaitingResolution,
    /// Snapshot taken, writes in progress; not abortable
    Applying,
    /// Terminal success
    Committed,
    /// Terminal failure before or during apply
    Failed,
    /// Terminal failure with the pre-apply snapshot restored
    RolledBack,
}

/// Final status of a sync operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// All non-skipped items applied and committed
    Completed,
    /// Aborted before any write (backup failure or scan-level fault)
    Failed,
    /// A write failed after backup; the snapshot was restored
    RolledBack,
}

/// One resolved (or skipped) conflict, as recorded in history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictSummary {
    /// Item path relative to both trees
    pub path: PathBuf,
    /// Three-way category at detection time
    pub classification: Classification,
    /// Resolution kind (`keep_base`, `keep_personal`, `merged`, `skip`),
    /// or `None` when the operation never reached resolution
    pub resolution: Option<String>,
}

/// Append-only record of one sync run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOperation {
    /// Timestamp-derived identifier
    pub id: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,
    /// Distinct items fingerprinted across both trees
    pub items_scanned: usize,
    /// Items newly written to the personal tree
    pub created: usize,
    /// Items overwritten in the personal tree
    pub updated: usize,
    /// Items removed from the personal tree
    pub deleted: usize,
    /// Personal-side changes accepted without a tree write
    pub accepted: usize,
    /// Conflicts settled by the automatic merge
    pub auto_merged: usize,
    /// Conflicts left unresolved (skipped) this run
    pub skipped_conflicts: usize,
    /// Conflicts encountered, with their resolutions
    pub conflicts: Vec<ConflictSummary>,
    /// Per-item errors collected during the run
    pub item_errors: Vec<ItemError>,
    /// Snapshot backing this run's writes, if an apply happened
    pub backup_id: Option<String>,
    /// Terminal status
    pub status: OperationStatus,
    /// Fatal failure description, for `Failed`/`RolledBack` operations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    /// Whether this was a dry run (nothing written, no snapshot)
    #[serde(default)]
    pub dry_run: bool,
}

impl SyncOperation {
    /// Exit-status contract: 0 synced cleanly, 1 conflicts remain
    /// unresolved, 2 fatal failure
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self.status {
            OperationStatus::Failed | OperationStatus::RolledBack => 2,
            OperationStatus::Completed => {
                if self.skipped_conflicts > 0 { 1 } else { 0 }
            }
        }
    }

    /// Total personal-tree mutations performed
    #[must_use]
    pub const fn total_writes(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// Append-only log of sync operations, one JSON record per line
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    /// Create a log stored under the given state directory
    #[must_use]
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(HISTORY_FILE),
        }
    }

    /// Append one finished operation
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be written.
    pub fn append(&self, operation: &SyncOperation) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create state directory: {}", parent.display())
            })?;
        }

        let line = serde_json::to_string(operation).context("Failed to serialize operation")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open history log: {}", self.path.display()))?;
        writeln!(file, "{line}")
            .with_context(|| format!("Failed to append to history log: {}", self.path.display()))?;

        Ok(())
    }

    /// All recorded operations, oldest first
    ///
    /// # Errors
    ///
    /// Returns an error if the log exists but cannot be read or parsed.
    pub fn read_all(&self) -> Result<Vec<SyncOperation>> {
        if !self.path.is_file() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read history log: {}", self.path.display()))?;

        let mut operations = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            operations.push(
                serde_json::from_str(line)
                    .with_context(|| format!("Corrupt history record: {line}"))?,
            );
        }
        Ok(operations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_operation(status: OperationStatus, skipped: usize) -> SyncOperation {
        SyncOperation {
            id: "20250101-000000000".to_string(),
            started_at: Utc::now(),
            finished_at: Some(Utc::now()),
            items_scanned: 3,
            created: 1,
            updated: 1,
            deleted: 0,
            accepted: 0,
            auto_merged: 0,
            skipped_conflicts: skipped,
            conflicts: Vec::new(),
            item_errors: Vec::new(),
            backup_id: Some("20250101-000000000".to_string()),
            status,
            failure: None,
            dry_run: false,
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(sample_operation(OperationStatus::Completed, 0).exit_code(), 0);
        assert_eq!(sample_operation(OperationStatus::Completed, 2).exit_code(), 1);
        assert_eq!(sample_operation(OperationStatus::Failed, 0).exit_code(), 2);
        assert_eq!(sample_operation(OperationStatus::RolledBack, 0).exit_code(), 2);
    }

    #[test]
    fn test_history_append_and_read() {
        let tmp = TempDir::new().unwrap();
        let log = HistoryLog::new(tmp.path());

        log.append(&sample_operation(OperationStatus::Completed, 0)).unwrap();
        log.append(&sample_operation(OperationStatus::RolledBack, 0)).unwrap();

        let operations = log.read_all().unwrap();
        assert_eq!(operations.len(), 2);
        assert_eq!(operations[0].status, OperationStatus::Completed);
        assert_eq!(operations[1].status, OperationStatus::RolledBack);
    }

    #[test]
    fn test_history_empty_when_missing() {
        let tmp = TempDir::new().unwrap();
        let log = HistoryLog::new(&tmp.path().join("nope"));
        assert!(log.read_all().unwrap().is_empty());
    }
}
