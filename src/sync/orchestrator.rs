//! The end-to-end sync state machine
//!
//! One orchestrator instance owns one base+personal library pair. A run
//! scans both trees, classifies the changed set three-way, resolves
//! conflicts under the caller's policy, snapshots the personal tree, and
//! only then writes — rolling the snapshot back if any write fails.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use chrono::{DateTime, Utc};

use super::apply::{ApplyAction, ApplyExecutor};
use super::{ConflictSummary, HistoryLog, OperationStatus, SyncOperation, SyncState};
use crate::backup::BackupManager;
use crate::config::ShelfConfig;
use crate::conflict::{ChangedItem, Classification, ConflictDetector, ConflictRecord};
use crate::diff::{DiffEngine, Hunk, ItemContent};
use crate::error::Result;
use crate::hash::{ContentHasher, Fingerprint};
use crate::resolution::{AutoMergeOutcome, Resolution, ResolutionEngine, SyncPolicy};
use crate::tracker::{ItemError, ItemFilter, VersionStore, VersionTracker};

/// Read-only summary for presentation layers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSummary {
    /// Changed items that would require resolution
    pub pending_conflicts: usize,
    /// Items whose fingerprints moved on either side since last sync
    pub items_out_of_sync: usize,
    /// When the last recorded operation finished
    pub last_sync_time: Option<DateTime<Utc>>,
}

/// On-demand diff of one item between the two trees
#[derive(Debug, Clone)]
pub struct ItemDiff {
    /// Whether either side is binary (hunks are empty then)
    pub binary: bool,
    /// Hunks from base content to personal content
    pub hunks: Vec<Hunk>,
}

/// What one resolved item contributes to apply and commit
struct ItemPlan {
    path: PathBuf,
    action: Option<ApplyAction>,
    /// `None` means the item was skipped: its tracked record stays put
    commit: Option<CommitPlan>,
    counter: Counter,
}

struct CommitPlan {
    ancestor: Option<Vec<u8>>,
    base_current: Option<Fingerprint>,
    personal_current: Option<Fingerprint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Counter {
    Created,
    Updated,
    Deleted,
    Accepted,
    AutoMerged,
    Skipped,
}

/// Drives the sync state machine for one library pair.
///
/// Constructed with its collaborators rather than reaching for any
/// process-wide state; each base+personal pair owns its own instance.
pub struct SyncOrchestrator {
    config: ShelfConfig,
    tracker: VersionTracker,
    backup: BackupManager,
    history: HistoryLog,
    run_lock: Mutex<()>,
    rerun_requested: AtomicBool,
    state: Mutex<SyncState>,
}

impl SyncOrchestrator {
    /// Build an orchestrator and its collaborators from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configured filter patterns are invalid.
    pub fn new(config: ShelfConfig) -> Result<Self> {
        let filter = ItemFilter::new(&config.extensions, &config.ignore, &config.include)?;
        let backup = BackupManager::new(&config.state_dir);
        let history = HistoryLog::new(&config.state_dir);

        Ok(Self {
            config,
            tracker: VersionTracker::new(filter),
            backup,
            history,
            run_lock: Mutex::new(()),
            rerun_requested: AtomicBool::new(false),
            state: Mutex::new(SyncState::Idle),
        })
    }

    /// Snapshot store for this library pair
    #[must_use]
    pub const fn backup(&self) -> &BackupManager {
        &self.backup
    }

    /// Current state machine position
    pub fn state(&self) -> SyncState {
        self.state.lock().map_or(SyncState::Idle, |s| *s)
    }

    /// Run one synchronization, blocking if another run holds the lock.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures the engine cannot degrade:
    /// an aborted resolution callback, or a rollback that itself failed.
    /// Backup and apply failures are reported in the returned operation.
    pub fn sync(&self, policy: SyncPolicy<'_>, dry_run: bool) -> Result<SyncOperation> {
        let _guard = self
            .run_lock
            .lock()
            .map_err(|_| anyhow!("orchestrator lock poisoned"))?;
        let result = self.run(policy, dry_run);
        self.set_state(SyncState::Idle);
        result
    }

    /// Run a synchronization unless one is already in flight.
    ///
    /// A trigger that arrives mid-run is coalesced: the rerun flag is
    /// set and `None` returned, and the caller should check
    /// [`SyncOrchestrator::take_rerun_request`] once the in-flight run
    /// finishes.
    ///
    /// # Errors
    ///
    /// Same contract as [`SyncOrchestrator::sync`].
    pub fn try_sync(&self, policy: SyncPolicy<'_>, dry_run: bool) -> Result<Option<SyncOperation>> {
        match self.run_lock.try_lock() {
            Ok(_guard) => {
                let result = self.run(policy, dry_run);
                self.set_state(SyncState::Idle);
                result.map(Some)
            }
            Err(std::sync::TryLockError::WouldBlock) => {
                self.rerun_requested.store(true, Ordering::SeqCst);
                Ok(None)
            }
            Err(std::sync::TryLockError::Poisoned(_)) => Err(anyhow!("orchestrator lock poisoned")),
        }
    }

    /// Take (and clear) a coalesced rerun request
    pub fn take_rerun_request(&self) -> bool {
        self.rerun_requested.swap(false, Ordering::SeqCst)
    }

    /// Read-only summary: pending conflicts, out-of-sync items, last
    /// sync time
    ///
    /// # Errors
    ///
    /// Returns an error if engine state cannot be read.
    pub fn status(&self) -> Result<StatusSummary> {
        let store = VersionStore::open(&self.config.state_dir)?;
        let base_scan = self.tracker.scan(&self.config.base_dir);
        let personal_scan = self.tracker.scan(&self.config.personal_dir);

        let mut changed = VersionTracker::compute_changes(
            store.versions(),
            &base_scan.fingerprints,
            &personal_scan.fingerprints,
        );
        let unreadable: BTreeSet<PathBuf> = base_scan
            .errors
            .iter()
            .chain(&personal_scan.errors)
            .map(|e| e.path.clone())
            .collect();
        changed.retain(|p| !unreadable.contains(p));

        let pending_conflicts = changed
            .iter()
            .filter(|path| {
                let ancestor = store.get(path).and_then(|v| v.ancestor);
                ConflictDetector::classify(
                    ancestor,
                    base_scan.fingerprints.get(*path).copied(),
                    personal_scan.fingerprints.get(*path).copied(),
                ) == Classification::Conflicting
            })
            .count();

        let last_sync_time = self
            .history
            .read_all()?
            .last()
            .and_then(|op| op.finished_at);

        Ok(StatusSummary {
            pending_conflicts,
            items_out_of_sync: changed.len(),
            last_sync_time,
        })
    }

    /// On-demand diff of one item, base content against personal content
    ///
    /// # Errors
    ///
    /// Returns an error if either side exists but cannot be read.
    pub fn diff(&self, path: &Path) -> Result<ItemDiff> {
        let read = |root: &Path| -> Result<Option<ItemContent>> {
            let full = root.join(path);
            if !full.is_file() {
                return Ok(None);
            }
            Ok(Some(ItemContent::from_bytes(std::fs::read(&full)?)))
        };

        let base = read(&self.config.base_dir)?;
        let personal = read(&self.config.personal_dir)?;

        if base.iter().chain(&personal).any(ItemContent::is_binary) {
            return Ok(ItemDiff {
                binary: true,
                hunks: Vec::new(),
            });
        }

        let old = base.as_ref().and_then(ItemContent::as_text).unwrap_or("");
        let new = personal.as_ref().and_then(ItemContent::as_text).unwrap_or("");

        Ok(ItemDiff {
            binary: false,
            hunks: DiffEngine::diff(old, new),
        })
    }

    /// Past operations, oldest first
    ///
    /// # Errors
    ///
    /// Returns an error if the history log cannot be read.
    pub fn history(&self) -> Result<Vec<SyncOperation>> {
        self.history.read_all()
    }

    fn set_state(&self, state: SyncState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }

    fn run(&self, mut policy: SyncPolicy<'_>, dry_run: bool) -> Result<SyncOperation> {
        let started_at = Utc::now();
        let mut operation = SyncOperation {
            id: started_at.format("%Y%m%d-%H%M%S%3f").to_string(),
            started_at,
            finished_at: None,
            items_scanned: 0,
            created: 0,
            updated: 0,
            deleted: 0,
            accepted: 0,
            auto_merged: 0,
            skipped_conflicts: 0,
            conflicts: Vec::new(),
            item_errors: Vec::new(),
            backup_id: None,
            status: OperationStatus::Completed,
            failure: None,
            dry_run,
        };

        // SCANNING
        self.set_state(SyncState::Scanning);
        let mut store = VersionStore::open(&self.config.state_dir)?;
        let base_scan = self.tracker.scan(&self.config.base_dir);
        let personal_scan = self.tracker.scan(&self.config.personal_dir);

        operation.items_scanned = base_scan
            .fingerprints
            .keys()
            .chain(personal_scan.fingerprints.keys())
            .collect::<BTreeSet<_>>()
            .len();
        operation.item_errors.extend(base_scan.errors.iter().cloned());
        operation.item_errors.extend(personal_scan.errors.iter().cloned());

        // Unreadable items are excluded from this run and retried next scan
        let mut changed = VersionTracker::compute_changes(
            store.versions(),
            &base_scan.fingerprints,
            &personal_scan.fingerprints,
        );
        let unreadable: BTreeSet<PathBuf> =
            operation.item_errors.iter().map(|e| e.path.clone()).collect();
        changed.retain(|p| !unreadable.contains(p));

        // CLASSIFYING
        self.set_state(SyncState::Classifying);
        let detected = ConflictDetector::detect(
            &store,
            &self.config.base_dir,
            &self.config.personal_dir,
            &base_scan.fingerprints,
            &personal_scan.fingerprints,
            &changed,
        );
        operation.item_errors.extend(detected.errors);

        // Resolve conflicts; nothing is written while this can still abort
        let mut plans = Vec::new();
        for item in &detected.items {
            let plan = if item.classification == Classification::Conflicting {
                self.plan_conflict(item, &mut policy, &base_scan.fingerprints, &mut operation)?
            } else {
                Self::plan_auto(item, &base_scan.fingerprints)
            };
            match plan {
                Some(plan) => plans.push(plan),
                None => operation.item_errors.push(ItemError {
                    path: item.path.clone(),
                    message: "inconsistent content observed during classification".to_string(),
                }),
            }
        }

        for plan in &plans {
            match plan.counter {
                Counter::Created => operation.created += 1,
                Counter::Updated => operation.updated += 1,
                Counter::Deleted => operation.deleted += 1,
                Counter::Accepted => operation.accepted += 1,
                Counter::AutoMerged => operation.auto_merged += 1,
                Counter::Skipped => operation.skipped_conflicts += 1,
            }
        }

        if dry_run {
            // Report what would happen; no snapshot, no writes, no history
            operation.finished_at = Some(Utc::now());
            return Ok(operation);
        }

        let has_work = plans.iter().any(|p| p.commit.is_some());
        if has_work {
            // APPLYING: snapshot first; verified before any write lands
            self.set_state(SyncState::Applying);
            let snapshot = match self.backup.snapshot(&self.config.personal_dir) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    operation.status = OperationStatus::Failed;
                    operation.failure = Some(e.to_string());
                    operation.finished_at = Some(Utc::now());
                    self.history.append(&operation)?;
                    return Ok(operation);
                }
            };
            operation.backup_id = Some(snapshot.id.clone());

            if let Err(e) = self.apply_and_commit(&plans, &mut store) {
                // Full rollback; a rollback failure is unrecoverable and
                // propagates to the caller
                operation.status = OperationStatus::RolledBack;
                operation.failure = Some(e.to_string());
                operation.finished_at = Some(Utc::now());

                if let Err(restore_err) =
                    self.backup.restore(&snapshot.id, &self.config.personal_dir)
                {
                    operation.status = OperationStatus::Failed;
                    let _ = self.history.append(&operation);
                    return Err(restore_err);
                }

                self.history.append(&operation)?;
                return Ok(operation);
            }
        }

        self.set_state(SyncState::Committed);
        operation.finished_at = Some(Utc::now());
        self.history.append(&operation)?;
        Ok(operation)
    }

    fn apply_and_commit(&self, plans: &[ItemPlan], store: &mut VersionStore) -> Result<()> {
        let executor = ApplyExecutor::new(&self.config.personal_dir, false);

        for plan in plans {
            if let Some(action) = &plan.action {
                executor.execute(action)?;
            }
        }

        let synced_at = Utc::now();
        for plan in plans {
            if let Some(commit) = &plan.commit {
                store.commit_item(
                    &plan.path,
                    commit.ancestor.as_deref(),
                    commit.base_current,
                    commit.personal_current,
                    synced_at,
                )?;
            }
        }
        store.save()
    }

    /// Plan an auto-acceptable item. Returns `None` when observed content
    /// contradicts the classification (racing external edit).
    fn plan_auto(
        item: &ChangedItem,
        base_fps: &std::collections::BTreeMap<PathBuf, Fingerprint>,
    ) -> Option<ItemPlan> {
        let base_fp = base_fps.get(&item.path).copied();

        let plan = match item.classification {
            Classification::BaseChanged | Classification::BaseAdded => {
                let content = item.base.as_ref()?.as_bytes().to_vec();
                Self::write_plan(item, content, base_fp, Counter::default_for(item))
            }
            Classification::BaseDeleted => ItemPlan {
                path: item.path.clone(),
                action: Some(ApplyAction::Delete {
                    path: item.path.clone(),
                }),
                commit: Some(CommitPlan {
                    ancestor: None,
                    base_current: None,
                    personal_current: None,
                }),
                counter: Counter::Deleted,
            },
            Classification::PersonalChanged
            | Classification::PersonalAdded
            | Classification::Converged => match &item.personal {
                Some(content) => Self::accept_plan(item, content.as_bytes().to_vec(), base_fp),
                // Converged deletion: both sides removed the item
                None => ItemPlan {
                    path: item.path.clone(),
                    action: None,
                    commit: Some(CommitPlan {
                        ancestor: None,
                        base_current: None,
                        personal_current: None,
                    }),
                    counter: Counter::Accepted,
                },
            },
            Classification::PersonalDeleted => {
                let base_bytes = item.base.as_ref()?.as_bytes().to_vec();
                ItemPlan {
                    path: item.path.clone(),
                    action: None,
                    commit: Some(CommitPlan {
                        ancestor: Some(base_bytes),
                        base_current: base_fp,
                        personal_current: None,
                    }),
                    counter: Counter::Accepted,
                }
            }
            Classification::Unchanged | Classification::Conflicting => return None,
        };

        Some(plan)
    }

    fn plan_conflict(
        &self,
        item: &ChangedItem,
        policy: &mut SyncPolicy<'_>,
        base_fps: &std::collections::BTreeMap<PathBuf, Fingerprint>,
        operation: &mut SyncOperation,
    ) -> Result<Option<ItemPlan>> {
        let record = ConflictRecord::for_item(item);

        // The safe merges happen under either policy; everything else is
        // the caller's call
        let (resolution, auto_merged) = match ResolutionEngine::auto_merge(item) {
            AutoMergeOutcome::Merged(text) => (Resolution::Merged(text), true),
            AutoMergeOutcome::NeedsManual(_) => match policy {
                SyncPolicy::Auto => (Resolution::Skip, false),
                SyncPolicy::Manual(callback) => {
                    self.set_state(SyncState::AwaitingResolution);
                    let choice = callback.resolve(&record, item)?;
                    self.set_state(SyncState::Classifying);
                    (choice, false)
                }
            },
        };

        operation.conflicts.push(ConflictSummary {
            path: item.path.clone(),
            classification: item.classification,
            resolution: Some(resolution.kind().to_string()),
        });

        let base_fp = base_fps.get(&item.path).copied();
        let plan = match resolution {
            Resolution::Skip => ItemPlan {
                path: item.path.clone(),
                action: None,
                commit: None,
                counter: Counter::Skipped,
            },
            Resolution::Merged(text) => {
                let counter = if auto_merged { Counter::AutoMerged } else { Counter::Updated };
                Self::write_plan(item, text.into_bytes(), base_fp, counter)
            }
            Resolution::KeepBase => match &item.base {
                Some(content) => {
                    Self::write_plan(item, content.as_bytes().to_vec(), base_fp, Counter::Updated)
                }
                // Base deleted it; the resolution accepts the deletion
                None => ItemPlan {
                    path: item.path.clone(),
                    action: Some(ApplyAction::Delete {
                        path: item.path.clone(),
                    }),
                    commit: Some(CommitPlan {
                        ancestor: None,
                        base_current: None,
                        personal_current: None,
                    }),
                    counter: Counter::Deleted,
                },
            },
            Resolution::KeepPersonal => match &item.personal {
                Some(content) => Self::accept_plan(item, content.as_bytes().to_vec(), base_fp),
                // Personal deleted it; keep the deletion acknowledged
                None => ItemPlan {
                    path: item.path.clone(),
                    action: None,
                    commit: Some(match &item.base {
                        Some(base) => CommitPlan {
                            ancestor: Some(base.as_bytes().to_vec()),
                            base_current: base_fp,
                            personal_current: None,
                        },
                        None => CommitPlan {
                            ancestor: None,
                            base_current: None,
                            personal_current: None,
                        },
                    }),
                    counter: Counter::Accepted,
                },
            },
        };

        Ok(Some(plan))
    }

    fn write_plan(
        item: &ChangedItem,
        content: Vec<u8>,
        base_fp: Option<Fingerprint>,
        counter: Counter,
    ) -> ItemPlan {
        let fingerprint = ContentHasher::hash_bytes(&content);
        ItemPlan {
            path: item.path.clone(),
            action: Some(ApplyAction::Write {
                path: item.path.clone(),
                content: content.clone(),
            }),
            commit: Some(CommitPlan {
                ancestor: Some(content),
                base_current: base_fp,
                personal_current: Some(fingerprint),
            }),
            counter,
        }
    }

    fn accept_plan(item: &ChangedItem, content: Vec<u8>, base_fp: Option<Fingerprint>) -> ItemPlan {
        let fingerprint = ContentHasher::hash_bytes(&content);
        ItemPlan {
            path: item.path.clone(),
            action: None,
            commit: Some(CommitPlan {
                ancestor: Some(content),
                base_current: base_fp,
                personal_current: Some(fingerprint),
            }),
            counter: Counter::Accepted,
        }
    }
}

impl Counter {
    /// Created vs updated depends on whether the personal side had the
    /// item before this run
    fn default_for(item: &ChangedItem) -> Self {
        if item.personal.is_some() { Self::Updated } else { Self::Created }
    }
}
