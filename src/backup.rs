//! Personal-tree snapshots with verification, restore, and pruning
//!
//! Every mutating apply is preceded by a snapshot of the personal tree.
//! A snapshot is only trusted after its manifest fingerprints have been
//! recomputed from the stored copies; restore goes through a staged
//! directory swap so the tree is fully restored or not touched at all.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{Result, SyncError};
use crate::hash::{ContentHasher, Fingerprint};

/// Snapshot storage directory, relative to the state directory
const SNAPSHOTS_DIR: &str = "snapshots";

/// Per-snapshot manifest file name
const MANIFEST_FILE: &str = "manifest.json";

/// Per-snapshot payload directory name
const FILES_DIR: &str = "files";

/// An immutable, timestamped copy of the personal tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Timestamp-derived identifier, unique within the store
    pub id: String,
    /// When the snapshot was taken
    pub created_at: DateTime<Utc>,
    /// Fingerprint of every stored file, keyed by relative path
    pub manifest: BTreeMap<PathBuf, Fingerprint>,
    /// Directory holding the stored copies
    pub storage_location: PathBuf,
}

/// Creates, verifies, restores, and prunes snapshots
pub struct BackupManager {
    snapshots_dir: PathBuf,
}

impl BackupManager {
    /// Create a manager storing snapshots under the given state directory
    #[must_use]
    pub fn new(state_dir: &Path) -> Self {
        Self {
            snapshots_dir: state_dir.join(SNAPSHOTS_DIR),
        }
    }

    /// Snapshot the personal tree.
    ///
    /// Copies every non-hidden file into the snapshot store, records a
    /// manifest, and verifies the stored copies by re-hashing them before
    /// returning. The caller must not write to the tree until this
    /// returns.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::BackupFailure`] if the copy or verification
    /// fails; no tree changes may proceed in that case.
    pub fn snapshot(&self, personal_root: &Path) -> Result<Snapshot> {
        let created_at = Utc::now();
        let id = self.allocate_id(created_at);
        let location = self.snapshots_dir.join(&id);
        let files_dir = location.join(FILES_DIR);

        let result = self.populate(personal_root, &files_dir, created_at, &id, &location);
        if result.is_err() {
            // Leave no half-written snapshot behind
            let _ = fs::remove_dir_all(&location);
        }
        result
    }

    fn populate(
        &self,
        personal_root: &Path,
        files_dir: &Path,
        created_at: DateTime<Utc>,
        id: &str,
        location: &Path,
    ) -> Result<Snapshot> {
        fs::create_dir_all(files_dir)
            .map_err(|e| SyncError::BackupFailure(format!("cannot create snapshot dir: {e}")))?;

        let mut manifest = BTreeMap::new();

        if personal_root.is_dir() {
            for entry in WalkDir::new(personal_root).follow_links(false).sort_by_file_name() {
                let entry = entry
                    .map_err(|e| SyncError::BackupFailure(format!("cannot walk tree: {e}")))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(rel_path) = entry.path().strip_prefix(personal_root) else {
                    continue;
                };
                if is_hidden(rel_path) {
                    continue;
                }

                let dest = files_dir.join(rel_path);
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).map_err(|e| {
                        SyncError::BackupFailure(format!("cannot create {}: {e}", parent.display()))
                    })?;
                }
                fs::copy(entry.path(), &dest).map_err(|e| {
                    SyncError::BackupFailure(format!(
                        "cannot copy {}: {e}",
                        entry.path().display()
                    ))
                })?;

                let fingerprint = ContentHasher::hash_file(entry.path()).map_err(|e| {
                    SyncError::BackupFailure(format!("cannot hash {}: {e}", rel_path.display()))
                })?;
                manifest.insert(rel_path.to_path_buf(), fingerprint);
            }
        }

        let snapshot = Snapshot {
            id: id.to_string(),
            created_at,
            manifest,
            storage_location: location.to_path_buf(),
        };

        // Verification: recompute every stored copy against the manifest
        Self::verify(&snapshot)?;

        let manifest_json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| SyncError::BackupFailure(format!("cannot serialize manifest: {e}")))?;
        fs::write(location.join(MANIFEST_FILE), manifest_json)
            .map_err(|e| SyncError::BackupFailure(format!("cannot write manifest: {e}")))?;

        Ok(snapshot)
    }

    /// Recompute stored-copy fingerprints and compare with the manifest
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::BackupFailure`] on any mismatch or missing file.
    pub fn verify(snapshot: &Snapshot) -> Result<()> {
        let files_dir = snapshot.storage_location.join(FILES_DIR);

        for (rel_path, expected) in &snapshot.manifest {
            let stored = files_dir.join(rel_path);
            let actual = ContentHasher::hash_file(&stored).map_err(|e| {
                SyncError::BackupFailure(format!(
                    "snapshot missing {}: {e}",
                    rel_path.display()
                ))
            })?;
            if actual != *expected {
                return Err(SyncError::BackupFailure(format!(
                    "snapshot corrupt for {}",
                    rel_path.display()
                ))
                .into());
            }
        }

        Ok(())
    }

    /// Restore a snapshot over the personal tree.
    ///
    /// The snapshot is staged into a temporary directory next to the
    /// tree, verified, and then swapped in whole. Hidden top-level
    /// entries (engine state included) are carried over from the
    /// replaced tree.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RollbackFailure`] if the swap cannot be
    /// completed; the tree may then require manual intervention.
    pub fn restore(&self, id: &str, personal_root: &Path) -> Result<()> {
        let snapshot = self.load(id)?;
        let files_dir = snapshot.storage_location.join(FILES_DIR);

        let parent = personal_root
            .parent()
            .ok_or_else(|| rollback_err(id, "personal tree has no parent directory"))?;
        let tree_name = personal_root
            .file_name()
            .ok_or_else(|| rollback_err(id, "personal tree has no name"))?
            .to_string_lossy()
            .to_string();

        let staging = parent.join(format!(".{tree_name}.restore-staging"));
        let displaced = parent.join(format!(".{tree_name}.pre-restore"));
        let _ = fs::remove_dir_all(&staging);
        let _ = fs::remove_dir_all(&displaced);

        // Stage a full copy first; nothing in the live tree moves yet
        copy_tree(&files_dir, &staging)
            .map_err(|e| rollback_err(id, &format!("staging failed: {e}")))?;

        for (rel_path, expected) in &snapshot.manifest {
            let staged = staging.join(rel_path);
            let actual = ContentHasher::hash_file(&staged)
                .map_err(|e| rollback_err(id, &format!("staged copy unreadable: {e}")))?;
            if actual != *expected {
                return Err(rollback_err(id, &format!("staged copy corrupt: {}", rel_path.display())));
            }
        }

        // Swap: displace the live tree, promote the staged one
        fs::rename(personal_root, &displaced)
            .map_err(|e| rollback_err(id, &format!("cannot displace tree: {e}")))?;
        if let Err(e) = fs::rename(&staging, personal_root) {
            // Put the original back before reporting
            let _ = fs::rename(&displaced, personal_root);
            return Err(rollback_err(id, &format!("cannot promote staging: {e}")));
        }

        // Carry hidden entries (state directory) into the restored tree
        if let Ok(entries) = fs::read_dir(&displaced) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                if name.to_string_lossy().starts_with('.') {
                    let _ = fs::rename(entry.path(), personal_root.join(&name));
                }
            }
        }
        let _ = fs::remove_dir_all(&displaced);

        Ok(())
    }

    /// Load a snapshot's manifest by id
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot does not exist or its manifest
    /// cannot be parsed.
    pub fn load(&self, id: &str) -> Result<Snapshot> {
        let manifest_path = self.snapshots_dir.join(id).join(MANIFEST_FILE);
        let content = fs::read_to_string(&manifest_path)
            .with_context(|| format!("No such snapshot: {id}"))?;
        let snapshot = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt snapshot manifest: {id}"))?;
        Ok(snapshot)
    }

    /// All snapshots, oldest first
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot store cannot be listed.
    pub fn list(&self) -> Result<Vec<Snapshot>> {
        if !self.snapshots_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.snapshots_dir)
            .with_context(|| format!("Failed to list snapshots: {}", self.snapshots_dir.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().to_string();
            snapshots.push(self.load(&id)?);
        }

        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(snapshots)
    }

    /// Delete all but the most recent `keep` snapshots.
    ///
    /// Pruning never runs implicitly during a sync.
    ///
    /// # Errors
    ///
    /// Returns an error if a snapshot directory cannot be removed.
    pub fn prune(&self, keep: usize) -> Result<Vec<String>> {
        let snapshots = self.list()?;
        if snapshots.len() <= keep {
            return Ok(Vec::new());
        }

        let mut removed = Vec::new();
        let excess = snapshots.len() - keep;
        for snapshot in snapshots.into_iter().take(excess) {
            fs::remove_dir_all(&snapshot.storage_location).with_context(|| {
                format!("Failed to remove snapshot: {}", snapshot.id)
            })?;
            removed.push(snapshot.id);
        }

        Ok(removed)
    }

    fn allocate_id(&self, created_at: DateTime<Utc>) -> String {
        let stamp = created_at.format("%Y%m%d-%H%M%S%3f").to_string();
        let mut id = stamp.clone();
        let mut bump = 1;
        while self.snapshots_dir.join(&id).exists() {
            bump += 1;
            id = format!("{stamp}-{bump}");
        }
        id
    }
}

fn is_hidden(rel_path: &Path) -> bool {
    rel_path
        .components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}

fn rollback_err(id: &str, reason: &str) -> anyhow::Error {
    SyncError::RollbackFailure {
        snapshot_id: id.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to)
        .with_context(|| format!("Failed to create directory: {}", to.display()))?;

    if !from.is_dir() {
        return Ok(());
    }

    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .context("walked entry outside its root")?;
        let dest = to.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)
                .with_context(|| format!("Failed to create directory: {}", dest.display()))?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &dest).with_context(|| {
                format!("Failed to copy {} to {}", entry.path().display(), dest.display())
            })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn tree_hashes(root: &Path) -> BTreeMap<PathBuf, Fingerprint> {
        let mut hashes = BTreeMap::new();
        for entry in WalkDir::new(root) {
            let entry = entry.unwrap();
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(root).unwrap();
            if is_hidden(rel) {
                continue;
            }
            hashes.insert(rel.to_path_buf(), ContentHasher::hash_file(entry.path()).unwrap());
        }
        hashes
    }

    #[test]
    fn test_snapshot_records_manifest() {
        let tmp = TempDir::new().unwrap();
        let personal = tmp.path().join("personal");
        write(&personal, "topics/a.md", "alpha");
        write(&personal, "topics/b.md", "beta");
        write(&personal, ".shelfsync/versions.json", "{}");

        let manager = BackupManager::new(&personal.join(".shelfsync"));
        let snapshot = manager.snapshot(&personal).unwrap();

        assert_eq!(snapshot.manifest.len(), 2); // state dir excluded
        assert_eq!(
            snapshot.manifest.get(Path::new("topics/a.md")),
            Some(&ContentHasher::hash_bytes(b"alpha"))
        );
        assert!(BackupManager::verify(&snapshot).is_ok());
    }

    #[test]
    fn test_restore_round_trip() {
        let tmp = TempDir::new().unwrap();
        let personal = tmp.path().join("personal");
        write(&personal, "topics/a.md", "original a");
        write(&personal, "topics/b.md", "original b");

        let state_dir = personal.join(".shelfsync");
        let manager = BackupManager::new(&state_dir);
        let before = tree_hashes(&personal);
        let snapshot = manager.snapshot(&personal).unwrap();

        // Mutate the tree after the snapshot
        write(&personal, "topics/a.md", "clobbered");
        fs::remove_file(personal.join("topics/b.md")).unwrap();
        write(&personal, "topics/c.md", "intruder");

        manager.restore(&snapshot.id, &personal).unwrap();

        assert_eq!(tree_hashes(&personal), before);
        // State directory survived the swap
        assert!(state_dir.is_dir());
    }

    #[test]
    fn test_verify_detects_corruption() {
        let tmp = TempDir::new().unwrap();
        let personal = tmp.path().join("personal");
        write(&personal, "a.md", "alpha");

        let manager = BackupManager::new(&tmp.path().join("state"));
        let snapshot = manager.snapshot(&personal).unwrap();

        fs::write(snapshot.storage_location.join(FILES_DIR).join("a.md"), "tampered").unwrap();
        assert!(BackupManager::verify(&snapshot).is_err());
    }

    #[test]
    fn test_prune_keeps_most_recent() {
        let tmp = TempDir::new().unwrap();
        let personal = tmp.path().join("personal");
        write(&personal, "a.md", "alpha");

        let manager = BackupManager::new(&tmp.path().join("state"));
        let first = manager.snapshot(&personal).unwrap();
        let second = manager.snapshot(&personal).unwrap();
        let third = manager.snapshot(&personal).unwrap();

        let removed = manager.prune(2).unwrap();
        assert_eq!(removed, vec![first.id]);

        let remaining: Vec<String> = manager.list().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(remaining, vec![second.id, third.id]);
    }

    #[test]
    fn test_prune_noop_when_under_limit() {
        let tmp = TempDir::new().unwrap();
        let personal = tmp.path().join("personal");
        write(&personal, "a.md", "alpha");

        let manager = BackupManager::new(&tmp.path().join("state"));
        manager.snapshot(&personal).unwrap();

        assert!(manager.prune(5).unwrap().is_empty());
        assert_eq!(manager.list().unwrap().len(), 1);
    }

    #[test]
    fn test_snapshot_of_empty_tree() {
        let tmp = TempDir::new().unwrap();
        let personal = tmp.path().join("personal");
        fs::create_dir_all(&personal).unwrap();

        let manager = BackupManager::new(&tmp.path().join("state"));
        let snapshot = manager.snapshot(&personal).unwrap();
        assert!(snapshot.manifest.is_empty());
    }

    #[test]
    fn test_restore_unknown_snapshot_fails() {
        let tmp = TempDir::new().unwrap();
        let personal = tmp.path().join("personal");
        fs::create_dir_all(&personal).unwrap();

        let manager = BackupManager::new(&tmp.path().join("state"));
        assert!(manager.restore("19700101-000000000", &personal).is_err());
    }
}
