//! Tree scanning and per-item version tracking
//!
//! The tracker walks the base and personal trees, fingerprints every
//! recognized item, and remembers three fingerprints per path: the common
//! ancestor recorded at the last successful sync, plus the current base
//! and personal observations. Ancestor content is kept as a blob so the
//! detector and auto-merge can run true three-way comparisons.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::Result;
use crate::hash::{ContentHasher, Fingerprint};

/// State file holding tracked versions, relative to the state directory
const VERSIONS_FILE: &str = "versions.json";

/// Blob tree holding ancestor content, relative to the state directory
const ANCESTORS_DIR: &str = "ancestors";

/// Per-item record of the three fingerprints driving classification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedVersion {
    /// Fingerprint at the last successful sync; `None` until first synced
    pub ancestor: Option<Fingerprint>,
    /// Fingerprint currently observed in the base tree
    pub base_current: Option<Fingerprint>,
    /// Fingerprint currently observed in the personal tree
    pub personal_current: Option<Fingerprint>,
    /// When this item last completed a sync
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// A non-fatal per-item failure, reported in the operation summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    /// Item path relative to its tree
    pub path: PathBuf,
    /// Human-readable failure description
    pub message: String,
}

/// Result of scanning one tree
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Fingerprints keyed by path relative to the tree root
    pub fingerprints: BTreeMap<PathBuf, Fingerprint>,
    /// Items that could not be read; excluded from this run
    pub errors: Vec<ItemError>,
}

/// Filter deciding which files count as library items
pub struct ItemFilter {
    extensions: Vec<String>,
    gitignore: Option<Gitignore>,
}

impl ItemFilter {
    /// Build a filter from recognized extensions and gitignore-style
    /// ignore/include patterns
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern is invalid.
    pub fn new(extensions: &[String], ignore: &[String], include: &[String]) -> Result<Self> {
        let gitignore = if ignore.is_empty() && include.is_empty() {
            None
        } else {
            let mut builder = GitignoreBuilder::new("");
            for pattern in ignore {
                builder
                    .add_line(None, pattern)
                    .with_context(|| format!("Invalid ignore pattern: '{pattern}'"))?;
            }
            // Includes are negated ignores and take precedence
            for pattern in include {
                builder
                    .add_line(None, &format!("!{pattern}"))
                    .with_context(|| format!("Invalid include pattern: '{pattern}'"))?;
            }
            Some(builder.build()?)
        };

        Ok(Self {
            extensions: extensions.to_vec(),
            gitignore,
        })
    }

    /// Whether a relative path is a tracked library item
    #[must_use]
    pub fn matches(&self, rel_path: &Path) -> bool {
        // Hidden files and directories (state dir included) are never items
        let hidden = rel_path
            .components()
            .any(|c| c.as_os_str().to_string_lossy().starts_with('.'));
        if hidden {
            return false;
        }

        let recognized = rel_path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext));
        if !recognized {
            return false;
        }

        self.gitignore
            .as_ref()
            .is_none_or(|gi| !gi.matched(rel_path, false).is_ignore())
    }
}

/// Scans trees and computes the changed set against tracked versions
pub struct VersionTracker {
    filter: ItemFilter,
}

impl VersionTracker {
    /// Create a tracker with the given item filter
    #[must_use]
    pub const fn new(filter: ItemFilter) -> Self {
        Self { filter }
    }

    /// Walk a tree and fingerprint every tracked item.
    ///
    /// Unreadable files become per-item errors, never a fatal abort. A
    /// missing tree scans as empty.
    #[must_use]
    pub fn scan(&self, root: &Path) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();

        if !root.is_dir() {
            return outcome;
        }

        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    let path = e.path().map_or_else(PathBuf::new, Path::to_path_buf);
                    outcome.errors.push(ItemError {
                        path: path.strip_prefix(root).unwrap_or(&path).to_path_buf(),
                        message: format!("failed to walk: {e}"),
                    });
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(rel_path) = entry.path().strip_prefix(root) else {
                continue;
            };
            if !self.filter.matches(rel_path) {
                continue;
            }

            match ContentHasher::hash_file(entry.path()) {
                Ok(fingerprint) => {
                    outcome.fingerprints.insert(rel_path.to_path_buf(), fingerprint);
                }
                Err(e) => outcome.errors.push(ItemError {
                    path: rel_path.to_path_buf(),
                    message: e.to_string(),
                }),
            }
        }

        outcome
    }

    /// Paths whose current fingerprint on either side differs from the
    /// stored fingerprint for that side. Additions and deletions count.
    #[must_use]
    pub fn compute_changes(
        versions: &BTreeMap<PathBuf, TrackedVersion>,
        base_scan: &BTreeMap<PathBuf, Fingerprint>,
        personal_scan: &BTreeMap<PathBuf, Fingerprint>,
    ) -> BTreeSet<PathBuf> {
        let mut candidates: BTreeSet<&PathBuf> = versions.keys().collect();
        candidates.extend(base_scan.keys());
        candidates.extend(personal_scan.keys());

        let default = TrackedVersion::default();
        let mut changed = BTreeSet::new();

        for path in candidates {
            let tracked = versions.get(path).unwrap_or(&default);
            let base_now = base_scan.get(path).copied();
            let personal_now = personal_scan.get(path).copied();

            if base_now != tracked.base_current || personal_now != tracked.personal_current {
                changed.insert(path.clone());
            }
        }

        changed
    }
}

/// Persistent store for tracked versions and ancestor content blobs
pub struct VersionStore {
    state_dir: PathBuf,
    versions: BTreeMap<PathBuf, TrackedVersion>,
}

impl VersionStore {
    /// Open (or initialize) the store under the given state directory
    ///
    /// # Errors
    ///
    /// Returns an error if an existing state file cannot be read or parsed.
    pub fn open(state_dir: &Path) -> Result<Self> {
        let versions_path = state_dir.join(VERSIONS_FILE);
        let versions = if versions_path.is_file() {
            let content = fs::read_to_string(&versions_path).with_context(|| {
                format!("Failed to read version state: {}", versions_path.display())
            })?;
            serde_json::from_str(&content).with_context(|| {
                format!("Failed to parse version state: {}", versions_path.display())
            })?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            state_dir: state_dir.to_path_buf(),
            versions,
        })
    }

    /// All tracked versions, keyed by relative path
    #[must_use]
    pub const fn versions(&self) -> &BTreeMap<PathBuf, TrackedVersion> {
        &self.versions
    }

    /// Tracked record for one path, if any
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&TrackedVersion> {
        self.versions.get(path)
    }

    /// Advance an item's record after its change is fully resolved.
    ///
    /// The ancestor blob and fingerprint move together, and only here —
    /// never speculatively during a scan. An all-`None` commit means the
    /// item is gone from both trees and drops the record entirely.
    ///
    /// # Errors
    ///
    /// Returns an error if the ancestor blob cannot be written or removed.
    pub fn commit_item(
        &mut self,
        path: &Path,
        ancestor_content: Option<&[u8]>,
        base_current: Option<Fingerprint>,
        personal_current: Option<Fingerprint>,
        synced_at: DateTime<Utc>,
    ) -> Result<()> {
        let blob_path = self.ancestor_blob_path(path);

        match ancestor_content {
            Some(bytes) => {
                if let Some(parent) = blob_path.parent() {
                    fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create ancestor directory: {}", parent.display())
                    })?;
                }
                fs::write(&blob_path, bytes).with_context(|| {
                    format!("Failed to write ancestor blob: {}", blob_path.display())
                })?;

                let entry = self.versions.entry(path.to_path_buf()).or_default();
                entry.ancestor = Some(ContentHasher::hash_bytes(bytes));
                entry.base_current = base_current;
                entry.personal_current = personal_current;
                entry.last_synced_at = Some(synced_at);
            }
            None => {
                if blob_path.is_file() {
                    fs::remove_file(&blob_path).with_context(|| {
                        format!("Failed to remove ancestor blob: {}", blob_path.display())
                    })?;
                }
                if base_current.is_none() && personal_current.is_none() {
                    self.versions.remove(path);
                } else {
                    let entry = self.versions.entry(path.to_path_buf()).or_default();
                    entry.ancestor = None;
                    entry.base_current = base_current;
                    entry.personal_current = personal_current;
                    entry.last_synced_at = Some(synced_at);
                }
            }
        }

        Ok(())
    }

    /// Ancestor content recorded at the last successful sync, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the blob exists but cannot be read.
    pub fn ancestor_content(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let blob_path = self.ancestor_blob_path(path);
        if !blob_path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(&blob_path)
            .with_context(|| format!("Failed to read ancestor blob: {}", blob_path.display()))?;
        Ok(Some(bytes))
    }

    /// Persist the version map, atomically via temp file + rename
    ///
    /// # Errors
    ///
    /// Returns an error if the state file cannot be written.
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.state_dir).with_context(|| {
            format!("Failed to create state directory: {}", self.state_dir.display())
        })?;

        let versions_path = self.state_dir.join(VERSIONS_FILE);
        let tmp_path = self.state_dir.join(format!("{VERSIONS_FILE}.tmp"));

        let json = serde_json::to_string_pretty(&self.versions)
            .context("Failed to serialize version state")?;
        fs::write(&tmp_path, json)
            .with_context(|| format!("Failed to write state file: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &versions_path).with_context(|| {
            format!("Failed to commit state file: {}", versions_path.display())
        })?;

        Ok(())
    }

    fn ancestor_blob_path(&self, path: &Path) -> PathBuf {
        self.state_dir.join(ANCESTORS_DIR).join(path)
    }
}
