//! Three-way change classification against a common ancestor
//!
//! Classification compares three fingerprints per item: the ancestor
//! recorded at the last successful sync, the current base observation,
//! and the current personal observation. This is what tells "the user
//! customized this" apart from "upstream changed this"; a pairwise diff
//! cannot.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::diff::{DiffEngine, Hunk, ItemContent};
use crate::error::Result;
use crate::hash::Fingerprint;
use crate::resolution::Resolution;
use crate::tracker::{ItemError, VersionStore};

/// Category assigned to each changed item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Neither side moved from the ancestor (excluded from results)
    Unchanged,
    /// Upstream edited the item; auto-acceptable
    BaseChanged,
    /// Upstream introduced the item; auto-acceptable
    BaseAdded,
    /// Upstream removed the item; auto-acceptable
    BaseDeleted,
    /// The user edited the item; auto-acceptable
    PersonalChanged,
    /// The user introduced the item; auto-acceptable
    PersonalAdded,
    /// The user removed the item; auto-acceptable
    PersonalDeleted,
    /// Both sides independently reached the same content; auto-acceptable
    Converged,
    /// Both sides moved from the ancestor to different content;
    /// requires resolution
    Conflicting,
}

impl Classification {
    /// Whether this category can be applied without caller input
    #[must_use]
    pub const fn is_auto_acceptable(self) -> bool {
        !matches!(self, Self::Conflicting)
    }
}

/// A changed item with everything detection learned about it
#[derive(Debug, Clone)]
pub struct ChangedItem {
    /// Item path relative to both trees
    pub path: PathBuf,
    /// Three-way category
    pub classification: Classification,
    /// Ancestor content from the version store, if recorded
    pub ancestor: Option<ItemContent>,
    /// Current base-tree content, if the file exists
    pub base: Option<ItemContent>,
    /// Current personal-tree content, if the file exists
    pub personal: Option<ItemContent>,
}

impl ChangedItem {
    /// Whether any side of this item is binary
    #[must_use]
    pub fn is_binary(&self) -> bool {
        [&self.ancestor, &self.base, &self.personal]
            .into_iter()
            .flatten()
            .any(ItemContent::is_binary)
    }
}

/// A conflicting item awaiting (or holding) a resolution.
///
/// Records live for one sync operation only; they are never persisted.
#[derive(Debug, Clone)]
pub struct ConflictRecord {
    /// Item path relative to both trees
    pub item_path: PathBuf,
    /// Always [`Classification::Conflicting`] today; kept for reporting
    pub classification: Classification,
    /// Hunks from ancestor to current base content; empty for binary
    /// content or when a side is absent
    pub base_diff: Vec<Hunk>,
    /// Hunks from ancestor to current personal content
    pub personal_diff: Vec<Hunk>,
    /// Whether any side is binary; binary conflicts are whole-file only
    pub binary: bool,
    /// Caller-supplied or auto-computed resolution, once known
    pub resolution: Option<Resolution>,
}

impl ConflictRecord {
    /// Build a record for a conflicting item, computing ancestor-relative
    /// diffs where both ends are textual
    #[must_use]
    pub fn for_item(item: &ChangedItem) -> Self {
        let binary = item.is_binary();
        let ancestor_text = item.ancestor.as_ref().and_then(ItemContent::as_text);

        let diff_against = |side: &Option<ItemContent>| -> Vec<Hunk> {
            if binary {
                return Vec::new();
            }
            match (ancestor_text, side.as_ref().and_then(ItemContent::as_text)) {
                (Some(old), Some(new)) => DiffEngine::diff(old, new),
                _ => Vec::new(),
            }
        };

        Self {
            item_path: item.path.clone(),
            classification: item.classification,
            base_diff: diff_against(&item.base),
            personal_diff: diff_against(&item.personal),
            binary,
            resolution: None,
        }
    }
}

/// Result of classifying the changed set
#[derive(Debug, Clone, Default)]
pub struct DetectOutcome {
    /// Changed items in lexicographic path order, `Unchanged` excluded
    pub items: Vec<ChangedItem>,
    /// Items whose content could not be read this run
    pub errors: Vec<ItemError>,
}

/// Classifies changed paths by three-way fingerprint comparison
pub struct ConflictDetector;

impl ConflictDetector {
    /// Classify one item from its three fingerprints.
    ///
    /// `None` stands for an absent file on that side; additions and
    /// deletions fall out of the same comparison.
    #[must_use]
    pub fn classify(
        ancestor: Option<Fingerprint>,
        base: Option<Fingerprint>,
        personal: Option<Fingerprint>,
    ) -> Classification {
        let base_moved = base != ancestor;
        let personal_moved = personal != ancestor;

        match (base_moved, personal_moved) {
            (false, false) => Classification::Unchanged,
            (true, false) => match (ancestor, base) {
                (None, _) => Classification::BaseAdded,
                (_, None) => Classification::BaseDeleted,
                _ => Classification::BaseChanged,
            },
            (false, true) => match (ancestor, personal) {
                (None, _) => Classification::PersonalAdded,
                (_, None) => Classification::PersonalDeleted,
                _ => Classification::PersonalChanged,
            },
            (true, true) => {
                if base == personal {
                    Classification::Converged
                } else {
                    Classification::Conflicting
                }
            }
        }
    }

    /// Load content for every changed path and classify it.
    ///
    /// Items are produced in lexicographic path order so downstream
    /// resolution and reporting are reproducible. Read failures exclude
    /// the item from this run and surface as per-item errors.
    pub fn detect(
        store: &VersionStore,
        base_root: &Path,
        personal_root: &Path,
        base_scan: &BTreeMap<PathBuf, Fingerprint>,
        personal_scan: &BTreeMap<PathBuf, Fingerprint>,
        changed: &BTreeSet<PathBuf>,
    ) -> DetectOutcome {
        let mut outcome = DetectOutcome::default();

        for path in changed {
            let ancestor_fp = store.get(path).and_then(|v| v.ancestor);
            let classification = Self::classify(
                ancestor_fp,
                base_scan.get(path).copied(),
                personal_scan.get(path).copied(),
            );

            if classification == Classification::Unchanged {
                continue;
            }

            match Self::load_item(store, base_root, personal_root, path, classification) {
                Ok(item) => outcome.items.push(item),
                Err(e) => outcome.errors.push(ItemError {
                    path: path.clone(),
                    message: e.to_string(),
                }),
            }
        }

        outcome
    }

    fn load_item(
        store: &VersionStore,
        base_root: &Path,
        personal_root: &Path,
        path: &Path,
        classification: Classification,
    ) -> Result<ChangedItem> {
        let ancestor = store
            .ancestor_content(path)?
            .map(ItemContent::from_bytes);
        let base = Self::read_side(&base_root.join(path))?;
        let personal = Self::read_side(&personal_root.join(path))?;

        Ok(ChangedItem {
            path: path.to_path_buf(),
            classification,
            ancestor,
            base,
            personal,
        })
    }

    fn read_side(path: &Path) -> Result<Option<ItemContent>> {
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        Ok(Some(ItemContent::from_bytes(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ContentHasher;

    fn fp(content: &str) -> Option<Fingerprint> {
        Some(ContentHasher::hash_bytes(content.as_bytes()))
    }

    #[test]
    fn test_unchanged() {
        assert_eq!(
            ConflictDetector::classify(fp("v1"), fp("v1"), fp("v1")),
            Classification::Unchanged
        );
        // Never-existed path is also unchanged
        assert_eq!(
            ConflictDetector::classify(None, None, None),
            Classification::Unchanged
        );
    }

    #[test]
    fn test_single_side_changes() {
        assert_eq!(
            ConflictDetector::classify(fp("v1"), fp("v2"), fp("v1")),
            Classification::BaseChanged
        );
        assert_eq!(
            ConflictDetector::classify(fp("v1"), fp("v1"), fp("v2")),
            Classification::PersonalChanged
        );
    }

    #[test]
    fn test_additions_and_deletions() {
        assert_eq!(
            ConflictDetector::classify(None, fp("new"), None),
            Classification::BaseAdded
        );
        assert_eq!(
            ConflictDetector::classify(None, None, fp("new")),
            Classification::PersonalAdded
        );
        assert_eq!(
            ConflictDetector::classify(fp("v1"), None, fp("v1")),
            Classification::BaseDeleted
        );
        assert_eq!(
            ConflictDetector::classify(fp("v1"), fp("v1"), None),
            Classification::PersonalDeleted
        );
    }

    #[test]
    fn test_converged() {
        assert_eq!(
            ConflictDetector::classify(fp("v1"), fp("v2"), fp("v2")),
            Classification::Converged
        );
        // Both sides independently added identical content
        assert_eq!(
            ConflictDetector::classify(None, fp("same"), fp("same")),
            Classification::Converged
        );
    }

    #[test]
    fn test_conflicting() {
        assert_eq!(
            ConflictDetector::classify(fp("v1"), fp("v2"), fp("v3")),
            Classification::Conflicting
        );
        // Modify on one side, delete on the other
        assert_eq!(
            ConflictDetector::classify(fp("v1"), None, fp("v2")),
            Classification::Conflicting
        );
        // Both sides added different content
        assert_eq!(
            ConflictDetector::classify(None, fp("a"), fp("b")),
            Classification::Conflicting
        );
    }

    #[test]
    fn test_classification_symmetry() {
        // Swapping which tree is "base" mirrors the classification
        let cases = [
            (fp("v1"), fp("v2"), fp("v1")),
            (fp("v1"), fp("v1"), fp("v2")),
            (None, fp("new"), None),
            (fp("v1"), fp("v2"), fp("v3")),
            (fp("v1"), fp("v2"), fp("v2")),
        ];

        for (ancestor, base, personal) in cases {
            let forward = ConflictDetector::classify(ancestor, base, personal);
            let mirrored = ConflictDetector::classify(ancestor, personal, base);

            let expected = match forward {
                Classification::BaseChanged => Classification::PersonalChanged,
                Classification::BaseAdded => Classification::PersonalAdded,
                Classification::BaseDeleted => Classification::PersonalDeleted,
                Classification::PersonalChanged => Classification::BaseChanged,
                Classification::PersonalAdded => Classification::BaseAdded,
                Classification::PersonalDeleted => Classification::BaseDeleted,
                other => other,
            };
            assert_eq!(mirrored, expected);
        }
    }

    #[test]
    fn test_conflict_record_diffs() {
        let item = ChangedItem {
            path: PathBuf::from("topic.md"),
            classification: Classification::Conflicting,
            ancestor: Some(ItemContent::from_bytes(b"line 1\nline 2\n".to_vec())),
            base: Some(ItemContent::from_bytes(b"line 1\nbase edit\n".to_vec())),
            personal: Some(ItemContent::from_bytes(b"line 1\npersonal edit\n".to_vec())),
        };

        let record = ConflictRecord::for_item(&item);
        assert!(!record.binary);
        assert!(!record.base_diff.is_empty());
        assert!(!record.personal_diff.is_empty());
        assert!(record.resolution.is_none());
    }

    #[test]
    fn test_conflict_record_binary_has_no_hunks() {
        let item = ChangedItem {
            path: PathBuf::from("blob.bin"),
            classification: Classification::Conflicting,
            ancestor: Some(ItemContent::from_bytes(vec![0, 1, 2])),
            base: Some(ItemContent::from_bytes(vec![0, 1, 3])),
            personal: Some(ItemContent::from_bytes(vec![0, 1, 4])),
        };

        let record = ConflictRecord::for_item(&item);
        assert!(record.binary);
        assert!(record.base_diff.is_empty());
        assert!(record.personal_diff.is_empty());
    }
}
