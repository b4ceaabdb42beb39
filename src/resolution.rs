//! Conflict resolution policies and the structured auto-merge
//!
//! Items whose content is a flat sequence of `name: value` fields can be
//! merged three-way without caller input: list-valued fields take the set
//! union of both sides (commutative and idempotent), one-sided field
//! changes win outright, and scalar disagreement always escalates to the
//! caller. Unstructured and binary content is only ever resolved by a
//! whole-file choice.

use std::collections::BTreeSet;

use crate::conflict::{ChangedItem, ConflictRecord};
use crate::diff::ItemContent;
use crate::error::Result;

/// Caller choice for a conflicting item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Take the base tree's content (or deletion)
    KeepBase,
    /// Take the personal tree's content (or deletion)
    KeepPersonal,
    /// Use caller-supplied or auto-merged content
    Merged(String),
    /// Leave the item alone; its ancestor stays put and the conflict
    /// reappears on the next sync
    Skip,
}

impl Resolution {
    /// Short tag for reports and history
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::KeepBase => "keep_base",
            Self::KeepPersonal => "keep_personal",
            Self::Merged(_) => "merged",
            Self::Skip => "skip",
        }
    }
}

/// Supplies resolutions for conflicts the auto-merge cannot settle
pub trait ResolutionCallback {
    /// Choose a resolution for one conflicting item.
    ///
    /// # Errors
    ///
    /// Returns an error to abort the whole operation (nothing has been
    /// written at this point).
    fn resolve(&mut self, record: &ConflictRecord, item: &ChangedItem) -> Result<Resolution>;
}

/// Resolution policy for a sync run
pub enum SyncPolicy<'a> {
    /// Auto-merge what is safe; skip everything that would need input
    Auto,
    /// Auto-merge what is safe; ask the callback for the rest
    Manual(&'a mut dyn ResolutionCallback),
}

/// Why an item could not be auto-merged
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualReason {
    /// One side is binary; only whole-file choices apply
    Binary,
    /// One side deleted the item while the other modified it
    SideAbsent,
    /// Content does not parse as `name: value` fields
    Unstructured,
    /// These scalar fields disagree on both sides
    ScalarFields(Vec<String>),
}

/// Outcome of attempting an automatic merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoMergeOutcome {
    /// Fully merged content
    Merged(String),
    /// Caller input required
    NeedsManual(ManualReason),
}

/// A parsed field value
#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldValue {
    Scalar(String),
    List(Vec<String>),
}

/// Computes merged content for conflicting items.
///
/// Resolution is pure: the same conflict and the same choice always
/// produce the same result.
pub struct ResolutionEngine;

impl ResolutionEngine {
    /// Attempt a three-way automatic merge of a conflicting item
    #[must_use]
    pub fn auto_merge(item: &ChangedItem) -> AutoMergeOutcome {
        if item.is_binary() {
            return AutoMergeOutcome::NeedsManual(ManualReason::Binary);
        }

        let (Some(base), Some(personal)) = (
            item.base.as_ref().and_then(ItemContent::as_text),
            item.personal.as_ref().and_then(ItemContent::as_text),
        ) else {
            return AutoMergeOutcome::NeedsManual(ManualReason::SideAbsent);
        };

        // A conflicting addition has no ancestor; merge against no fields
        let ancestor = item
            .ancestor
            .as_ref()
            .and_then(ItemContent::as_text)
            .unwrap_or("");
        let ancestor_fields = if ancestor.is_empty() {
            Some(Vec::new())
        } else {
            parse_fields(ancestor)
        };

        let (Some(ancestor_fields), Some(base_fields), Some(personal_fields)) = (
            ancestor_fields,
            parse_fields(base),
            parse_fields(personal),
        ) else {
            return AutoMergeOutcome::NeedsManual(ManualReason::Unstructured);
        };

        Self::merge_fields(&ancestor_fields, &base_fields, &personal_fields)
    }

    fn merge_fields(
        ancestor: &[(String, FieldValue)],
        base: &[(String, FieldValue)],
        personal: &[(String, FieldValue)],
    ) -> AutoMergeOutcome {
        let lookup = |fields: &[(String, FieldValue)], name: &str| -> Option<FieldValue> {
            fields.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone())
        };

        // Ancestor key order first, then new keys in sorted order so the
        // merge is order-independent across sides
        let mut names: Vec<String> = ancestor.iter().map(|(n, _)| n.clone()).collect();
        let mut extra: BTreeSet<String> = BTreeSet::new();
        for (name, _) in base.iter().chain(personal) {
            if !names.contains(name) {
                extra.insert(name.clone());
            }
        }
        names.extend(extra);

        let mut merged: Vec<(String, FieldValue)> = Vec::new();
        let mut disagreements: Vec<String> = Vec::new();

        for name in names {
            let a = lookup(ancestor, &name);
            let b = lookup(base, &name);
            let p = lookup(personal, &name);

            if b == p {
                if let Some(value) = b {
                    merged.push((name, value));
                }
                continue;
            }
            if b == a {
                if let Some(value) = p {
                    merged.push((name, value));
                }
                continue;
            }
            if p == a {
                if let Some(value) = b {
                    merged.push((name, value));
                }
                continue;
            }

            // Both sides moved the field to different values
            match (b, p) {
                (Some(FieldValue::List(base_items)), Some(FieldValue::List(personal_items))) => {
                    let ancestor_items = match a {
                        Some(FieldValue::List(items)) => items,
                        _ => Vec::new(),
                    };
                    merged.push((
                        name,
                        FieldValue::List(union_lists(&ancestor_items, &base_items, &personal_items)),
                    ));
                }
                _ => disagreements.push(name),
            }
        }

        if disagreements.is_empty() {
            AutoMergeOutcome::Merged(render_fields(&merged))
        } else {
            AutoMergeOutcome::NeedsManual(ManualReason::ScalarFields(disagreements))
        }
    }
}

/// Commutative set union of two list values.
///
/// Elements keep the ancestor's relative order where they had one; new
/// elements follow in sorted order, so merging (A, B) equals merging
/// (B, A).
fn union_lists(ancestor: &[String], base: &[String], personal: &[String]) -> Vec<String> {
    let members: BTreeSet<&String> = base.iter().chain(personal).collect();

    let mut result: Vec<String> = ancestor
        .iter()
        .filter(|item| members.contains(item))
        .cloned()
        .collect();

    for item in &members {
        if !ancestor.contains(item) {
            result.push((*item).clone());
        }
    }

    result
}

/// Parse content as ordered `name: value` fields.
///
/// Returns `None` for anything that is not a flat field document:
/// missing separators, duplicate names, or blank interior lines.
fn parse_fields(text: &str) -> Option<Vec<(String, FieldValue)>> {
    let mut fields: Vec<(String, FieldValue)> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            return None;
        }
        let (name, raw_value) = line.split_once(':')?;
        let name = name.trim();
        if name.is_empty() || fields.iter().any(|(n, _)| n == name) {
            return None;
        }

        fields.push((name.to_string(), parse_value(raw_value.trim())));
    }

    if fields.is_empty() { None } else { Some(fields) }
}

fn parse_value(raw: &str) -> FieldValue {
    if let Some(inner) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        let items = inner
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect();
        FieldValue::List(items)
    } else {
        FieldValue::Scalar(raw.to_string())
    }
}

fn render_fields(fields: &[(String, FieldValue)]) -> String {
    let mut output = String::new();
    for (name, value) in fields {
        match value {
            FieldValue::Scalar(s) => output.push_str(&format!("{name}: {s}\n")),
            FieldValue::List(items) => {
                output.push_str(&format!("{name}: [{}]\n", items.join(", ")));
            }
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::Classification;
    use std::path::PathBuf;

    fn text_item(ancestor: Option<&str>, base: Option<&str>, personal: Option<&str>) -> ChangedItem {
        let content = |s: Option<&str>| s.map(|s| ItemContent::from_bytes(s.as_bytes().to_vec()));
        ChangedItem {
            path: PathBuf::from("topic.md"),
            classification: Classification::Conflicting,
            ancestor: content(ancestor),
            base: content(base),
            personal: content(personal),
        }
    }

    #[test]
    fn test_list_union_merge() {
        let item = text_item(Some("a: [x]\n"), Some("a: [x, y]\n"), Some("a: [x, z]\n"));

        let outcome = ResolutionEngine::auto_merge(&item);
        assert_eq!(outcome, AutoMergeOutcome::Merged("a: [x, y, z]\n".to_string()));
    }

    #[test]
    fn test_list_union_is_commutative() {
        let forward = text_item(Some("a: [x]\n"), Some("a: [x, y]\n"), Some("a: [x, z]\n"));
        let swapped = text_item(Some("a: [x]\n"), Some("a: [x, z]\n"), Some("a: [x, y]\n"));

        assert_eq!(
            ResolutionEngine::auto_merge(&forward),
            ResolutionEngine::auto_merge(&swapped)
        );
    }

    #[test]
    fn test_list_union_is_idempotent() {
        let item = text_item(Some("a: [x]\n"), Some("a: [x, y]\n"), Some("a: [x, y]\n"));
        assert_eq!(
            ResolutionEngine::auto_merge(&item),
            AutoMergeOutcome::Merged("a: [x, y]\n".to_string())
        );
    }

    #[test]
    fn test_one_sided_scalar_change_wins() {
        let item = text_item(
            Some("title: old\nrefs: [x]\n"),
            Some("title: new\nrefs: [x]\n"),
            Some("title: old\nrefs: [x, z]\n"),
        );

        assert_eq!(
            ResolutionEngine::auto_merge(&item),
            AutoMergeOutcome::Merged("title: new\nrefs: [x, z]\n".to_string())
        );
    }

    #[test]
    fn test_scalar_disagreement_escalates() {
        let item = text_item(Some("title: v1\n"), Some("title: v2\n"), Some("title: v3\n"));

        assert_eq!(
            ResolutionEngine::auto_merge(&item),
            AutoMergeOutcome::NeedsManual(ManualReason::ScalarFields(vec!["title".to_string()]))
        );
    }

    #[test]
    fn test_field_added_on_one_side_kept() {
        let item = text_item(
            Some("a: 1\n"),
            Some("a: 1\nb: 2\n"),
            Some("a: 1\nc: 3\n"),
        );

        assert_eq!(
            ResolutionEngine::auto_merge(&item),
            AutoMergeOutcome::Merged("a: 1\nb: 2\nc: 3\n".to_string())
        );
    }

    #[test]
    fn test_field_deleted_on_one_side_removed() {
        let item = text_item(
            Some("a: 1\nb: 2\n"),
            Some("a: 1\n"),
            Some("a: 1\nb: 2\n"),
        );

        assert_eq!(
            ResolutionEngine::auto_merge(&item),
            AutoMergeOutcome::Merged("a: 1\n".to_string())
        );
    }

    #[test]
    fn test_unstructured_content_escalates() {
        let item = text_item(
            Some("just prose\n"),
            Some("different prose\n"),
            Some("other prose\n"),
        );

        assert_eq!(
            ResolutionEngine::auto_merge(&item),
            AutoMergeOutcome::NeedsManual(ManualReason::Unstructured)
        );
    }

    #[test]
    fn test_binary_escalates() {
        let item = ChangedItem {
            path: PathBuf::from("blob.md"),
            classification: Classification::Conflicting,
            ancestor: Some(ItemContent::from_bytes(vec![0, 1])),
            base: Some(ItemContent::from_bytes(vec![0, 2])),
            personal: Some(ItemContent::from_bytes(vec![0, 3])),
        };

        assert_eq!(
            ResolutionEngine::auto_merge(&item),
            AutoMergeOutcome::NeedsManual(ManualReason::Binary)
        );
    }

    #[test]
    fn test_modify_delete_escalates() {
        let item = text_item(Some("a: 1\n"), None, Some("a: 2\n"));

        assert_eq!(
            ResolutionEngine::auto_merge(&item),
            AutoMergeOutcome::NeedsManual(ManualReason::SideAbsent)
        );
    }

    #[test]
    fn test_conflicting_addition_merges_without_ancestor() {
        let item = text_item(None, Some("refs: [a]\n"), Some("refs: [b]\n"));

        assert_eq!(
            ResolutionEngine::auto_merge(&item),
            AutoMergeOutcome::Merged("refs: [a, b]\n".to_string())
        );
    }

    #[test]
    fn test_conflicting_addition_with_scalar_disagreement_escalates() {
        let item = text_item(None, Some("title: a\nrefs: [x]\n"), Some("title: b\nrefs: [y]\n"));

        assert_eq!(
            ResolutionEngine::auto_merge(&item),
            AutoMergeOutcome::NeedsManual(ManualReason::ScalarFields(vec!["title".to_string()]))
        );
    }

    #[test]
    fn test_merge_is_pure() {
        let item = text_item(Some("a: [x]\n"), Some("a: [x, y]\n"), Some("a: [x, z]\n"));
        assert_eq!(
            ResolutionEngine::auto_merge(&item),
            ResolutionEngine::auto_merge(&item)
        );
    }

    #[test]
    fn test_parse_rejects_duplicates_and_blanks() {
        assert!(parse_fields("a: 1\na: 2\n").is_none());
        assert!(parse_fields("a: 1\n\nb: 2\n").is_none());
        assert!(parse_fields("no separator line\n").is_none());
        assert!(parse_fields("").is_none());
    }

    #[test]
    fn test_resolution_kinds() {
        assert_eq!(Resolution::KeepBase.kind(), "keep_base");
        assert_eq!(Resolution::Merged(String::new()).kind(), "merged");
        assert_eq!(Resolution::Skip.kind(), "skip");
    }
}
