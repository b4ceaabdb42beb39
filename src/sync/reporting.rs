//! Sync operation reporting and statistics

use super::{OperationStatus, SyncOperation};

/// Sync operation reporter
pub struct SyncReporter;

impl SyncReporter {
    /// Create a new reporter
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Generate a summary report
    #[must_use]
    pub fn generate_summary(operation: &SyncOperation) -> String {
        let mut output = String::new();

        if operation.dry_run {
            output.push_str("\n=== Sync Summary (dry run) ===\n");
        } else {
            output.push_str("\n=== Sync Summary ===\n");
        }
        output.push_str(&format!("Scanned:     {}\n", operation.items_scanned));
        output.push_str(&format!("Created:     {}\n", operation.created));
        output.push_str(&format!("Updated:     {}\n", operation.updated));
        output.push_str(&format!("Deleted:     {}\n", operation.deleted));
        output.push_str(&format!("Accepted:    {}\n", operation.accepted));
        output.push_str(&format!("Auto-merged: {}\n", operation.auto_merged));
        output.push_str(&format!("Skipped:     {}\n", operation.skipped_conflicts));

        if !operation.conflicts.is_empty() {
            output.push_str(&format!("\nConflicts ({}):\n", operation.conflicts.len()));
            for conflict in &operation.conflicts {
                let resolution = conflict.resolution.as_deref().unwrap_or("unresolved");
                output.push_str(&format!(
                    "  - {} ({resolution})\n",
                    conflict.path.display()
                ));
            }
        }

        if !operation.item_errors.is_empty() {
            output.push_str(&format!("\nErrors ({}):\n", operation.item_errors.len()));
            for error in &operation.item_errors {
                output.push_str(&format!(
                    "  - {}: {}\n",
                    error.path.display(),
                    error.message
                ));
            }
        }

        if let Some(backup_id) = &operation.backup_id {
            output.push_str(&format!("\nBackup: {backup_id}\n"));
        }

        output.push_str(&format!("\nTotal writes: {}\n", operation.total_writes()));

        match operation.status {
            OperationStatus::Completed => {
                if operation.skipped_conflicts > 0 {
                    output.push_str("Status: ⚠ Completed with unresolved conflicts\n");
                } else {
                    output.push_str("Status: ✓ Success\n");
                }
            }
            OperationStatus::Failed => {
                output.push_str("Status: ✗ Failed before any write\n");
            }
            OperationStatus::RolledBack => {
                output.push_str("Status: ✗ Failed and rolled back\n");
            }
        }
        if let Some(failure) = &operation.failure {
            output.push_str(&format!("Failure: {failure}\n"));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn operation() -> SyncOperation {
        SyncOperation {
            id: "20250101-000000000".to_string(),
            started_at: Utc::now(),
            finished_at: Some(Utc::now()),
            items_scanned: 10,
            created: 5,
            updated: 3,
            deleted: 0,
            accepted: 1,
            auto_merged: 0,
            skipped_conflicts: 0,
            conflicts: Vec::new(),
            item_errors: Vec::new(),
            backup_id: Some("20250101-000000000".to_string()),
            status: OperationStatus::Completed,
            failure: None,
            dry_run: false,
        }
    }

    #[test]
    fn test_summary_counts() {
        let summary = SyncReporter::generate_summary(&operation());

        assert!(summary.contains("Created:     5"));
        assert!(summary.contains("Updated:     3"));
        assert!(summary.contains("Total writes: 8"));
        assert!(summary.contains("✓ Success"));
    }

    #[test]
    fn test_summary_with_skipped_conflicts() {
        let mut op = operation();
        op.skipped_conflicts = 2;

        let summary = SyncReporter::generate_summary(&op);
        assert!(summary.contains("Skipped:     2"));
        assert!(summary.contains("unresolved conflicts"));
    }

    #[test]
    fn test_summary_with_errors() {
        let mut op = operation();
        op.item_errors.push(crate::tracker::ItemError {
            path: "broken.md".into(),
            message: "permission denied".to_string(),
        });

        let summary = SyncReporter::generate_summary(&op);
        assert!(summary.contains("Errors (1)"));
        assert!(summary.contains("permission denied"));
    }

    #[test]
    fn test_summary_rolled_back() {
        let mut op = operation();
        op.status = OperationStatus::RolledBack;
        op.failure = Some("disk full".to_string());

        let summary = SyncReporter::generate_summary(&op);
        assert!(summary.contains("rolled back"));
        assert!(summary.contains("disk full"));
    }

    #[test]
    fn test_summary_dry_run_banner() {
        let mut op = operation();
        op.dry_run = true;

        let summary = SyncReporter::generate_summary(&op);
        assert!(summary.contains("(dry run)"));
    }
}
