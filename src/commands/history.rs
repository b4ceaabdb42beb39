use shelfsync::sync::SyncOrchestrator;

use crate::commands::GlobalOptions;

pub struct History;

impl History {
    /// List past sync operations, most recent last
    pub fn execute(limit: Option<usize>, options: &GlobalOptions) -> anyhow::Result<()> {
        let config = options.load_config()?;
        let orchestrator = SyncOrchestrator::new(config)?;

        let operations = orchestrator.history()?;
        if operations.is_empty() {
            println!("No sync operations recorded.");
            return Ok(());
        }

        let start = limit.map_or(0, |n| operations.len().saturating_sub(n));
        for operation in &operations[start..] {
            let status = match operation.status {
                shelfsync::sync::OperationStatus::Completed => "completed",
                shelfsync::sync::OperationStatus::Failed => "failed",
                shelfsync::sync::OperationStatus::RolledBack => "rolled back",
            };
            let dry_run = if operation.dry_run { " (dry run)" } else { "" };

            println!(
                "{}  {status}{dry_run}  +{} ~{} -{} merged:{} skipped:{}",
                operation.id,
                operation.created,
                operation.updated,
                operation.deleted,
                operation.auto_merged,
                operation.skipped_conflicts,
            );

            if options.verbose {
                for conflict in &operation.conflicts {
                    let resolution = conflict.resolution.as_deref().unwrap_or("unresolved");
                    println!("    conflict {} ({resolution})", conflict.path.display());
                }
                for error in &operation.item_errors {
                    println!("    error {}: {}", error.path.display(), error.message);
                }
            }
        }

        Ok(())
    }
}
