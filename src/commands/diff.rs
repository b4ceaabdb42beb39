use std::path::Path;

use shelfsync::diff::DiffEngine;
use shelfsync::sync::SyncOrchestrator;

use crate::commands::GlobalOptions;

pub struct Diff;

impl Diff {
    /// Display the difference between the base and personal copy of an item
    pub fn execute(path: &Path, options: &GlobalOptions) -> anyhow::Result<()> {
        let config = options.load_config()?;
        let orchestrator = SyncOrchestrator::new(config)?;

        let diff = orchestrator.diff(path)?;

        if diff.binary {
            println!("Binary content differs: {}", path.display());
            return Ok(());
        }
        if diff.hunks.is_empty() {
            println!("No differences: {}", path.display());
            return Ok(());
        }

        let label = path.display();
        print!(
            "{}",
            DiffEngine::render(&diff.hunks, &format!("base/{label}"), &format!("personal/{label}"))
        );

        Ok(())
    }
}
