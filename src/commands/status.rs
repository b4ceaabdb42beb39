use shelfsync::sync::SyncOrchestrator;

use crate::commands::GlobalOptions;

pub struct Status;

impl Status {
    /// Show pending conflicts and out-of-sync items without writing
    pub fn execute(options: &GlobalOptions) -> anyhow::Result<()> {
        let config = options.load_config()?;

        if options.verbose {
            println!("Base library:     {}", config.base_dir.display());
            println!("Personal library: {}", config.personal_dir.display());
        }

        let orchestrator = SyncOrchestrator::new(config)?;
        let summary = orchestrator.status()?;

        println!("=== Library Status ===");
        println!("Out of sync:       {}", summary.items_out_of_sync);
        println!("Pending conflicts: {}", summary.pending_conflicts);
        match summary.last_sync_time {
            Some(time) => println!("Last sync:         {}", time.format("%Y-%m-%d %H:%M:%S UTC")),
            None => println!("Last sync:         never"),
        }

        Ok(())
    }
}
