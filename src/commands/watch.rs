use std::sync::mpsc;
use std::time::Duration;

use shelfsync::resolution::SyncPolicy;
use shelfsync::sync::{SyncOrchestrator, SyncReporter};
use shelfsync::watcher::LibraryWatcher;

use crate::commands::GlobalOptions;

pub struct Watch;

impl Watch {
    /// Watch both libraries and run an automatic sync after each quiet
    /// window. Conflicts that need input are skipped and reported; they
    /// wait for an interactive `sync` run.
    pub fn execute(options: &GlobalOptions) -> anyhow::Result<()> {
        let config = options.load_config()?;
        let window = Duration::from_millis(config.debounce_ms);
        let base_dir = config.base_dir.clone();
        let personal_dir = config.personal_dir.clone();

        let orchestrator = SyncOrchestrator::new(config)?;

        // Capacity 1: triggers arriving mid-sync merge instead of stacking
        let (tx, rx) = mpsc::sync_channel(1);
        let watcher = LibraryWatcher::spawn(&base_dir, &personal_dir, window, tx)?;

        println!("Watching {} and {}", base_dir.display(), personal_dir.display());
        println!("Press Ctrl+C to stop.");

        // Catch up on anything that changed while not watching
        Self::run_once(&orchestrator, options.verbose)?;

        while rx.recv().is_ok() {
            Self::run_once(&orchestrator, options.verbose)?;
            // A trigger that fired mid-run means the trees moved again
            while orchestrator.take_rerun_request() {
                Self::run_once(&orchestrator, options.verbose)?;
            }
        }

        watcher.shutdown();
        Ok(())
    }

    fn run_once(orchestrator: &SyncOrchestrator, verbose: bool) -> anyhow::Result<()> {
        // A run already in flight leaves the rerun flag set for the loop
        let Some(operation) = orchestrator.try_sync(SyncPolicy::Auto, false)? else {
            return Ok(());
        };

        if verbose || operation.total_writes() > 0 || operation.skipped_conflicts > 0 {
            println!("{}", SyncReporter::generate_summary(&operation));
        }
        if operation.skipped_conflicts > 0 {
            eprintln!(
                "{} conflict(s) need input; run `shelfsync sync` to resolve.",
                operation.skipped_conflicts
            );
        }

        Ok(())
    }
}
