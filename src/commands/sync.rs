use shelfsync::resolution::SyncPolicy;
use shelfsync::sync::{SyncOperation, SyncOrchestrator, SyncReporter};

use crate::commands::GlobalOptions;
use crate::interactive::InteractivePrompter;

pub struct Sync;

impl Sync {
    /// Run one synchronization and return the finished operation record
    pub fn execute(
        auto: bool,
        yes_all: bool,
        dry_run: bool,
        options: &GlobalOptions,
    ) -> anyhow::Result<SyncOperation> {
        let config = options.load_config()?;

        if options.verbose {
            println!("Base library:     {}", config.base_dir.display());
            println!("Personal library: {}", config.personal_dir.display());
            println!("State directory:  {}", config.state_dir.display());
        }

        let orchestrator = SyncOrchestrator::new(config)?;

        let operation = if auto {
            orchestrator.sync(SyncPolicy::Auto, dry_run)?
        } else {
            let mut prompter = if yes_all {
                InteractivePrompter::keep_personal_all()
            } else {
                InteractivePrompter::new()
            };
            match orchestrator.sync(SyncPolicy::Manual(&mut prompter), dry_run) {
                Ok(operation) => operation,
                Err(e) => {
                    // A user abort leaves both trees untouched
                    if e.to_string().contains("User aborted") {
                        eprintln!("\nSync cancelled by user.");
                        std::process::exit(0);
                    }
                    return Err(e);
                }
            }
        };

        let summary = SyncReporter::generate_summary(&operation);
        println!("{summary}");

        Ok(operation)
    }
}
