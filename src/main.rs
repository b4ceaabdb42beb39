mod cli;
mod commands;
mod interactive;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
use commands::GlobalOptions;

fn main() -> anyhow::Result<()> {
    // Set up Ctrl+C handler for graceful interruption
    ctrlc::set_handler(|| {
        eprintln!("\n\nInterrupted by user (Ctrl+C)");
        std::process::exit(130); // Standard exit code for SIGINT
    })
    .context("Failed to set Ctrl+C handler")?;

    let cli = Cli::parse();

    let options = GlobalOptions {
        verbose: cli.verbose,
        config: cli.config.clone(),
        no_config: cli.no_config,
        base: cli.base.clone(),
        personal: cli.personal.clone(),
    };

    match &cli.command {
        Commands::Sync {
            auto,
            yes_all,
            dry_run,
        } => {
            let operation = commands::Sync::execute(*auto, *yes_all, *dry_run, &options)
                .context("Failed to execute sync command")?;
            std::process::exit(operation.exit_code());
        }
        Commands::Status => {
            commands::Status::execute(&options).context("Failed to execute status command")?;
        }
        Commands::Diff { path } => {
            commands::Diff::execute(path, &options).context("Failed to execute diff command")?;
        }
        Commands::History { limit } => {
            commands::History::execute(*limit, &options)
                .context("Failed to execute history command")?;
        }
        Commands::Snapshot { command } => {
            commands::Snapshot::execute(command, &options)
                .context("Failed to execute snapshot command")?;
        }
        Commands::Watch => {
            commands::Watch::execute(&options).context("Failed to execute watch command")?;
        }
        Commands::Config => {
            commands::Config::execute(&options).context("Failed to execute config command")?;
        }
    }

    Ok(())
}
