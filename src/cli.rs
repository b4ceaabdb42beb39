use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Two-Tier Library Synchronization Tool
///
/// Sync a personal knowledge library against a shared base library with
/// three-way conflict detection, automatic merging, and rollback
#[derive(Parser, Debug)]
#[command(name = "shelfsync")]
#[command(long_about = None, version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Override base library path
    #[arg(long, global = true, value_name = "PATH")]
    pub base: Option<PathBuf>,

    /// Override personal library path
    #[arg(long, global = true, value_name = "PATH")]
    pub personal: Option<PathBuf>,

    /// Use specific config file
    #[arg(long, global = true, value_name = "PATH", conflicts_with = "no_config")]
    pub config: Option<PathBuf>,

    /// Ignore all config files
    #[arg(long, global = true, conflicts_with = "config")]
    pub no_config: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one synchronization of the personal library
    Sync {
        /// Resolve nothing interactively; skip what cannot be auto-merged
        #[arg(long)]
        auto: bool,

        /// Keep the personal side for every conflict without prompting
        #[arg(long, conflicts_with = "auto")]
        yes_all: bool,

        /// Preview changes without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Show pending conflicts and out-of-sync items without changing anything
    Status,

    /// Display differences between the base and personal copy of an item
    Diff {
        /// Item path relative to the library roots
        path: PathBuf,
    },

    /// List past sync operations
    History {
        /// Show only the most recent N operations
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Manage personal-library snapshots
    Snapshot {
        #[command(subcommand)]
        command: SnapshotCommands,
    },

    /// Watch both libraries and sync automatically on changes
    Watch,

    /// Show active configuration and its sources
    Config,
}

#[derive(Subcommand, Debug)]
pub enum SnapshotCommands {
    /// List available snapshots
    List,

    /// Delete old snapshots beyond the retention count
    Prune {
        /// Snapshots to keep (default: configured retention)
        #[arg(long)]
        keep: Option<usize>,
    },

    /// Restore the personal library from a snapshot
    Restore {
        /// Snapshot identifier as shown by `snapshot list`
        id: String,
    },
}
