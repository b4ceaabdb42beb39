use shelfsync::backup::BackupManager;

use crate::cli::SnapshotCommands;
use crate::commands::GlobalOptions;

pub struct Snapshot;

impl Snapshot {
    /// Manage personal-library snapshots
    pub fn execute(command: &SnapshotCommands, options: &GlobalOptions) -> anyhow::Result<()> {
        let config = options.load_config()?;
        let backup = BackupManager::new(&config.state_dir);

        match command {
            SnapshotCommands::List => {
                let snapshots = backup.list()?;
                if snapshots.is_empty() {
                    println!("No snapshots available.");
                    return Ok(());
                }
                for snapshot in snapshots {
                    println!(
                        "{}  {}  ({} items)",
                        snapshot.id,
                        snapshot.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                        snapshot.manifest.len()
                    );
                }
            }
            SnapshotCommands::Prune { keep } => {
                let keep = keep.unwrap_or(config.retention);
                let removed = backup.prune(keep)?;
                if removed.is_empty() {
                    println!("Nothing to prune (keeping {keep}).");
                } else {
                    for id in &removed {
                        println!("Removed snapshot {id}");
                    }
                }
            }
            SnapshotCommands::Restore { id } => {
                backup.restore(id, &config.personal_dir)?;
                println!(
                    "Restored personal library from snapshot {id}: {}",
                    config.personal_dir.display()
                );
            }
        }

        Ok(())
    }
}
