pub mod config;
pub mod diff;
pub mod history;
pub mod snapshot;
pub mod status;
pub mod sync;
pub mod watch;

pub use config::Config;
pub use diff::Diff;
pub use history::History;
pub use snapshot::Snapshot;
pub use status::Status;
pub use sync::Sync;
pub use watch::Watch;

use std::path::PathBuf;

use shelfsync::config::ShelfConfig;

/// Global options shared by every command
pub struct GlobalOptions {
    /// Verbose output enabled
    pub verbose: bool,
    /// Explicit config file path
    pub config: Option<PathBuf>,
    /// Skip config file discovery entirely
    pub no_config: bool,
    /// CLI override for the base library
    pub base: Option<PathBuf>,
    /// CLI override for the personal library
    pub personal: Option<PathBuf>,
}

impl GlobalOptions {
    /// Resolve the effective configuration for this invocation
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or validated.
    pub fn load_config(&self) -> anyhow::Result<ShelfConfig> {
        ShelfConfig::load(
            self.config.as_deref(),
            self.no_config,
            self.base.as_deref(),
            self.personal.as_deref(),
        )
    }
}
