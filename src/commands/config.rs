use shelfsync::config::ConfigSources;

use crate::commands::GlobalOptions;

pub struct Config;

impl Config {
    /// Show the active configuration and where each file came from
    pub fn execute(options: &GlobalOptions) -> anyhow::Result<()> {
        if !options.no_config {
            let sources = ConfigSources::discover(options.config.as_deref());
            let discovered = sources.in_merge_order();

            println!("=== Config Sources (lowest precedence first) ===");
            if discovered.is_empty() {
                println!("(none found; using defaults and CLI flags)");
            }
            for path in discovered {
                println!("  {}", path.display());
            }
            println!();
        }

        let config = options.load_config()?;

        println!("=== Active Configuration ===");
        println!("base_dir:     {}", config.base_dir.display());
        println!("personal_dir: {}", config.personal_dir.display());
        println!("state_dir:    {}", config.state_dir.display());
        println!("extensions:   {}", config.extensions.join(", "));
        println!("ignore:       {}", config.ignore.join(", "));
        println!("include:      {}", config.include.join(", "));
        println!("retention:    {}", config.retention);
        println!("debounce_ms:  {}", config.debounce_ms);

        Ok(())
    }
}
