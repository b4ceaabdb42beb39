//! Configuration loading, merging, and validation
//!
//! Configuration comes from TOML files discovered in precedence order:
//! an explicit `--config` path, a `.shelfsync.toml` found walking up
//! from the working directory, then the global XDG config. Array fields
//! merge additively; scalar fields take the highest-precedence value.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Project config file name, searched upward from the working directory
const PROJECT_CONFIG: &str = ".shelfsync.toml";

/// Default quiet window for the filesystem watcher, in milliseconds
const DEFAULT_DEBOUNCE_MS: u64 = 1500;

/// Default number of snapshots kept by pruning
const DEFAULT_RETENTION: usize = 10;

/// Raw, partially-specified configuration as read from one TOML file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Shared upstream tree
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,

    /// User override/addition tree
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personal_dir: Option<PathBuf>,

    /// Engine state location (default: `<personal_dir>/.shelfsync`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    /// Tracked file extensions
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Patterns to exclude from tracking
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Patterns that override ignores
    #[serde(default)]
    pub include: Vec<String>,

    /// Snapshots kept by `snapshot prune`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention: Option<usize>,

    /// Watcher quiet window in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
}

/// Fully-resolved engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShelfConfig {
    /// Shared upstream tree
    pub base_dir: PathBuf,
    /// User override/addition tree
    pub personal_dir: PathBuf,
    /// Engine state location
    pub state_dir: PathBuf,
    /// Tracked file extensions
    pub extensions: Vec<String>,
    /// Patterns to exclude from tracking
    pub ignore: Vec<String>,
    /// Patterns that override ignores
    pub include: Vec<String>,
    /// Snapshots kept by `snapshot prune`
    pub retention: usize,
    /// Watcher quiet window in milliseconds
    pub debounce_ms: u64,
}

/// Discovered config files, lowest precedence first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSources {
    /// Global XDG config, if present
    pub global: Option<PathBuf>,
    /// Nearest `.shelfsync.toml` walking up from the working directory
    pub project: Option<PathBuf>,
    /// Explicit `--config` path
    pub cli: Option<PathBuf>,
}

impl ConfigSources {
    /// Discover available config files
    #[must_use]
    pub fn discover(cli_path: Option<&Path>) -> Self {
        Self {
            global: Self::find_global(),
            project: Self::find_upward(PROJECT_CONFIG),
            cli: cli_path.filter(|p| p.is_file()).map(Path::to_path_buf),
        }
    }

    /// Paths in merge order (lowest precedence first)
    #[must_use]
    pub fn in_merge_order(&self) -> Vec<&Path> {
        [&self.global, &self.project, &self.cli]
            .into_iter()
            .flatten()
            .map(PathBuf::as_path)
            .collect()
    }

    fn find_upward(name: &str) -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !current.pop() {
                break;
            }
        }
        None
    }

    fn find_global() -> Option<PathBuf> {
        let candidate = dirs::config_dir()?.join("shelfsync").join("config.toml");
        candidate.is_file().then_some(candidate)
    }
}

impl ConfigFile {
    /// Parse a single TOML config file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Merge a higher-precedence file into this one.
    ///
    /// Arrays are additive; scalars take the overlay's value when set.
    pub fn merge_from(&mut self, overlay: Self) {
        self.base_dir = overlay.base_dir.or(self.base_dir.take());
        self.personal_dir = overlay.personal_dir.or(self.personal_dir.take());
        self.state_dir = overlay.state_dir.or(self.state_dir.take());
        self.retention = overlay.retention.or(self.retention.take());
        self.debounce_ms = overlay.debounce_ms.or(self.debounce_ms.take());
        self.extensions.extend(overlay.extensions);
        self.ignore.extend(overlay.ignore);
        self.include.extend(overlay.include);
    }
}

impl ShelfConfig {
    /// Load, merge, and validate configuration.
    ///
    /// `base_override` and `personal_override` come from CLI flags and
    /// take precedence over every file.
    ///
    /// # Errors
    ///
    /// Returns an error if a file is malformed, required directories are
    /// missing, or validation fails.
    pub fn load(
        cli_config: Option<&Path>,
        no_config: bool,
        base_override: Option<&Path>,
        personal_override: Option<&Path>,
    ) -> Result<Self> {
        let mut merged = ConfigFile::default();

        if !no_config {
            let sources = ConfigSources::discover(cli_config);
            if cli_config.is_some() && sources.cli.is_none() {
                bail!(
                    "Config file not found: {}",
                    cli_config.unwrap_or(Path::new("?")).display()
                );
            }
            for path in sources.in_merge_order() {
                merged.merge_from(ConfigFile::load(path)?);
            }
        }

        if let Some(base) = base_override {
            merged.base_dir = Some(base.to_path_buf());
        }
        if let Some(personal) = personal_override {
            merged.personal_dir = Some(personal.to_path_buf());
        }

        Self::finalize(merged)
    }

    /// Resolve defaults and validate a merged configuration
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or invalid.
    pub fn finalize(merged: ConfigFile) -> Result<Self> {
        let Some(base_dir) = merged.base_dir else {
            bail!("No base library configured (set base_dir or pass --base)");
        };
        let Some(personal_dir) = merged.personal_dir else {
            bail!("No personal library configured (set personal_dir or pass --personal)");
        };

        let mut extensions = merged.extensions;
        if extensions.is_empty() {
            extensions = ["md", "txt", "toml", "json"]
                .into_iter()
                .map(ToString::to_string)
                .collect();
        }
        extensions.dedup();

        let config = Self {
            state_dir: merged
                .state_dir
                .unwrap_or_else(|| personal_dir.join(".shelfsync")),
            base_dir,
            personal_dir,
            extensions,
            ignore: merged.ignore,
            include: merged.include,
            retention: merged.retention.unwrap_or(DEFAULT_RETENTION),
            debounce_ms: merged.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.base_dir.is_dir() {
            bail!("Base library is not a directory: {}", self.base_dir.display());
        }
        if !self.personal_dir.is_dir() {
            bail!(
                "Personal library is not a directory: {}",
                self.personal_dir.display()
            );
        }
        if self.base_dir == self.personal_dir {
            bail!("Base and personal libraries must be distinct directories");
        }
        if self.retention == 0 {
            bail!("retention must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn libraries(tmp: &TempDir) -> (PathBuf, PathBuf) {
        let base = tmp.path().join("base");
        let personal = tmp.path().join("personal");
        fs::create_dir_all(&base).unwrap();
        fs::create_dir_all(&personal).unwrap();
        (base, personal)
    }

    #[test]
    fn test_finalize_applies_defaults() {
        let tmp = TempDir::new().unwrap();
        let (base, personal) = libraries(&tmp);

        let config = ShelfConfig::finalize(ConfigFile {
            base_dir: Some(base),
            personal_dir: Some(personal.clone()),
            ..ConfigFile::default()
        })
        .unwrap();

        assert_eq!(config.state_dir, personal.join(".shelfsync"));
        assert_eq!(config.retention, DEFAULT_RETENTION);
        assert_eq!(config.debounce_ms, DEFAULT_DEBOUNCE_MS);
        assert!(config.extensions.contains(&"md".to_string()));
    }

    #[test]
    fn test_finalize_requires_both_trees() {
        let tmp = TempDir::new().unwrap();
        let (base, _) = libraries(&tmp);

        let result = ShelfConfig::finalize(ConfigFile {
            base_dir: Some(base),
            ..ConfigFile::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_identical_trees() {
        let tmp = TempDir::new().unwrap();
        let (base, _) = libraries(&tmp);

        let result = ShelfConfig::finalize(ConfigFile {
            base_dir: Some(base.clone()),
            personal_dir: Some(base),
            ..ConfigFile::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_retention() {
        let tmp = TempDir::new().unwrap();
        let (base, personal) = libraries(&tmp);

        let result = ShelfConfig::finalize(ConfigFile {
            base_dir: Some(base),
            personal_dir: Some(personal),
            retention: Some(0),
            ..ConfigFile::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_precedence() {
        let mut low = ConfigFile {
            retention: Some(5),
            debounce_ms: Some(1000),
            ignore: vec!["*.tmp".to_string()],
            ..ConfigFile::default()
        };
        let high = ConfigFile {
            retention: Some(20),
            ignore: vec!["*.log".to_string()],
            ..ConfigFile::default()
        };

        low.merge_from(high);

        // Scalars take the overlay, arrays are additive
        assert_eq!(low.retention, Some(20));
        assert_eq!(low.debounce_ms, Some(1000));
        assert_eq!(low.ignore, vec!["*.tmp".to_string(), "*.log".to_string()]);
    }

    #[test]
    fn test_load_config_file() {
        let tmp = TempDir::new().unwrap();
        let (base, personal) = libraries(&tmp);
        let config_path = tmp.path().join("config.toml");
        fs::write(
            &config_path,
            format!(
                "base_dir = {:?}\npersonal_dir = {:?}\nretention = 3\nignore = [\"drafts/**\"]\n",
                base, personal
            ),
        )
        .unwrap();

        let parsed = ConfigFile::load(&config_path).unwrap();
        assert_eq!(parsed.retention, Some(3));
        assert_eq!(parsed.ignore, vec!["drafts/**".to_string()]);

        let config = ShelfConfig::finalize(parsed).unwrap();
        assert_eq!(config.base_dir, base);
    }

    #[test]
    fn test_load_rejects_malformed_toml() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("broken.toml");
        fs::write(&config_path, "retention = [not toml").unwrap();

        assert!(ConfigFile::load(&config_path).is_err());
    }
}
