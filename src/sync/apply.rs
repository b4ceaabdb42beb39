//! Atomic application of resolved content to the personal tree
//!
//! Every write goes through a temp-file-then-rename sequence in the
//! target's own directory, so a crash mid-apply leaves either the old or
//! the new content for each file, never a truncated one.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};

/// One mutation of the personal tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyAction {
    /// Write resolved content to an item
    Write {
        /// Item path relative to the personal tree
        path: PathBuf,
        /// Final content
        content: Vec<u8>,
    },
    /// Remove an item
    Delete {
        /// Item path relative to the personal tree
        path: PathBuf,
    },
}

impl ApplyAction {
    /// The item this action touches
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Write { path, .. } | Self::Delete { path } => path,
        }
    }
}

/// Executes apply actions against the personal tree
pub struct ApplyExecutor {
    personal_root: PathBuf,
    dry_run: bool,
}

impl ApplyExecutor {
    /// Create an executor rooted at the personal tree
    #[must_use]
    pub fn new(personal_root: &Path, dry_run: bool) -> Self {
        Self {
            personal_root: personal_root.to_path_buf(),
            dry_run,
        }
    }

    /// Execute one action.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ApplyWrite`] on any filesystem failure; the
    /// caller is expected to roll back to the pre-apply snapshot.
    pub fn execute(&self, action: &ApplyAction) -> Result<()> {
        if self.dry_run {
            match action {
                ApplyAction::Write { path, .. } => {
                    println!("[DRY RUN] Would write: {}", path.display());
                }
                ApplyAction::Delete { path } => {
                    println!("[DRY RUN] Would delete: {}", path.display());
                }
            }
            return Ok(());
        }

        match action {
            ApplyAction::Write { path, content } => self.write_atomic(path, content),
            ApplyAction::Delete { path } => self.delete(path),
        }
    }

    /// Write via a temp file in the target directory, then rename over
    fn write_atomic(&self, rel_path: &Path, content: &[u8]) -> Result<()> {
        let target = self.personal_root.join(rel_path);
        let fail = |reason: String| SyncError::ApplyWrite {
            path: rel_path.to_path_buf(),
            reason,
        };

        let parent = target
            .parent()
            .ok_or_else(|| fail("target has no parent directory".to_string()))?;
        fs::create_dir_all(parent).map_err(|e| fail(format!("cannot create directory: {e}")))?;

        let file_name = target
            .file_name()
            .ok_or_else(|| fail("target has no file name".to_string()))?
            .to_string_lossy()
            .to_string();
        let tmp_path = parent.join(format!(".{file_name}.shelfsync-tmp"));

        fs::write(&tmp_path, content).map_err(|e| fail(format!("cannot write temp file: {e}")))?;
        if let Err(e) = fs::rename(&tmp_path, &target) {
            let _ = fs::remove_file(&tmp_path);
            return Err(fail(format!("cannot rename into place: {e}")).into());
        }

        Ok(())
    }

    fn delete(&self, rel_path: &Path) -> Result<()> {
        let target = self.personal_root.join(rel_path);
        if !target.exists() {
            return Ok(());
        }
        fs::remove_file(&target).map_err(|e| SyncError::ApplyWrite {
            path: rel_path.to_path_buf(),
            reason: format!("cannot delete: {e}"),
        })?;

        // Drop directories the deletion emptied out
        let mut dir = target.parent();
        while let Some(candidate) = dir {
            if candidate == self.personal_root {
                break;
            }
            if fs::remove_dir(candidate).is_err() {
                break; // not empty or not removable; stop here
            }
            dir = candidate.parent();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_parents_and_content() {
        let tmp = TempDir::new().unwrap();
        let executor = ApplyExecutor::new(tmp.path(), false);

        executor
            .execute(&ApplyAction::Write {
                path: PathBuf::from("topics/deep/item.md"),
                content: b"resolved".to_vec(),
            })
            .unwrap();

        assert_eq!(
            fs::read_to_string(tmp.path().join("topics/deep/item.md")).unwrap(),
            "resolved"
        );
    }

    #[test]
    fn test_write_overwrites_existing() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("item.md"), "old").unwrap();

        let executor = ApplyExecutor::new(tmp.path(), false);
        executor
            .execute(&ApplyAction::Write {
                path: PathBuf::from("item.md"),
                content: b"new".to_vec(),
            })
            .unwrap();

        assert_eq!(fs::read_to_string(tmp.path().join("item.md")).unwrap(), "new");
    }

    #[test]
    fn test_write_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let executor = ApplyExecutor::new(tmp.path(), false);

        executor
            .execute(&ApplyAction::Write {
                path: PathBuf::from("item.md"),
                content: b"x".to_vec(),
            })
            .unwrap();

        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("shelfsync-tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_delete_removes_file_and_empty_dirs() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("item.md"), "x").unwrap();

        let executor = ApplyExecutor::new(tmp.path(), false);
        executor
            .execute(&ApplyAction::Delete {
                path: PathBuf::from("a/b/item.md"),
            })
            .unwrap();

        assert!(!tmp.path().join("a").exists());
    }

    #[test]
    fn test_delete_keeps_nonempty_dirs() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("a")).unwrap();
        fs::write(tmp.path().join("a/gone.md"), "x").unwrap();
        fs::write(tmp.path().join("a/stays.md"), "y").unwrap();

        let executor = ApplyExecutor::new(tmp.path(), false);
        executor
            .execute(&ApplyAction::Delete {
                path: PathBuf::from("a/gone.md"),
            })
            .unwrap();

        assert!(tmp.path().join("a/stays.md").exists());
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let tmp = TempDir::new().unwrap();
        let executor = ApplyExecutor::new(tmp.path(), false);
        assert!(executor
            .execute(&ApplyAction::Delete {
                path: PathBuf::from("never-there.md"),
            })
            .is_ok());
    }

    #[test]
    fn test_write_onto_directory_fails() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("item.md")).unwrap();

        let executor = ApplyExecutor::new(tmp.path(), false);
        let result = executor.execute(&ApplyAction::Write {
            path: PathBuf::from("item.md"),
            content: b"x".to_vec(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let executor = ApplyExecutor::new(tmp.path(), true);

        executor
            .execute(&ApplyAction::Write {
                path: PathBuf::from("item.md"),
                content: b"x".to_vec(),
            })
            .unwrap();

        assert!(!tmp.path().join("item.md").exists());
    }
}
