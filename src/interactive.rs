//! Interactive prompting for conflict resolution

use anyhow::{Context, Result, bail};
use dialoguer::console::Term;

use shelfsync::conflict::{ChangedItem, ConflictRecord};
use shelfsync::diff::DiffEngine;
use shelfsync::resolution::{Resolution, ResolutionCallback};

/// User's choice for a conflicting item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserChoice {
    /// Take the base library's content
    Base,
    /// Keep the personal library's content
    Personal,
    /// Show both diffs and re-prompt
    Diff,
    /// Leave this conflict for a later sync
    Skip,
    /// Keep the personal side for this and all remaining conflicts
    PersonalAll,
    /// Quit immediately (nothing has been written)
    Quit,
}

/// Session state tracking for an "all" choice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionDecision {
    /// Ask for each conflict
    AskEach,
    /// Keep the personal side for all remaining conflicts
    PersonalAll,
}

/// Interactive prompter for conflict resolution
pub struct InteractivePrompter {
    session_state: SessionDecision,
}

impl InteractivePrompter {
    /// Create a new interactive prompter
    #[must_use]
    pub const fn new() -> Self {
        Self {
            session_state: SessionDecision::AskEach,
        }
    }

    /// Start a session that keeps the personal side everywhere
    #[must_use]
    pub const fn keep_personal_all() -> Self {
        Self {
            session_state: SessionDecision::PersonalAll,
        }
    }

    /// Show the selection prompt
    fn show_prompt() -> Result<UserChoice> {
        let term = Term::stderr();

        print!("Resolve? [b/p/d/s/a/q] (base/personal/diff/skip/all-personal/quit): ");
        std::io::Write::flush(&mut std::io::stdout()).context("Failed to flush stdout")?;

        loop {
            let key = term.read_char().context("Failed to read user input")?;

            // Echo the character
            println!("{key}");

            match key {
                'b' | 'B' => return Ok(UserChoice::Base),
                'p' | 'P' => return Ok(UserChoice::Personal),
                'd' | 'D' => return Ok(UserChoice::Diff),
                's' | 'S' => return Ok(UserChoice::Skip),
                'a' | 'A' => return Ok(UserChoice::PersonalAll),
                'q' | 'Q' => return Ok(UserChoice::Quit),
                '\n' | '\r' => {
                    // Enter key - default to skip
                    println!("(defaulted to 'skip')");
                    return Ok(UserChoice::Skip);
                }
                _ => {
                    println!("Invalid key. Press b/p/d/s/a/q");
                    print!("Resolve? [b/p/d/s/a/q]: ");
                    std::io::Write::flush(&mut std::io::stdout())
                        .context("Failed to flush stdout")?;
                }
            }
        }
    }

    /// Describe the conflict in user-friendly terms
    fn describe_conflict(record: &ConflictRecord, item: &ChangedItem) -> String {
        let shape = match (&item.base, &item.personal) {
            (Some(_), Some(_)) if record.binary => "binary content differs",
            (Some(_), Some(_)) => "both sides edited",
            (None, Some(_)) => "deleted upstream, modified locally",
            (Some(_), None) => "modified upstream, deleted locally",
            (None, None) => "gone on both sides",
        };
        format!(
            "⚠️  Conflict ({shape}):\n  Item: {}",
            record.item_path.display()
        )
    }

    /// Show the ancestor-relative diffs for both sides
    fn show_diff(record: &ConflictRecord) {
        if record.binary {
            println!("\n--- Binary content; no line diff available ---");
            return;
        }
        if record.base_diff.is_empty() && record.personal_diff.is_empty() {
            println!("\n--- No line diff available (one side is absent) ---");
            return;
        }

        let label = record.item_path.display();
        println!();
        println!(
            "{}",
            DiffEngine::render(&record.base_diff, &format!("ancestor/{label}"), &format!("base/{label}"))
        );
        println!(
            "{}",
            DiffEngine::render(
                &record.personal_diff,
                &format!("ancestor/{label}"),
                &format!("personal/{label}")
            )
        );
    }
}

impl ResolutionCallback for InteractivePrompter {
    fn resolve(&mut self, record: &ConflictRecord, item: &ChangedItem) -> Result<Resolution> {
        if self.session_state == SessionDecision::PersonalAll {
            return Ok(Resolution::KeepPersonal);
        }

        println!("\n{}", Self::describe_conflict(record, item));

        loop {
            match Self::show_prompt()? {
                UserChoice::Base => return Ok(Resolution::KeepBase),
                UserChoice::Personal => return Ok(Resolution::KeepPersonal),
                UserChoice::Skip => return Ok(Resolution::Skip),
                UserChoice::PersonalAll => {
                    self.session_state = SessionDecision::PersonalAll;
                    return Ok(Resolution::KeepPersonal);
                }
                UserChoice::Diff => {
                    Self::show_diff(record);
                    // Loop back to re-prompt
                }
                UserChoice::Quit => {
                    bail!("User aborted sync operation");
                }
            }
        }
    }
}

impl Default for InteractivePrompter {
    fn default() -> Self {
        Self::new()
    }
}
