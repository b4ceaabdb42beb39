//! Line-oriented diff generation with binary detection
//!
//! Text contents are diffed with an LCS-based algorithm into hunks of
//! context/insert/delete lines. Non-text content is flagged as an opaque
//! binary difference and never participates in line merging.

use std::fmt::Write;
use std::ops::Range;

use similar::{ChangeTag, TextDiff};

/// Number of unchanged context lines kept around each change group
const DIFF_CONTEXT_LINES: usize = 3;

/// How many leading bytes are inspected for the binary heuristic
const BINARY_SNIFF_LEN: usize = 8192;

/// Marker for a single line within a hunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineTag {
    /// Line present only in the new content
    Insert,
    /// Line present only in the old content
    Delete,
    /// Unchanged context line
    Context,
}

/// A single line of a hunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    /// Insert/delete/context marker
    pub tag: LineTag,
    /// Line text without trailing newline
    pub text: String,
}

/// A contiguous group of changes with surrounding context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// Line range in the old content
    pub old_range: Range<usize>,
    /// Line range in the new content
    pub new_range: Range<usize>,
    /// Lines of this hunk in order
    pub lines: Vec<DiffLine>,
}

/// Item content, split by the binary heuristic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemContent {
    /// UTF-8 text, eligible for line diffs and field merging
    Text(String),
    /// Opaque bytes; only whole-file resolutions apply
    Binary(Vec<u8>),
}

impl ItemContent {
    /// Classify raw bytes as text or binary.
    ///
    /// A NUL byte in the leading window, or invalid UTF-8, makes the
    /// content binary.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let sniff = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
        if sniff.contains(&0) {
            return Self::Binary(bytes);
        }
        match String::from_utf8(bytes) {
            Ok(text) => Self::Text(text),
            Err(e) => Self::Binary(e.into_bytes()),
        }
    }

    /// Raw bytes of the content regardless of kind
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(s) => s.as_bytes(),
            Self::Binary(b) => b,
        }
    }

    /// Text view, if this content is textual
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Binary(_) => None,
        }
    }

    /// Whether the binary heuristic fired
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }
}

/// Diff engine for producing hunks and rendered diffs
pub struct DiffEngine;

impl DiffEngine {
    /// Produce hunks between two text contents
    #[must_use]
    pub fn diff(old_text: &str, new_text: &str) -> Vec<Hunk> {
        let diff = TextDiff::from_lines(old_text, new_text);
        let mut hunks = Vec::new();

        for group in diff.grouped_ops(DIFF_CONTEXT_LINES) {
            let Some(first) = group.first() else {
                continue;
            };
            let last = group.last().unwrap_or(first);

            let old_range = first.old_range().start..last.old_range().end;
            let new_range = first.new_range().start..last.new_range().end;

            let mut lines = Vec::new();
            for op in &group {
                for change in diff.iter_changes(op) {
                    let tag = match change.tag() {
                        ChangeTag::Insert => LineTag::Insert,
                        ChangeTag::Delete => LineTag::Delete,
                        ChangeTag::Equal => LineTag::Context,
                    };
                    lines.push(DiffLine {
                        tag,
                        text: change.value().trim_end_matches('\n').to_string(),
                    });
                }
            }

            hunks.push(Hunk {
                old_range,
                new_range,
                lines,
            });
        }

        hunks
    }

    /// Render hunks as a color-coded unified diff
    #[must_use]
    pub fn render(hunks: &[Hunk], old_label: &str, new_label: &str) -> String {
        let mut output = String::new();

        writeln!(output, "\x1b[1m--- {old_label}\x1b[0m")
            .expect("Writing to String should never fail");
        writeln!(output, "\x1b[1m+++ {new_label}\x1b[0m")
            .expect("Writing to String should never fail");

        for hunk in hunks {
            writeln!(
                output,
                "\x1b[36m@@ -{},{} +{},{} @@\x1b[0m",
                hunk.old_range.start + 1,
                hunk.old_range.len(),
                hunk.new_range.start + 1,
                hunk.new_range.len()
            )
            .expect("Writing to String should never fail");

            for line in &hunk.lines {
                let (sign, color) = match line.tag {
                    LineTag::Delete => ("-", "\x1b[31m"), // Red
                    LineTag::Insert => ("+", "\x1b[32m"), // Green
                    LineTag::Context => (" ", "\x1b[0m"), // No color
                };
                writeln!(output, "{color}{sign}{}\x1b[0m", line.text)
                    .expect("Writing to String should never fail");
            }
        }

        output
    }

    /// Render hunks without colors (for reports and testing)
    #[must_use]
    pub fn render_plain(hunks: &[Hunk]) -> String {
        let mut output = String::new();

        for hunk in hunks {
            for line in &hunk.lines {
                let sign = match line.tag {
                    LineTag::Delete => "-",
                    LineTag::Insert => "+",
                    LineTag::Context => " ",
                };
                writeln!(output, "{sign}{}", line.text)
                    .expect("Writing to String should never fail");
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_identical_contents() {
        let hunks = DiffEngine::diff("line 1\nline 2\n", "line 1\nline 2\n");
        assert!(hunks.is_empty());
    }

    #[test]
    fn test_diff_changed_line() {
        let hunks = DiffEngine::diff("line 1\nline 2\nline 3\n", "line 1\nmodified\nline 3\n");
        assert_eq!(hunks.len(), 1);

        let plain = DiffEngine::render_plain(&hunks);
        assert!(plain.contains("-line 2"));
        assert!(plain.contains("+modified"));
    }

    #[test]
    fn test_diff_added_and_removed_lines() {
        let hunks = DiffEngine::diff("a\nb\n", "a\nb\nc\nd\n");
        let plain = DiffEngine::render_plain(&hunks);
        assert!(plain.contains("+c"));
        assert!(plain.contains("+d"));

        let hunks = DiffEngine::diff("a\nb\nc\n", "a\n");
        let plain = DiffEngine::render_plain(&hunks);
        assert!(plain.contains("-b"));
        assert!(plain.contains("-c"));
    }

    #[test]
    fn test_diff_far_apart_changes_split_into_hunks() {
        let old: String = (0..40).map(|i| format!("line {i}\n")).collect();
        let new = old.replace("line 2\n", "LINE 2\n").replace("line 38\n", "LINE 38\n");

        let hunks = DiffEngine::diff(&old, &new);
        assert_eq!(hunks.len(), 2);
    }

    #[test]
    fn test_render_has_colors_and_header() {
        let hunks = DiffEngine::diff("old line\n", "new line\n");
        let rendered = DiffEngine::render(&hunks, "base/item.md", "personal/item.md");

        assert!(rendered.contains("--- base/item.md"));
        assert!(rendered.contains("+++ personal/item.md"));
        assert!(rendered.contains("\x1b[31m")); // Red for deletions
        assert!(rendered.contains("\x1b[32m")); // Green for insertions
    }

    #[test]
    fn test_binary_detection_nul_byte() {
        let content = ItemContent::from_bytes(vec![0x68, 0x69, 0x00, 0x21]);
        assert!(content.is_binary());
        assert!(content.as_text().is_none());
    }

    #[test]
    fn test_binary_detection_invalid_utf8() {
        let content = ItemContent::from_bytes(vec![0xff, 0xfe, 0x41]);
        assert!(content.is_binary());
    }

    #[test]
    fn test_text_content_round_trip() {
        let content = ItemContent::from_bytes(b"plain text".to_vec());
        assert!(!content.is_binary());
        assert_eq!(content.as_text(), Some("plain text"));
        assert_eq!(content.as_bytes(), b"plain text");
    }

    #[test]
    fn test_diff_unicode_content() {
        let hunks = DiffEngine::diff("Hello 世界\n", "Hello World\n");
        assert_eq!(hunks.len(), 1);
    }
}
