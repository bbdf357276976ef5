//! Source files and spans
//!
//! Every token and AST node carries a [`Span`] pointing back into the
//! originating [`SourceFile`]. Spans are immutable, 1-indexed for line and
//! column (user-facing), and cheap to copy.

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Source location for error reporting and tooling.
///
/// `line` and `column` are 1-based, matching what an editor or terminal
/// shows a user. `file` is shared (`Rc<str>`) so every token can carry a
/// span without cloning the path string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Span {
    pub file: Rc<str>,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(file: Rc<str>, line: u32, column: u32) -> Self {
        Span { file, line, column }
    }

    /// A span with no useful location, used for synthesized AST nodes
    /// (e.g. desugared compound assignments, generated generic methods).
    pub fn synthetic() -> Self {
        Span {
            file: Rc::from(""),
            line: 0,
            column: 0,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A loaded source file with a line-offset index for O(log n) line lookup
/// and snippet rendering.
#[derive(Debug, Clone)]
pub struct SourceFile {
    path: Rc<str>,
    content: String,
    /// Byte offset of the start of each line (0-indexed line -> offset).
    line_offsets: Vec<usize>,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, content: String) -> Self {
        let path = path.into().to_string_lossy().into_owned();
        let line_offsets = Self::build_line_index(&content);
        SourceFile {
            path: Rc::from(path.as_str()),
            content,
            line_offsets,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::new(path.as_ref(), content))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn file_rc(&self) -> Rc<str> {
        self.path.clone()
    }

    pub fn line_count(&self) -> usize {
        self.line_offsets.len()
    }

    /// Return the text of a 1-based line number, stripped of its trailing
    /// newline. Returns an empty string for out-of-range line numbers,
    /// matching the teacher convention of "no crash, just nothing to show".
    pub fn line(&self, line_number: u32) -> &str {
        if line_number == 0 || line_number as usize > self.line_offsets.len() {
            return "";
        }
        let idx = line_number as usize - 1;
        let start = self.line_offsets[idx];
        let end = self
            .line_offsets
            .get(idx + 1)
            .copied()
            .unwrap_or(self.content.len());
        let mut end = end;
        let bytes = self.content.as_bytes();
        while end > start && (bytes[end - 1] == b'\n' || bytes[end - 1] == b'\r') {
            end -= 1;
        }
        &self.content[start..end]
    }

    /// Render a one-line snippet for a span: the source line plus a caret
    /// pointing at the column, used by human-readable diagnostics.
    pub fn snippet(&self, span: &Span) -> String {
        let line = self.line(span.line);
        if line.is_empty() {
            return String::new();
        }
        line.to_string()
    }

    fn build_line_index(content: &str) -> Vec<usize> {
        let mut offsets = vec![0];
        for (i, b) in content.bytes().enumerate() {
            if b == b'\n' {
                offsets.push(i + 1);
            }
        }
        offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_lookup_handles_first_middle_last() {
        let src = SourceFile::new("t.chr", "a\nbb\nccc".to_string());
        assert_eq!(src.line(1), "a");
        assert_eq!(src.line(2), "bb");
        assert_eq!(src.line(3), "ccc");
        assert_eq!(src.line_count(), 3);
    }

    #[test]
    fn line_lookup_out_of_range_is_empty() {
        let src = SourceFile::new("t.chr", "a\nb".to_string());
        assert_eq!(src.line(0), "");
        assert_eq!(src.line(99), "");
    }

    #[test]
    fn span_display_matches_file_line_column() {
        let span = Span::new(Rc::from("t.chr"), 3, 7);
        assert_eq!(span.to_string(), "t.chr:3:7");
    }
}
