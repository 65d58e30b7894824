use serde::{Deserialize, Serialize};
use std::fmt;

/// Source location span.
///
/// Byte offsets are 0-based and relative to the file identified by
/// `file`. Line/column values are 1-based for human-readable messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    #[serde(rename = "offset")]
    pub start: u32,
    #[serde(rename = "end_offset")]
    pub end: u32,
    #[serde(rename = "line")]
    pub start_line: u32,
    #[serde(rename = "column")]
    pub start_col: u32,
    pub end_line: u32,
    #[serde(rename = "end_column")]
    pub end_col: u32,
    #[serde(rename = "file_index")]
    pub file: u32,
}

impl Span {
    /// Create a new span.
    pub fn new(
        file: u32,
        (start, start_line, start_col): (u32, u32, u32),
        (end, end_line, end_col): (u32, u32, u32),
    ) -> Self {
        Self {
            start,
            end,
            start_line,
            start_col,
            end_line,
            end_col,
            file,
        }
    }

    /// Create a zero-width span at a single position.
    pub fn point(file: u32, offset: u32, line: u32, col: u32) -> Self {
        Self::new(file, (offset, line, col), (offset, line, col))
    }

    /// Merge two spans into one that covers both.
    ///
    /// Spans from different files keep `self`'s start and file; this only
    /// happens when a construct straddles an `#include` boundary.
    pub fn merge(self, other: Span) -> Span {
        if self.file != other.file {
            return self;
        }
        let (start, start_line, start_col) = if other.start < self.start {
            (other.start, other.start_line, other.start_col)
        } else {
            (self.start, self.start_line, self.start_col)
        };
        let (end, end_line, end_col) = if other.end > self.end {
            (other.end, other.end_line, other.end_col)
        } else {
            (self.end, self.end_line, self.end_col)
        };
        Span::new(self.file, (start, start_line, start_col), (end, end_line, end_col))
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_col)
    }
}

/// A named source text, for quoting lines in diagnostics.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub source: String,
    /// Byte offset of each line start.
    lines: Vec<usize>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let mut lines = vec![0];
        lines.extend(
            source
                .bytes()
                .enumerate()
                .filter(|&(_, b)| b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            name: name.into(),
            source,
            lines,
        }
    }

    /// Text of a 1-based line, without its terminator.
    pub fn line(&self, number: u32) -> Option<&str> {
        let index = (number as usize).checked_sub(1)?;
        let start = *self.lines.get(index)?;
        let end = self
            .lines
            .get(index + 1)
            .map_or(self.source.len(), |next| next - 1);
        Some(self.source[start..end].trim_end_matches('\r'))
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// The first line of `span` with a caret underline below it.
    ///
    /// ```text
    /// var x: i32 = 1.5;
    ///              ^^^
    /// ```
    pub fn excerpt(&self, span: &Span) -> Option<String> {
        let text = self.line(span.start_line)?;
        let column = span.start_col.max(1) as usize - 1;
        let width = if span.end_line == span.start_line {
            span.end_col.saturating_sub(span.start_col) as usize
        } else {
            text.chars().count().saturating_sub(column)
        };
        // Keep tabs so the caret lines up.
        let pad: String = text
            .chars()
            .take(column)
            .map(|c| if c == '\t' { '\t' } else { ' ' })
            .collect();
        Some(format!("{text}\n{pad}{}", "^".repeat(width.max(1))))
    }
}
