//! Source positions used by tokens, AST nodes and diagnostics.

use serde::Serialize;
use std::fmt;

/// Byte offset plus 1-based line/column. Line 0 means "no position".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct SourceLoc {
    pub offset: u32,
    pub line: u32,
    pub column: u32,
}

impl SourceLoc {
    pub fn new(offset: u32, line: u32, column: u32) -> Self {
        SourceLoc { offset, line, column }
    }

    pub fn is_known(&self) -> bool {
        self.line != 0
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Half-open span `[start, end)` over the unit text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct SourceSpan {
    pub start: SourceLoc,
    pub end: SourceLoc,
}

impl SourceSpan {
    pub fn new(start: SourceLoc, end: SourceLoc) -> Self {
        SourceSpan { start, end }
    }

    pub fn empty() -> Self {
        SourceSpan::default()
    }

    pub fn is_empty(&self) -> bool {
        !self.start.is_known()
    }

    /// Span covering both `self` and `other`.
    pub fn merge(self, other: SourceSpan) -> SourceSpan {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        let start = if other.start.offset < self.start.offset { other.start } else { self.start };
        let end = if other.end.offset > self.end.offset { other.end } else { self.end };
        SourceSpan { start, end }
    }

    /// The text covered by this span.
    pub fn slice<'s>(&self, source: &'s str) -> &'s str {
        source
            .get(self.start.offset as usize..self.end.offset as usize)
            .unwrap_or("")
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "<unknown>")
        } else {
            write!(f, "{}", self.start)
        }
    }
}
