//! Located statements and comment syntax metadata.

use serde::{Deserialize, Serialize};

/// Which comment styles an engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CommentSyntax {
    /// `-- comment`
    pub dash: bool,
    /// `/* comment */`
    pub slash_star: bool,
}

impl CommentSyntax {
    /// Both dash and slash-star comments
    #[must_use]
    pub const fn all() -> Self {
        Self {
            dash: true,
            slash_star: true,
        }
    }
}

/// A parsed statement and where it sits in its source
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Parsed statement
    pub raw: sqlparser::ast::Statement,
    /// Byte offset of the statement (including its leading comments)
    pub location: usize,
    /// Length in bytes, excluding the terminating semicolon
    pub len: usize,
}

impl Statement {
    /// Create a new located statement
    #[must_use]
    pub fn new(raw: sqlparser::ast::Statement, location: usize, len: usize) -> Self {
        Self { raw, location, len }
    }

    /// Slice the statement's text out of its source
    #[must_use]
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        let end = (self.location + self.len).min(source.len());
        source.get(self.location..end).unwrap_or("")
    }
}
