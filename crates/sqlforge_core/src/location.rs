//! Byte offset to line/column conversion.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 1-based line and column inside a source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineColumn {
    /// Line number, starting at 1
    pub line: usize,
    /// Column number in characters, starting at 1
    pub column: usize,
}

impl LineColumn {
    /// Resolve a byte offset in `text`.
    ///
    /// Offsets past the end clamp to the end of the text; offsets inside a
    /// multi-byte character snap back to its first byte.
    #[must_use]
    pub fn resolve(text: &str, offset: usize) -> Self {
        let mut offset = offset.min(text.len());
        while !text.is_char_boundary(offset) {
            offset -= 1;
        }
        let head = &text[..offset];
        let line = head.matches('\n').count() + 1;
        let line_start = head.rfind('\n').map_or(0, |i| i + 1);
        let column = head[line_start..].chars().count() + 1;
        Self { line, column }
    }
}

impl fmt::Display for LineColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_start() {
        assert_eq!(LineColumn::resolve("select 1;", 0), LineColumn { line: 1, column: 1 });
    }

    #[test]
    fn test_resolve_second_line() {
        let text = "select 1;\nselect 2;";
        assert_eq!(LineColumn::resolve(text, 10), LineColumn { line: 2, column: 1 });
        assert_eq!(LineColumn::resolve(text, 17), LineColumn { line: 2, column: 8 });
    }

    #[test]
    fn test_resolve_clamps() {
        let pos = LineColumn::resolve("ab\ncd", 99);
        assert_eq!(pos, LineColumn { line: 2, column: 3 });
    }

    #[test]
    fn test_resolve_multibyte() {
        // 'é' is two bytes; offset 2 lands inside it
        let pos = LineColumn::resolve("aé b", 2);
        assert_eq!(pos, LineColumn { line: 1, column: 2 });
        let pos = LineColumn::resolve("aé b", 3);
        assert_eq!(pos, LineColumn { line: 1, column: 3 });
    }

    proptest::proptest! {
        #[test]
        fn prop_resolve_never_panics(text: String, offset: usize) {
            let pos = LineColumn::resolve(&text, offset);
            proptest::prop_assert!(pos.line >= 1);
            proptest::prop_assert!(pos.column >= 1);
        }
    }
}
