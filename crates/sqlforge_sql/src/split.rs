//! Statement splitting with byte locations.
//!
//! `sqlparser` parses a whole script but does not report where each statement
//! starts. The splitter walks the text once, honoring string literals, quoted
//! identifiers, dollar quoting and the engine's comment styles, and yields the
//! byte range of every statement. Comments preceding a statement belong to
//! it, so query annotations travel with the statement they describe.

use crate::ast::CommentSyntax;

/// Byte range of one statement, excluding its terminating semicolon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Byte offset of the first character (comment or code)
    pub location: usize,
    /// Length in bytes with trailing whitespace removed
    pub len: usize,
}

/// Split `text` into statement chunks.
///
/// Chunks holding only comments and whitespace are dropped.
#[must_use]
pub fn split(text: &str, syntax: CommentSyntax) -> Vec<Chunk> {
    let bytes = text.as_bytes();
    let mut chunks = Vec::new();
    let mut start: Option<usize> = None;
    let mut has_code = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if syntax.dash && b == b'-' && bytes.get(i + 1) == Some(&b'-') {
            start.get_or_insert(i);
            i = find_from(bytes, i, b"\n").map_or(bytes.len(), |end| end + 1);
            continue;
        }
        if syntax.slash_star && b == b'/' && bytes.get(i + 1) == Some(&b'*') {
            start.get_or_insert(i);
            i = find_from(bytes, i + 2, b"*/").map_or(bytes.len(), |end| end + 2);
            continue;
        }
        if b == b';' {
            if let Some(s) = start.take() {
                if has_code {
                    chunks.push(chunk(text, s, i));
                }
            }
            has_code = false;
            i += 1;
            continue;
        }
        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        start.get_or_insert(i);
        has_code = true;
        i = match b {
            b'\'' => {
                let escapes = i > 0 && matches!(bytes[i - 1], b'E' | b'e');
                skip_quoted(bytes, i, b'\'', escapes)
            }
            b'"' => skip_quoted(bytes, i, b'"', false),
            b'$' => skip_dollar(bytes, i),
            _ => i + 1,
        };
    }

    if let Some(s) = start {
        if has_code {
            chunks.push(chunk(text, s, bytes.len()));
        }
    }
    chunks
}

fn chunk(text: &str, start: usize, end: usize) -> Chunk {
    let trimmed = text[start..end].trim_end();
    Chunk {
        location: start,
        len: trimmed.len(),
    }
}

fn find_from(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= bytes.len() {
        return None;
    }
    bytes[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Skip a quoted run starting at `open`; doubled quotes are escapes.
fn skip_quoted(bytes: &[u8], open: usize, quote: u8, backslash: bool) -> usize {
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if backslash => i += 2,
            q if q == quote => {
                if bytes.get(i + 1) == Some(&quote) {
                    i += 2;
                } else {
                    return i + 1;
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Skip `$tag$ ... $tag$`; `$1` placeholders and lone dollars advance one byte.
fn skip_dollar(bytes: &[u8], open: usize) -> usize {
    let mut j = open + 1;
    if bytes.get(j).is_some_and(u8::is_ascii_digit) {
        return j;
    }
    while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
        j += 1;
    }
    if bytes.get(j) != Some(&b'$') {
        return open + 1;
    }
    let tag = &bytes[open..=j];
    find_from(bytes, j + 1, tag).map_or(bytes.len(), |end| end + tag.len())
}
