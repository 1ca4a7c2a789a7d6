//! Query annotations and doc comments.
//!
//! A query is named by a comment of the form `-- name: GetAuthor :one` (or
//! `/* name: GetAuthor :one */`). Other comment lines before or inside the
//! statement become the query's doc comments.

use crate::error::AnalysisErrorKind;
use crate::query::Cmd;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlforge_sql::CommentSyntax;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid query name regex"));

/// Name and command kind of an annotated query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Query name
    pub name: String,
    /// Command kind
    pub cmd: Cmd,
}

/// Comment body of a single line, if the line is a comment the engine understands
fn comment_body(line: &str, syntax: CommentSyntax) -> Option<&str> {
    let line = line.trim();
    if syntax.dash {
        if let Some(body) = line.strip_prefix("--") {
            return Some(body.trim());
        }
    }
    if syntax.slash_star {
        if let Some(body) = line.strip_prefix("/*").and_then(|b| b.strip_suffix("*/")) {
            return Some(body.trim());
        }
    }
    None
}

/// Find the `name:` annotation of a statement.
///
/// Returns `Ok(None)` when the statement is not annotated.
///
/// # Errors
///
/// Returns error if the annotation is malformed
pub fn parse_annotation(
    text: &str,
    syntax: CommentSyntax,
) -> Result<Option<Annotation>, AnalysisErrorKind> {
    for line in text.lines() {
        let Some(body) = comment_body(line, syntax) else {
            continue;
        };
        let Some(rest) = body.strip_prefix("name:") else {
            continue;
        };
        let parts: Vec<&str> = rest.split_whitespace().collect();
        let (name, cmd) = match parts.as_slice() {
            [name, cmd] => (*name, *cmd),
            [_] | [] => return Err(AnalysisErrorKind::MissingCmd(line.trim().to_string())),
            _ => return Err(AnalysisErrorKind::InvalidComment(line.trim().to_string())),
        };
        if !IDENTIFIER.is_match(name) {
            return Err(AnalysisErrorKind::InvalidName(name.to_string()));
        }
        if !cmd.starts_with(':') {
            return Err(AnalysisErrorKind::MissingCmd(line.trim().to_string()));
        }
        let cmd = cmd.parse::<Cmd>().map_err(AnalysisErrorKind::UnknownCmd)?;
        return Ok(Some(Annotation {
            name: name.to_string(),
            cmd,
        }));
    }
    Ok(None)
}

/// Remove whole-line comments from a statement.
///
/// Returns the remaining SQL and the doc comment lines, with the annotation
/// itself dropped.
#[must_use]
pub fn strip_comments(text: &str, syntax: CommentSyntax) -> (String, Vec<String>) {
    let mut sql = Vec::new();
    let mut comments = Vec::new();
    for line in text.lines() {
        match comment_body(line, syntax) {
            Some(body) if body.starts_with("name:") => {}
            Some(body) => comments.push(body.to_string()),
            None => sql.push(line),
        }
    }
    (sql.join("\n").trim().to_string(), comments)
}
