//! PostgreSQL reference engine.

use crate::ast::{CommentSyntax, Statement};
use crate::error::{ParseError, SyntaxError};
use crate::parser::Parser;
use crate::split::split;
use sqlparser::dialect::PostgreSqlDialect;

/// Keywords PostgreSQL reserves outright; these need quoting as identifiers
const RESERVED: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric", "both",
    "case", "cast", "check", "collate", "column", "constraint", "create", "current_catalog",
    "current_date", "current_role", "current_time", "current_timestamp", "current_user",
    "default", "deferrable", "desc", "distinct", "do", "else", "end", "except", "false",
    "fetch", "for", "foreign", "from", "grant", "group", "having", "in", "initially",
    "intersect", "into", "lateral", "leading", "limit", "localtime", "localtimestamp", "not",
    "null", "offset", "on", "only", "or", "order", "placing", "primary", "references",
    "returning", "select", "session_user", "some", "symmetric", "table", "then", "to",
    "trailing", "true", "union", "unique", "user", "using", "variadic", "when", "where",
    "window", "with",
];

/// PostgreSQL parser backed by `sqlparser`
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgreSqlParser;

impl PostgreSqlParser {
    /// Create a new parser
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Parser for PostgreSqlParser {
    fn parse(&self, text: &str) -> Result<Vec<Statement>, ParseError> {
        let dialect = PostgreSqlDialect {};
        let mut statements = Vec::new();
        let mut errors = Vec::new();

        for chunk in split(text, self.comment_syntax()) {
            let sql = &text[chunk.location..chunk.location + chunk.len];
            match sqlparser::parser::Parser::parse_sql(&dialect, sql) {
                Ok(parsed) => statements.extend(
                    parsed
                        .into_iter()
                        .map(|raw| Statement::new(raw, chunk.location, chunk.len)),
                ),
                Err(err) => {
                    tracing::debug!(location = chunk.location, error = %err, "statement failed to parse");
                    errors.push(SyntaxError {
                        message: err.to_string(),
                        location: chunk.location,
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(statements)
        } else {
            Err(ParseError { errors })
        }
    }

    fn comment_syntax(&self) -> CommentSyntax {
        CommentSyntax::all()
    }

    fn is_reserved_keyword(&self, name: &str) -> bool {
        RESERVED.binary_search(&name.to_lowercase().as_str()).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_locations() {
        let text = "CREATE TABLE a (id int);\n-- name: GetA :one\nSELECT * FROM a;";
        let stmts = PostgreSqlParser::new().parse(text).unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].location, 0);
        assert_eq!(stmts[1].location, 25);
        assert!(stmts[1].text(text).starts_with("-- name: GetA :one"));
    }

    #[test]
    fn test_parse_reports_every_failure() {
        let text = "SELEC 1;\nSELECT 1;\nCREAT TABLE x ();";
        let err = PostgreSqlParser::new().parse(text).unwrap_err();
        let locations: Vec<usize> = err.errors.iter().map(|e| e.location).collect();
        assert_eq!(locations, vec![0, 19]);
    }

    #[test]
    fn test_parse_empty() {
        assert!(PostgreSqlParser::new().parse("  -- nothing\n").unwrap().is_empty());
    }

    #[test]
    fn test_reserved_keywords() {
        let parser = PostgreSqlParser::new();
        assert!(parser.is_reserved_keyword("select"));
        assert!(parser.is_reserved_keyword("USER"));
        assert!(!parser.is_reserved_keyword("name"));
    }

    #[test]
    fn test_reserved_list_sorted() {
        assert!(RESERVED.windows(2).all(|w| w[0] < w[1]));
    }
}
