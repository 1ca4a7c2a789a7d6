//! The engine capability consumed by the compiler.

use crate::ast::{CommentSyntax, Statement};
use crate::error::ParseError;
use crate::postgresql::PostgreSqlParser;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Parses SQL text for one database engine
pub trait Parser: Send + Sync {
    /// Parse text into located statements.
    ///
    /// # Errors
    ///
    /// Returns every statement that failed to parse
    fn parse(&self, text: &str) -> Result<Vec<Statement>, ParseError>;

    /// Comment styles recognized by the engine
    fn comment_syntax(&self) -> CommentSyntax;

    /// Whether `name` must be quoted when used as an identifier
    fn is_reserved_keyword(&self, name: &str) -> bool;
}

/// Supported database engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// PostgreSQL
    #[default]
    PostgreSql,
}

impl Engine {
    /// Engine name as written in configuration
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PostgreSql => "postgresql",
        }
    }

    /// Construct the engine's parser
    #[must_use]
    pub fn parser(&self) -> Box<dyn Parser> {
        match self {
            Self::PostgreSql => Box::new(PostgreSqlParser::new()),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgresql" => Ok(Self::PostgreSql),
            other => Err(format!("unknown engine: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_from_str() {
        assert_eq!("postgresql".parse::<Engine>(), Ok(Engine::PostgreSql));
        assert!("mysql".parse::<Engine>().is_err());
    }

    #[test]
    fn test_engine_parser_comment_syntax() {
        let parser = Engine::PostgreSql.parser();
        assert_eq!(parser.comment_syntax(), CommentSyntax::all());
    }
}
