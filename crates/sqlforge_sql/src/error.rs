//! Engine and catalog errors.

/// Result type for catalog operations
pub type SqlResult<T> = Result<T, SqlError>;

/// Errors raised while applying statements to, or resolving names in, the catalog
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SqlError {
    /// Relation already exists
    #[error("relation \"{0}\" already exists")]
    RelationExists(String),

    /// Relation not found
    #[error("relation \"{0}\" does not exist")]
    RelationNotFound(String),

    /// Column already exists
    #[error("column \"{column}\" of relation \"{table}\" already exists")]
    ColumnExists {
        /// Table name
        table: String,
        /// Column name
        column: String,
    },

    /// Column not found
    #[error("column \"{column}\" of relation \"{table}\" does not exist")]
    ColumnNotFound {
        /// Table name
        table: String,
        /// Column name
        column: String,
    },

    /// Schema already exists
    #[error("schema \"{0}\" already exists")]
    SchemaExists(String),

    /// Schema not found
    #[error("schema \"{0}\" does not exist")]
    SchemaNotFound(String),

    /// Type already exists
    #[error("type \"{0}\" already exists")]
    TypeExists(String),

    /// Type not found
    #[error("type \"{0}\" does not exist")]
    TypeNotFound(String),
}

/// A single statement that failed to parse
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("syntax error: {message}")]
pub struct SyntaxError {
    /// Parser message
    pub message: String,
    /// Byte offset of the failing statement
    pub location: usize,
}

/// Every statement of a source that failed to parse
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", render(.errors))]
pub struct ParseError {
    /// Failing statements in source order
    pub errors: Vec<SyntaxError>,
}

impl ParseError {
    /// A parse error for the whole source, located at its start
    #[must_use]
    pub fn whole_source(message: impl Into<String>) -> Self {
        Self {
            errors: vec![SyntaxError {
                message: message.into(),
                location: 0,
            }],
        }
    }
}

fn render(errors: &[SyntaxError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
