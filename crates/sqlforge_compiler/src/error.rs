//! Compiler errors.

use sqlforge_core::MultiError;
use sqlforge_sql::SqlError;

/// Why a statement could not be turned into a query
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisErrorKind {
    /// Name resolution against the catalog failed
    #[error(transparent)]
    Catalog(#[from] SqlError),

    /// Column not found in any table in scope
    #[error("column \"{0}\" does not exist")]
    UnknownColumn(String),

    /// Column found in more than one table in scope
    #[error("column reference \"{0}\" is ambiguous")]
    AmbiguousColumn(String),

    /// Qualifier does not name a table in scope
    #[error("missing FROM-clause entry for table \"{0}\"")]
    MissingFromEntry(String),

    /// Placeholder whose type cannot be inferred
    #[error("could not determine data type of parameter ${0}")]
    UntypedParameter(usize),

    /// Construct the analyzer does not handle
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Annotation without a command kind
    #[error("missing query type [':one', ':many', ':exec', ':execresult', ':copyfrom', ':batchexec', ':batchmany', ':batchone']: {0}")]
    MissingCmd(String),

    /// Annotation with an unknown command kind
    #[error("invalid query type: {0}")]
    UnknownCmd(String),

    /// Annotation with extra fields
    #[error("invalid query comment: {0}")]
    InvalidComment(String),

    /// Query name is not an identifier
    #[error("invalid query name: {0}")]
    InvalidName(String),

    /// `:copyfrom` on something other than a single-row INSERT of parameters
    #[error(":copyfrom requires an INSERT INTO with a single VALUES row of parameters")]
    InvalidCopyFrom,
}

/// An analysis failure with the best known position
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}")]
pub struct AnalysisError {
    /// What went wrong
    pub kind: AnalysisErrorKind,
    /// Byte offset in the source, when known more precisely than the statement
    pub location: Option<usize>,
}

impl AnalysisError {
    /// An error located at the enclosing statement
    #[must_use]
    pub fn new(kind: impl Into<AnalysisErrorKind>) -> Self {
        Self {
            kind: kind.into(),
            location: None,
        }
    }

    /// Attach a precise location
    #[must_use]
    pub fn at(mut self, location: usize) -> Self {
        self.location = Some(location);
        self
    }
}

impl From<AnalysisErrorKind> for AnalysisError {
    fn from(kind: AnalysisErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<SqlError> for AnalysisError {
    fn from(err: SqlError) -> Self {
        Self::new(err)
    }
}

/// Errors from query compilation
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// Two queries of one package share a name
    #[error("duplicate query name: {name}")]
    DuplicateName {
        /// The repeated name
        name: String,
    },

    /// Sources held no named queries
    #[error("no queries contained in the package sources")]
    NoQueries,

    /// Every located failure of the phase
    #[error("{0}")]
    Aggregate(MultiError),
}

/// Result type for analysis
pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_error_display() {
        let err = AnalysisError::new(AnalysisErrorKind::UntypedParameter(2));
        assert_eq!(err.to_string(), "could not determine data type of parameter $2");

        let err = AnalysisError::from(SqlError::RelationNotFound("books".to_string())).at(7);
        assert_eq!(err.to_string(), "relation \"books\" does not exist");
        assert_eq!(err.location, Some(7));
    }
}
