//! Aggregated errors with source attribution.
//!
//! A compilation phase keeps going after a failure so that every defect in a
//! package is reported in one pass. Each failure is recorded as a
//! [`FileError`] carrying the source it came from and the byte location of
//! the offending statement; [`MultiError`] is the ordered collection.

use crate::location::LineColumn;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Boxed underlying error
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A single error attributed to a position in a named source
#[derive(Debug)]
pub struct FileError {
    /// Source identifier (file path or inline source name)
    pub filename: String,
    /// Full text of the source the location refers to
    pub text: Arc<str>,
    /// Byte offset in `text`
    pub location: usize,
    /// 1-based line of `location`
    pub line: usize,
    /// 1-based column of `location`
    pub column: usize,
    /// The underlying error
    pub err: BoxError,
}

impl FileError {
    /// Create a new file error, resolving line and column from the text
    #[must_use]
    pub fn new(filename: impl Into<String>, text: Arc<str>, location: usize, err: BoxError) -> Self {
        let LineColumn { line, column } = LineColumn::resolve(&text, location);
        Self {
            filename: filename.into(),
            text,
            location,
            line,
            column,
            err,
        }
    }

    /// Downcast the underlying error
    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.err.downcast_ref::<E>()
    }

    /// The text of the line the error points at
    #[must_use]
    pub fn source_line(&self) -> &str {
        self.text.lines().nth(self.line - 1).unwrap_or("")
    }
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}: {}", self.filename, self.line, self.column, self.err)
    }
}

impl StdError for FileError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.err)
    }
}

/// Ordered, growable collection of [`FileError`]s
#[derive(Debug, Default)]
pub struct MultiError {
    errs: Vec<FileError>,
}

impl MultiError {
    /// Create an empty collection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error at `location` in `text`
    pub fn add(
        &mut self,
        filename: impl Into<String>,
        text: Arc<str>,
        location: usize,
        err: impl Into<BoxError>,
    ) {
        self.errs.push(FileError::new(filename, text, location, err.into()));
    }

    /// Record an already constructed error
    pub fn push(&mut self, err: FileError) {
        self.errs.push(err);
    }

    /// Append every error from another collection
    pub fn extend(&mut self, other: MultiError) {
        self.errs.extend(other.errs);
    }

    /// All recorded errors, in recording order
    #[must_use]
    pub fn errs(&self) -> &[FileError] {
        &self.errs
    }

    /// Number of recorded errors
    #[must_use]
    pub fn len(&self) -> usize {
        self.errs.len()
    }

    /// Whether nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errs.is_empty()
    }

    /// Sort by source (first-seen order of each source), then by position.
    ///
    /// The sort is stable, so errors at the same position keep the order in
    /// which they were recorded.
    #[must_use]
    pub fn sorted(mut self) -> Self {
        let mut order: Vec<&str> = Vec::new();
        let ranks: Vec<usize> = self
            .errs
            .iter()
            .map(|e| match order.iter().position(|f| *f == e.filename) {
                Some(rank) => rank,
                None => {
                    order.push(&e.filename);
                    order.len() - 1
                }
            })
            .collect();
        let mut keyed: Vec<(usize, FileError)> = ranks.into_iter().zip(self.errs.drain(..)).collect();
        keyed.sort_by_key(|(rank, e)| (*rank, e.location));
        self.errs = keyed.into_iter().map(|(_, e)| e).collect();
        self
    }

    /// `Ok(())` when empty, otherwise the collection as an error
    ///
    /// # Errors
    ///
    /// Returns `self` if at least one error was recorded
    pub fn into_result(self) -> Result<(), Self> {
        if self.errs.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errs.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl StdError for MultiError {}

impl IntoIterator for MultiError {
    type Item = FileError;
    type IntoIter = std::vec::IntoIter<FileError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errs.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("bad statement")]
    struct BadStatement;

    fn text(s: &str) -> Arc<str> {
        Arc::from(s)
    }

    #[test]
    fn test_add_resolves_position() {
        let mut merr = MultiError::new();
        merr.add("schema.sql", text("create table a();\nbogus;"), 18, BadStatement);
        let e = &merr.errs()[0];
        assert_eq!((e.line, e.column), (2, 1));
        assert_eq!(e.to_string(), "schema.sql:2:1: bad statement");
        assert_eq!(e.source_line(), "bogus;");
    }

    #[test]
    fn test_downcast() {
        let mut merr = MultiError::new();
        merr.add("q.sql", text("x"), 0, BadStatement);
        assert!(merr.errs()[0].downcast_ref::<BadStatement>().is_some());
        assert!(merr.errs()[0].downcast_ref::<std::fmt::Error>().is_none());
    }

    #[test]
    fn test_into_result() {
        assert!(MultiError::new().into_result().is_ok());
        let mut merr = MultiError::new();
        merr.add("q.sql", text("x"), 0, "boom");
        let err = merr.into_result().unwrap_err();
        assert_eq!(err.len(), 1);
    }

    #[test]
    fn test_sorted_keeps_source_order() {
        let mut merr = MultiError::new();
        merr.add("b.sql", text("0123456789"), 5, "b5");
        merr.add("a.sql", text("0123456789"), 7, "a7");
        merr.add("b.sql", text("0123456789"), 1, "b1");
        merr.add("a.sql", text("0123456789"), 2, "a2");

        let sorted = merr.sorted();
        let msgs: Vec<String> = sorted.errs().iter().map(|e| e.err.to_string()).collect();
        assert_eq!(msgs, vec!["b1", "b5", "a2", "a7"]);
    }

    #[test]
    fn test_display_one_per_line() {
        let mut merr = MultiError::new();
        merr.add("a.sql", text("x\ny"), 0, "first");
        merr.add("a.sql", text("x\ny"), 2, "second");
        assert_eq!(merr.to_string(), "a.sql:1:1: first\na.sql:2:1: second");
    }
}
