//! Named SQL sources.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// A named piece of SQL text (a schema or query file, or an inline snippet)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlSource {
    /// Source identifier used in diagnostics
    pub name: String,
    /// SQL text
    pub text: Arc<str>,
}

impl SqlSource {
    /// Create a new source
    #[must_use]
    pub fn new(name: impl Into<String>, text: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    /// The file stem of the source name (`queries/authors.sql` -> `authors`)
    #[must_use]
    pub fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stem() {
        assert_eq!(SqlSource::new("queries/authors.sql", "").stem(), "authors");
        assert_eq!(SqlSource::new("inline", "").stem(), "inline");
    }
}
