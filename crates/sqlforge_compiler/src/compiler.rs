//! Per-package compiler.

use crate::analyze::{is_copyfrom_insert, Analyzer};
use crate::error::{AnalysisError, AnalysisErrorKind, CompileError};
use crate::metadata::{parse_annotation, strip_comments};
use crate::migrations::remove_rollback_statements;
use crate::query::{Cmd, Query};
use serde::{Deserialize, Serialize};
use sqlforge_core::{DebugOptions, MultiError, SqlSource};
use sqlforge_sql::{Catalog, Engine, Parser, Statement};
use std::collections::HashSet;

/// Options for query compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Rewrite `*` into explicit column lists in the query text
    pub expand_stars: bool,
    /// Keep comment lines as query doc comments
    pub doc_comments: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            expand_stars: true,
            doc_comments: true,
        }
    }
}

/// Immutable snapshot of a compiled package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledResult {
    /// Schema model
    pub catalog: Catalog,
    /// Queries in source order
    pub queries: Vec<Query>,
}

/// Compiles the schema and queries of one package.
///
/// A compiler owns its catalog; it is created per package and never shared.
pub struct Compiler {
    parser: Box<dyn Parser>,
    catalog: Catalog,
    queries: Vec<Query>,
    debug: DebugOptions,
}

impl Compiler {
    /// Create a compiler for an engine
    #[must_use]
    pub fn new(engine: Engine, debug: DebugOptions) -> Self {
        Self::with_parser(engine.parser(), debug)
    }

    /// Create a compiler with a specific parser
    #[must_use]
    pub fn with_parser(parser: Box<dyn Parser>, debug: DebugOptions) -> Self {
        Self {
            parser,
            catalog: Catalog::new(),
            queries: Vec::new(),
            debug,
        }
    }

    /// The catalog built so far
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Apply every schema source to the catalog.
    ///
    /// Rollback sections are ignored. Failures are collected and processing
    /// continues with the next statement.
    ///
    /// # Errors
    ///
    /// Returns every parse and catalog error, located in its source
    pub fn parse_catalog(&mut self, sources: &[SqlSource]) -> Result<(), MultiError> {
        let _span = tracing::debug_span!("parse_catalog", sources = sources.len()).entered();
        let mut merr = MultiError::new();

        for source in sources {
            let contents = remove_rollback_statements(&source.text);
            let statements = match self.parser.parse(contents) {
                Ok(statements) => statements,
                Err(err) => {
                    for e in err.errors {
                        merr.add(&source.name, source.text.clone(), e.location, e);
                    }
                    continue;
                }
            };
            for stmt in &statements {
                if let Err(err) = self.catalog.update(stmt) {
                    merr.add(&source.name, source.text.clone(), stmt.location, err);
                }
            }
        }

        if self.debug.dump_catalog {
            match serde_json::to_string_pretty(&self.catalog) {
                Ok(dump) => tracing::debug!(catalog = %dump, "catalog"),
                Err(err) => tracing::debug!(error = %err, "catalog dump failed"),
            }
        }
        merr.into_result()
    }

    /// Analyze every annotated query against the catalog.
    ///
    /// Statements that are not queries, and queries without a `name:`
    /// annotation, are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::Aggregate`] with every failure, or
    /// [`CompileError::NoQueries`] if no query was found
    pub fn parse_queries(
        &mut self,
        sources: &[SqlSource],
        options: &ParseOptions,
    ) -> Result<(), CompileError> {
        let _span = tracing::debug_span!("parse_queries", sources = sources.len()).entered();
        let mut merr = MultiError::new();
        let mut names = HashSet::new();
        let mut queries = Vec::new();

        for source in sources {
            let statements = match self.parser.parse(&source.text) {
                Ok(statements) => statements,
                Err(err) => {
                    for e in err.errors {
                        merr.add(&source.name, source.text.clone(), e.location, e);
                    }
                    continue;
                }
            };
            for stmt in statements {
                let location = stmt.location;
                match self.parse_query(stmt, source, options) {
                    Ok(None) => {}
                    Ok(Some(query)) => {
                        if names.insert(query.name.clone()) {
                            queries.push(query);
                        } else {
                            merr.add(
                                &source.name,
                                source.text.clone(),
                                location,
                                CompileError::DuplicateName { name: query.name },
                            );
                        }
                    }
                    Err(err) => {
                        let at = err.location.unwrap_or(location);
                        merr.add(&source.name, source.text.clone(), at, err);
                    }
                }
            }
        }

        tracing::debug!(queries = queries.len(), errors = merr.len(), "queries compiled");
        let empty = queries.is_empty();
        self.queries = queries;
        if !merr.is_empty() {
            return Err(CompileError::Aggregate(merr));
        }
        if empty {
            return Err(CompileError::NoQueries);
        }
        Ok(())
    }

    fn parse_query(
        &self,
        stmt: Statement,
        source: &SqlSource,
        options: &ParseOptions,
    ) -> Result<Option<Query>, AnalysisError> {
        let text = stmt.text(&source.text);
        let syntax = self.parser.comment_syntax();
        let Some(annotation) = parse_annotation(text, syntax)? else {
            return Ok(None);
        };

        let base = stmt.location;
        let mut raw = stmt.raw;
        let Some(analysis) = Analyzer::new(&self.catalog, self.parser.as_ref())
            .with_text(text)
            .analyze(&mut raw, options.expand_stars)
            .map_err(|mut err| {
                err.location = err.location.map(|offset| base + offset);
                err
            })?
        else {
            return Ok(None);
        };
        if annotation.cmd == Cmd::CopyFrom && !is_copyfrom_insert(&raw) {
            return Err(AnalysisErrorKind::InvalidCopyFrom.into());
        }

        let (stripped, comments) = strip_comments(text, syntax);
        let sql = if analysis.expanded { raw.to_string() } else { stripped };
        Ok(Some(Query {
            name: annotation.name,
            filename: source.name.clone(),
            cmd: annotation.cmd,
            sql,
            comments: if options.doc_comments { comments } else { Vec::new() },
            params: analysis.params,
            columns: analysis.columns,
            insert_into: analysis.insert_into,
        }))
    }

    /// Snapshot of the catalog and compiled queries
    #[must_use]
    pub fn result(&self) -> CompiledResult {
        CompiledResult {
            catalog: self.catalog.clone(),
            queries: self.queries.clone(),
        }
    }
}
