//! Template-driven in-process backend.
//!
//! The backend decides which files a package needs and drives a
//! [`Renderer`] once per file. Every rendered file is parsed as Rust before
//! it is returned.

use crate::backend::{BackendError, BackendResult, GenerateBackend, GenerateContext};
use crate::request::{File, GenerateRequest, GenerateResponse, RustOptions};
use crate::rust::RustRenderer;
use async_trait::async_trait;
use sqlforge_compiler::{Cmd, Query};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Shared connection type and constructor
pub const DB_FILE: &str = "dbFile";
/// Table and enum models
pub const MODELS_FILE: &str = "modelsFile";
/// Trait listing every query
pub const INTERFACE_FILE: &str = "interfaceFile";
/// Bulk inserts
pub const COPYFROM_FILE: &str = "copyfromFile";
/// Batched queries
pub const BATCH_FILE: &str = "batchFile";
/// Queries of one source file
pub const QUERY_FILE: &str = "queryFile";

/// Errors from a renderer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// The renderer has no such template
    #[error("unknown template: {0}")]
    UnknownTemplate(String),

    /// The template could not be rendered
    #[error("render failed: {0}")]
    Failed(String),

    /// Rendered text is not valid source
    #[error("source error: {0}")]
    Source(String),
}

/// What a template is rendered against
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    /// The full request
    pub request: &'a GenerateRequest,
    /// Backend options
    pub options: &'a RustOptions,
    /// Resolved output file names
    pub files: &'a FileNames,
    /// Source file a `queryFile` is rendered for
    pub source_name: Option<&'a str>,
}

impl<'a> TemplateContext<'a> {
    /// Queries the template covers: those of `source_name`, or all of them
    pub fn queries(&self) -> impl Iterator<Item = &'a Query> + 'a {
        let source = self.source_name;
        self.request
            .queries
            .iter()
            .filter(move |q| source.is_none_or(|s| q.filename == s))
    }
}

/// Renders named templates into source text
pub trait Renderer: Send + Sync {
    /// Render `template_name` against `ctx`
    ///
    /// # Errors
    ///
    /// Returns error if the template is unknown or rendering fails
    fn render(&self, template_name: &str, ctx: &TemplateContext<'_>) -> Result<String, RenderError>;
}

/// Output file names after applying overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNames {
    /// Connection file
    pub db: String,
    /// Models file
    pub models: String,
    /// Querier trait file
    pub querier: String,
    /// Copyfrom file
    pub copyfrom: String,
    /// Batch file
    pub batch: String,
    /// Suffix for query files
    pub suffix: String,
}

impl FileNames {
    /// Resolve names from options
    #[must_use]
    pub fn new(options: &RustOptions) -> Self {
        let pick = |name: &Option<String>, default: &str| {
            name.clone().unwrap_or_else(|| default.to_string())
        };
        Self {
            db: pick(&options.output_db_file_name, "db.rs"),
            models: pick(&options.output_models_file_name, "models.rs"),
            querier: pick(&options.output_querier_file_name, "querier.rs"),
            copyfrom: pick(&options.output_copyfrom_file_name, "copyfrom.rs"),
            batch: pick(&options.output_batch_file_name, "batch.rs"),
            suffix: options.output_files_suffix.clone().unwrap_or_default(),
        }
    }

    /// File name for the queries of `source`
    #[must_use]
    pub fn query_file(&self, source: &str) -> String {
        let stem = Path::new(source)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(source);
        format!("{}{}.rs", stem, self.suffix)
    }

    /// Module name of a file (`db.rs` -> `db`)
    #[must_use]
    pub fn module(file: &str) -> &str {
        file.strip_suffix(".rs").unwrap_or(file)
    }
}

/// In-process backend rendering Rust source through a [`Renderer`]
pub struct TemplateBackend<R = RustRenderer> {
    renderer: R,
}

impl TemplateBackend<RustRenderer> {
    /// Backend with the built-in Rust renderer
    #[must_use]
    pub fn new() -> Self {
        Self {
            renderer: RustRenderer::new(),
        }
    }
}

impl Default for TemplateBackend<RustRenderer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Renderer> TemplateBackend<R> {
    /// Backend with a custom renderer
    #[must_use]
    pub fn with_renderer(renderer: R) -> Self {
        Self { renderer }
    }

    fn check_driver(options: &RustOptions, queries: &[Query]) -> BackendResult<()> {
        if options.sql_driver.supports_copy_and_batch() {
            return Ok(());
        }
        match queries.iter().find(|q| q.cmd == Cmd::CopyFrom || q.cmd.is_batch()) {
            Some(query) => Err(BackendError::Precondition(format!(
                "{}: {} is only supported by the tokio-postgres driver, not {}",
                query.name,
                query.cmd,
                options.sql_driver.as_str()
            ))),
            None => Ok(()),
        }
    }

    fn render_all(
        &self,
        ctx: &GenerateContext,
        request: &GenerateRequest,
    ) -> BackendResult<GenerateResponse> {
        let _span = tracing::debug_span!("codegen", backend = "rust").entered();
        let options = request.settings.rust.clone().unwrap_or_default();
        Self::check_driver(&options, &request.queries)?;

        let names = FileNames::new(&options);
        let tctx = TemplateContext {
            request,
            options: &options,
            files: &names,
            source_name: None,
        };

        let mut plan = vec![
            (DB_FILE, names.db.clone()),
            (MODELS_FILE, names.models.clone()),
        ];
        if options.emit_interface {
            plan.push((INTERFACE_FILE, names.querier.clone()));
        }
        if request.queries.iter().any(|q| q.cmd == Cmd::CopyFrom) {
            plan.push((COPYFROM_FILE, names.copyfrom.clone()));
        }
        if request.queries.iter().any(|q| q.cmd.is_batch()) {
            plan.push((BATCH_FILE, names.batch.clone()));
        }

        let mut files = Vec::new();
        for (template, name) in plan {
            files.push(self.render_file(ctx, template, name, &tctx)?);
        }

        let sources: BTreeSet<&str> = request.queries.iter().map(|q| q.filename.as_str()).collect();
        let mut claimed: BTreeMap<String, &str> = BTreeMap::new();
        for source in sources {
            let name = names.query_file(source);
            if let Some(other) = claimed.insert(name.clone(), source) {
                return Err(BackendError::Precondition(format!(
                    "query files {} and {} both map to {}",
                    other, source, name
                )));
            }
            if files.iter().any(|file: &File| file.name == name) {
                return Err(BackendError::Precondition(format!(
                    "query file {} maps to {}, which is already generated",
                    source, name
                )));
            }
            let qctx = TemplateContext {
                source_name: Some(source),
                ..tctx
            };
            files.push(self.render_file(ctx, QUERY_FILE, name, &qctx)?);
        }

        tracing::debug!(files = files.len(), "rendered");
        Ok(GenerateResponse::new(files))
    }

    fn render_file(
        &self,
        ctx: &GenerateContext,
        template: &str,
        name: String,
        tctx: &TemplateContext<'_>,
    ) -> BackendResult<File> {
        if ctx.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        let text = self
            .renderer
            .render(template, tctx)
            .map_err(|source| BackendError::Render {
                template: template.to_string(),
                raw: String::new(),
                source,
            })?;
        if let Err(err) = syn::parse_file(&text) {
            return Err(BackendError::Render {
                template: template.to_string(),
                raw: text,
                source: RenderError::Source(format!("{}: {}", name, err)),
            });
        }
        Ok(File::new(name, text))
    }
}

#[async_trait]
impl<R: Renderer> GenerateBackend for TemplateBackend<R> {
    fn name(&self) -> &str {
        "rust"
    }

    async fn generate(
        &self,
        ctx: &GenerateContext,
        request: &GenerateRequest,
    ) -> BackendResult<GenerateResponse> {
        self.render_all(ctx, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Driver, Settings};
    use sqlforge_compiler::{Compiler, ParseOptions};
    use sqlforge_core::{DebugOptions, SqlSource};
    use sqlforge_sql::Engine;

    const SCHEMA: &str = "CREATE TABLE authors (id BIGSERIAL PRIMARY KEY, name text NOT NULL, bio text);";

    fn request(queries: &str, options: RustOptions) -> GenerateRequest {
        let mut compiler = Compiler::new(Engine::PostgreSql, DebugOptions::new());
        compiler
            .parse_catalog(&[SqlSource::new("schema.sql", SCHEMA)])
            .unwrap();
        compiler
            .parse_queries(&[SqlSource::new("queries.sql", queries)], &ParseOptions::default())
            .unwrap();
        let settings = Settings {
            version: "1".to_string(),
            engine: Engine::PostgreSql,
            package: "authors".to_string(),
            schema: vec!["schema.sql".to_string()],
            queries: vec!["queries.sql".to_string()],
            rust: Some(options),
            json: None,
            codegen: None,
        };
        GenerateRequest::new(settings, compiler.result())
    }

    fn file_names(response: &GenerateResponse) -> Vec<&str> {
        response.files.iter().map(|f| f.name.as_str()).collect()
    }

    struct Broken;

    impl Renderer for Broken {
        fn render(&self, template_name: &str, _ctx: &TemplateContext<'_>) -> Result<String, RenderError> {
            Ok(format!("fn {}(", template_name))
        }
    }

    #[tokio::test]
    async fn test_default_file_set() {
        let request = request(
            "-- name: GetAuthor :one\nSELECT * FROM authors WHERE id = $1;",
            RustOptions::default(),
        );
        let response = TemplateBackend::new()
            .generate(&GenerateContext::new(), &request)
            .await
            .unwrap();
        assert_eq!(file_names(&response), vec!["db.rs", "models.rs", "queries.rs"]);
    }

    #[tokio::test]
    async fn test_optional_files() {
        let options = RustOptions {
            emit_interface: true,
            ..RustOptions::default()
        };
        let request = request(
            "-- name: AddAuthors :copyfrom\nINSERT INTO authors (name, bio) VALUES ($1, $2);\n-- name: DeleteAuthors :batchexec\nDELETE FROM authors WHERE id = $1;",
            options,
        );
        let response = TemplateBackend::new()
            .generate(&GenerateContext::new(), &request)
            .await
            .unwrap();
        assert_eq!(
            file_names(&response),
            vec!["batch.rs", "copyfrom.rs", "db.rs", "models.rs", "querier.rs", "queries.rs"]
        );
    }

    #[tokio::test]
    async fn test_file_name_overrides() {
        let options = RustOptions {
            output_db_file_name: Some("conn.rs".to_string()),
            output_models_file_name: Some("types.rs".to_string()),
            output_files_suffix: Some("_gen".to_string()),
            ..RustOptions::default()
        };
        let request = request("-- name: ListAuthors :many\nSELECT name FROM authors;", options);
        let response = TemplateBackend::new()
            .generate(&GenerateContext::new(), &request)
            .await
            .unwrap();
        assert_eq!(file_names(&response), vec!["conn.rs", "queries_gen.rs", "types.rs"]);
    }

    #[tokio::test]
    async fn test_driver_precondition() {
        let options = RustOptions {
            sql_driver: Driver::Sqlx,
            ..RustOptions::default()
        };
        let request = request(
            "-- name: AddAuthors :copyfrom\nINSERT INTO authors (name) VALUES ($1);",
            options,
        );
        let err = TemplateBackend::new()
            .generate(&GenerateContext::new(), &request)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Precondition(_)));
        assert!(err.to_string().contains("tokio-postgres"));
    }

    #[tokio::test]
    async fn test_invalid_source_reports_raw_text() {
        let request = request("-- name: ListAuthors :many\nSELECT name FROM authors;", RustOptions::default());
        let err = TemplateBackend::with_renderer(Broken)
            .generate(&GenerateContext::new(), &request)
            .await
            .unwrap_err();
        match err {
            BackendError::Render { template, raw, source } => {
                assert_eq!(template, DB_FILE);
                assert_eq!(raw, "fn dbFile(");
                assert!(matches!(source, RenderError::Source(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    fn request_from(sources: &[SqlSource]) -> GenerateRequest {
        let mut compiler = Compiler::new(Engine::PostgreSql, DebugOptions::new());
        compiler
            .parse_catalog(&[SqlSource::new("schema.sql", SCHEMA)])
            .unwrap();
        compiler.parse_queries(sources, &ParseOptions::default()).unwrap();
        let settings = Settings {
            version: "1".to_string(),
            engine: Engine::PostgreSql,
            package: "authors".to_string(),
            schema: vec!["schema.sql".to_string()],
            queries: sources.iter().map(|s| s.name.clone()).collect(),
            rust: Some(RustOptions::default()),
            json: None,
            codegen: None,
        };
        GenerateRequest::new(settings, compiler.result())
    }

    #[tokio::test]
    async fn test_query_files_sharing_a_stem() {
        let request = request_from(&[
            SqlSource::new("a/queries.sql", "-- name: GetAuthor :one\nSELECT * FROM authors WHERE id = $1;"),
            SqlSource::new("b/queries.sql", "-- name: ListAuthors :many\nSELECT * FROM authors;"),
        ]);
        let err = TemplateBackend::new()
            .generate(&GenerateContext::new(), &request)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Precondition(_)));
        assert!(
            err.to_string()
                .contains("query files a/queries.sql and b/queries.sql both map to queries.rs")
        );
    }

    #[tokio::test]
    async fn test_query_file_shadowing_models() {
        let request = request_from(&[SqlSource::new(
            "models.sql",
            "-- name: GetAuthor :one\nSELECT * FROM authors WHERE id = $1;",
        )]);
        let err = TemplateBackend::new()
            .generate(&GenerateContext::new(), &request)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("query file models.sql maps to models.rs"));
    }

    #[test]
    fn test_query_file_name() {
        let names = FileNames::new(&RustOptions::default());
        assert_eq!(names.query_file("sql/authors.sql"), "authors.rs");
        assert_eq!(names.query_file("inline"), "inline.rs");
    }
}
