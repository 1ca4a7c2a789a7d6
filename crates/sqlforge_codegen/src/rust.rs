//! Built-in Rust renderer.
//!
//! Renders `tokio-postgres` or `sqlx` flavoured modules from a request:
//! models for every table and enum, a `Queries` handle, one method per query
//! and, when asked for, a `Querier` trait, bulk copy and batch helpers.

use crate::request::Driver;
use crate::template::{
    FileNames, RenderError, Renderer, TemplateContext, BATCH_FILE, COPYFROM_FILE, DB_FILE,
    INTERFACE_FILE, MODELS_FILE, QUERY_FILE,
};
use sqlforge_compiler::{Cmd, Column, Query};
use sqlforge_sql::{Catalog, Enum, Table};
use std::collections::{BTreeSet, HashSet};

/// SQL type names, their Rust type and their `tokio_postgres::types::Type`
const TYPE_MAP: &[(&[&str], &str, &str)] = &[
    (&["smallint", "int2", "smallserial", "serial2"], "i16", "INT2"),
    (&["integer", "int", "int4", "serial", "serial4"], "i32", "INT4"),
    (&["bigint", "int8", "bigserial", "serial8"], "i64", "INT8"),
    (&["real", "float4"], "f32", "FLOAT4"),
    (&["double precision", "float8", "float"], "f64", "FLOAT8"),
    (&["numeric", "decimal"], "rust_decimal::Decimal", "NUMERIC"),
    (&["boolean", "bool"], "bool", "BOOL"),
    (&["bytea"], "Vec<u8>", "BYTEA"),
    (&["uuid"], "uuid::Uuid", "UUID"),
    (&["date"], "chrono::NaiveDate", "DATE"),
    (&["time", "time without time zone"], "chrono::NaiveTime", "TIME"),
    (&["timestamp", "timestamp without time zone"], "chrono::NaiveDateTime", "TIMESTAMP"),
    (&["timestamptz", "timestamp with time zone"], "chrono::DateTime<chrono::Utc>", "TIMESTAMPTZ"),
    (&["json"], "serde_json::Value", "JSON"),
    (&["jsonb"], "serde_json::Value", "JSONB"),
    (&["varchar", "character varying"], "String", "VARCHAR"),
    (&["any"], "serde_json::Value", "JSON"),
];

const KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "do",
    "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl", "in",
    "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "static", "struct", "trait", "true", "try", "type", "typeof", "unsafe", "unsized",
    "use", "virtual", "where", "while", "yield",
];

/// Renders Rust modules for `tokio-postgres` and `sqlx`
#[derive(Debug, Default, Clone, Copy)]
pub struct RustRenderer;

impl RustRenderer {
    /// Create a renderer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Renderer for RustRenderer {
    fn render(&self, template_name: &str, ctx: &TemplateContext<'_>) -> Result<String, RenderError> {
        let mut w = Writer::default();
        header(&mut w, ctx);
        match template_name {
            DB_FILE => db_file(&mut w, ctx),
            MODELS_FILE => models_file(&mut w, ctx),
            INTERFACE_FILE => interface_file(&mut w, ctx),
            COPYFROM_FILE => copyfrom_file(&mut w, ctx)?,
            BATCH_FILE => batch_file(&mut w, ctx),
            QUERY_FILE => query_file(&mut w, ctx),
            other => return Err(RenderError::UnknownTemplate(other.to_string())),
        }
        Ok(w.buf)
    }
}

#[derive(Default)]
struct Writer {
    buf: String,
    depth: usize,
}

impl Writer {
    fn line(&mut self, text: &str) {
        if !text.is_empty() {
            for _ in 0..self.depth {
                self.buf.push_str("    ");
            }
            self.buf.push_str(text);
        }
        self.buf.push('\n');
    }

    fn open(&mut self, text: &str) {
        self.line(text);
        self.depth += 1;
    }

    fn close(&mut self, text: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.line(text);
    }

    fn blank(&mut self) {
        if !self.buf.ends_with("\n\n") {
            self.buf.push('\n');
        }
    }

    fn docs(&mut self, lines: &[String]) {
        for line in lines {
            self.line(format!("/// {}", line).trim_end());
        }
    }
}

fn header(w: &mut Writer, ctx: &TemplateContext<'_>) {
    w.line("// Code generated by sqlforge. DO NOT EDIT.");
    w.line("// versions:");
    w.line(&format!("//   sqlforge v{}", ctx.request.sqlforge_version));
    if let Some(source) = ctx.source_name {
        w.line(&format!("// source: {}", source));
    }
    w.blank();
}

fn error_type(driver: Driver) -> &'static str {
    match driver {
        Driver::TokioPostgres => "tokio_postgres::Error",
        Driver::Sqlx => "sqlx::Error",
    }
}

fn impl_header(driver: Driver) -> &'static str {
    match driver {
        Driver::TokioPostgres => "impl<C: GenericClient + Sync> Queries<'_, C> {",
        Driver::Sqlx => "impl Queries<'_> {",
    }
}

fn db_file(w: &mut Writer, ctx: &TemplateContext<'_>) {
    let package = &ctx.options.package;
    match ctx.options.sql_driver {
        Driver::TokioPostgres => {
            w.line("use tokio_postgres::GenericClient;");
            w.blank();
            w.line(&format!("/// Typed access to the `{}` queries.", package));
            w.open("pub struct Queries<'a, C> {");
            w.line("pub(crate) client: &'a C,");
            w.close("}");
            w.blank();
            w.open("impl<'a, C: GenericClient> Queries<'a, C> {");
            w.line("/// Wrap a client, connection or transaction.");
            w.open("pub fn new(client: &'a C) -> Self {");
            w.line("Self { client }");
            w.close("}");
            w.close("}");
        }
        Driver::Sqlx => {
            w.line(&format!("/// Typed access to the `{}` queries.", package));
            w.open("pub struct Queries<'a> {");
            w.line("pub(crate) pool: &'a sqlx::PgPool,");
            w.close("}");
            w.blank();
            w.open("impl<'a> Queries<'a> {");
            w.line("/// Wrap a connection pool.");
            w.open("pub fn new(pool: &'a sqlx::PgPool) -> Self {");
            w.line("Self { pool }");
            w.close("}");
            w.close("}");
        }
    }
}

fn derive_line(ctx: &TemplateContext<'_>, base: &[&str], driver_derives: &[&str]) -> String {
    let mut derives: Vec<&str> = base.to_vec();
    derives.extend_from_slice(driver_derives);
    if ctx.options.emit_serde {
        derives.extend_from_slice(&["serde::Serialize", "serde::Deserialize"]);
    }
    format!("#[derive({})]", derives.join(", "))
}

fn models_file(w: &mut Writer, ctx: &TemplateContext<'_>) {
    let catalog = &ctx.request.catalog;
    for model in catalog.enums() {
        enum_model(w, ctx, model);
        w.blank();
    }
    for table in catalog.tables() {
        table_model(w, ctx, catalog, table);
        w.blank();
    }
}

fn enum_model(w: &mut Writer, ctx: &TemplateContext<'_>, model: &Enum) {
    let name = pascal(&model.name);
    let driver = ctx.options.sql_driver;
    let (derives, attr) = match driver {
        Driver::TokioPostgres => (["postgres_types::ToSql", "postgres_types::FromSql"].as_slice(), "postgres"),
        Driver::Sqlx => (["sqlx::Type"].as_slice(), "sqlx"),
    };
    w.line(&derive_line(ctx, &["Debug", "Clone", "Copy", "PartialEq", "Eq", "Hash"], derives));
    match driver {
        Driver::TokioPostgres => w.line(&format!("#[postgres(name = {:?})]", model.name)),
        Driver::Sqlx => w.line(&format!("#[sqlx(type_name = {:?})]", model.name)),
    }
    w.open(&format!("pub enum {} {{", name));
    let variants = unique(model.values.iter().map(String::as_str).map(pascal));
    for (label, variant) in model.values.iter().zip(&variants) {
        match driver {
            Driver::TokioPostgres => w.line(&format!("#[{}(name = {:?})]", attr, label)),
            Driver::Sqlx => w.line(&format!("#[{}(rename = {:?})]", attr, label)),
        }
        w.line(&format!("{},", variant));
    }
    w.close("}");
    w.blank();
    w.open(&format!("impl {} {{", name));
    w.line("/// Label as stored in the database.");
    w.open("pub const fn as_str(&self) -> &'static str {");
    w.open("match self {");
    for (label, variant) in model.values.iter().zip(&variants) {
        w.line(&format!("Self::{} => {:?},", variant, label));
    }
    w.close("}");
    w.close("}");
    w.close("}");
}

fn model_name(catalog: &Catalog, table: &Table) -> String {
    let singular = singular(&table.name.name);
    if table.name.schema == catalog.default_schema {
        pascal(&singular)
    } else {
        pascal(&format!("{}_{}", table.name.schema, singular))
    }
}

fn table_model(w: &mut Writer, ctx: &TemplateContext<'_>, catalog: &Catalog, table: &Table) {
    let driver_derives: &[&str] = match ctx.options.sql_driver {
        Driver::TokioPostgres => &[],
        Driver::Sqlx => &["sqlx::FromRow"],
    };
    w.line(&derive_line(ctx, &["Debug", "Clone", "PartialEq"], driver_derives));
    w.open(&format!("pub struct {} {{", model_name(catalog, table)));
    let columns: Vec<Column> = table
        .columns
        .iter()
        .map(|c| Column::from_catalog(catalog, &table.name, c))
        .collect();
    for (field, column) in fields(&columns) {
        w.line(&format!("pub {}: {},", field, rust_type(column).owned));
    }
    w.close("}");
}

/// The Rust shape of a query's result
enum RowShape {
    Scalar(String),
    Struct {
        name: String,
        model: bool,
        fields: Vec<(String, Column)>,
    },
}

impl RowShape {
    fn for_query(query: &Query, catalog: &Catalog) -> Option<Self> {
        match query.columns.as_slice() {
            [] => None,
            [column] => Some(Self::Scalar(rust_type(column).owned)),
            columns => {
                let fields = fields(columns)
                    .into_iter()
                    .map(|(f, c)| (f, c.clone()))
                    .collect();
                let model = columns[0].table.as_ref().and_then(|name| {
                    let table = catalog.get_table(name).ok()?;
                    let same = table.columns.len() == columns.len()
                        && table
                            .columns
                            .iter()
                            .zip(columns)
                            .all(|(t, c)| c.table.as_ref() == Some(name) && t.name == c.name);
                    same.then(|| model_name(catalog, table))
                });
                Some(match model {
                    Some(name) => Self::Struct {
                        name,
                        model: true,
                        fields,
                    },
                    None => Self::Struct {
                        name: format!("{}Row", pascal(&query.name)),
                        model: false,
                        fields,
                    },
                })
            }
        }
    }

    fn type_name(&self) -> &str {
        match self {
            Self::Scalar(ty) => ty,
            Self::Struct { name, .. } => name,
        }
    }

    /// Expression building the value from a `tokio_postgres::Row` named `row`
    fn construct(&self) -> String {
        match self {
            Self::Scalar(_) => "row.try_get(0)?".to_string(),
            Self::Struct { name, fields, .. } => {
                let inits: Vec<String> = fields
                    .iter()
                    .enumerate()
                    .map(|(i, (field, _))| format!("{}: row.try_get({})?", field, i))
                    .collect();
                format!("{} {{ {} }}", name, inits.join(", "))
            }
        }
    }
}

struct Arg {
    name: String,
    owned: String,
    param: String,
}

fn args(query: &Query) -> Vec<Arg> {
    let mut seen = HashSet::new();
    query
        .params
        .iter()
        .map(|p| {
            let base = if p.column.name.is_empty() {
                format!("p{}", p.number)
            } else {
                ident(&snake(&p.column.name))
            };
            let name = if seen.insert(base.clone()) {
                base
            } else {
                format!("{}_{}", base, p.number)
            };
            let ty = rust_type(&p.column);
            Arg {
                name,
                owned: ty.owned,
                param: ty.param,
            }
        })
        .collect()
}

fn const_name(query: &Query) -> String {
    snake(&query.name).to_uppercase()
}

fn returns(query: &Query, shape: Option<&RowShape>, driver: Driver) -> String {
    let ty = match (query.cmd, shape) {
        (Cmd::ExecResult, _) => match driver {
            Driver::TokioPostgres => "u64".to_string(),
            Driver::Sqlx => "sqlx::postgres::PgQueryResult".to_string(),
        },
        (Cmd::One, Some(shape)) => shape.type_name().to_string(),
        (Cmd::Many, Some(shape)) => format!("Vec<{}>", shape.type_name()),
        _ => "()".to_string(),
    };
    format!("Result<{}, {}>", ty, error_type(driver))
}

fn signature(query: &Query, shape: Option<&RowShape>, driver: Driver, public: bool) -> String {
    let params: String = args(query)
        .iter()
        .map(|a| format!(", {}: {}", a.name, a.param))
        .collect();
    format!(
        "{}async fn {}(&self{}) -> {}",
        if public { "pub " } else { "" },
        ident(&snake(&query.name)),
        params,
        returns(query, shape, driver)
    )
}

fn raw_string(text: &str) -> String {
    let mut hashes = String::from("#");
    while text.contains(&format!("\"{}", hashes)) {
        hashes.push('#');
    }
    format!("r{h}\"{t}\"{h}", h = hashes, t = text)
}

fn uses(w: &mut Writer, ctx: &TemplateContext<'_>, extra: &[String]) {
    w.line(&format!("use super::{}::Queries;", FileNames::module(&ctx.files.db)));
    w.line("#[allow(unused_imports)]");
    w.line(&format!("use super::{}::*;", FileNames::module(&ctx.files.models)));
    for line in extra {
        w.line(line);
    }
    if ctx.options.sql_driver == Driver::TokioPostgres {
        w.line("use tokio_postgres::GenericClient;");
    }
    w.blank();
}

fn query_modules(ctx: &TemplateContext<'_>) -> Vec<String> {
    let sources: BTreeSet<&str> = ctx.request.queries.iter().map(|q| q.filename.as_str()).collect();
    sources
        .into_iter()
        .map(|s| FileNames::module(&ctx.files.query_file(s)).to_string())
        .collect()
}

fn query_file(w: &mut Writer, ctx: &TemplateContext<'_>) {
    let driver = ctx.options.sql_driver;
    let catalog = &ctx.request.catalog;
    uses(w, ctx, &[]);

    let queries: Vec<&Query> = ctx.queries().collect();
    for query in &queries {
        w.line(&format!("/// SQL for `{}`.", query.name));
        w.line(&format!("pub const {}: &str = {};", const_name(query), raw_string(&query.sql)));
        w.blank();
    }

    let methods: Vec<&Query> = queries
        .iter()
        .copied()
        .filter(|q| q.cmd != Cmd::CopyFrom && !q.cmd.is_batch())
        .collect();
    for query in &methods {
        if let Some(RowShape::Struct {
            name,
            model: false,
            fields,
        }) = RowShape::for_query(query, catalog)
        {
            let driver_derives: &[&str] = match driver {
                Driver::TokioPostgres => &[],
                Driver::Sqlx => &["sqlx::FromRow"],
            };
            w.line(&format!("/// Row returned by `{}`.", query.name));
            w.line(&derive_line(ctx, &["Debug", "Clone", "PartialEq"], driver_derives));
            w.open(&format!("pub struct {} {{", name));
            for (field, column) in &fields {
                w.line(&format!("pub {}: {},", field, rust_type(column).owned));
            }
            w.close("}");
            w.blank();
        }
    }

    if methods.is_empty() {
        return;
    }
    w.open(impl_header(driver));
    for (i, query) in methods.iter().enumerate() {
        if i > 0 {
            w.blank();
        }
        let shape = RowShape::for_query(query, catalog);
        w.docs(&query.comments);
        w.open(&format!("{} {{", signature(query, shape.as_ref(), driver, true)));
        method_body(w, query, shape.as_ref(), driver);
        w.close("}");
    }
    w.close("}");
}

fn method_body(w: &mut Writer, query: &Query, shape: Option<&RowShape>, driver: Driver) {
    let sql = const_name(query);
    let args = args(query);
    match driver {
        Driver::TokioPostgres => {
            let params: Vec<String> = args.iter().map(|a| format!("&{}", a.name)).collect();
            let params = format!("&[{}]", params.join(", "));
            match (query.cmd, shape) {
                (Cmd::ExecResult, _) => {
                    w.line(&format!("self.client.execute({}, {}).await", sql, params));
                }
                (Cmd::One, Some(shape)) => {
                    w.line(&format!("let row = self.client.query_one({}, {}).await?;", sql, params));
                    w.line(&format!("Ok({})", shape.construct()));
                }
                (Cmd::Many, Some(shape)) => {
                    w.line(&format!("let rows = self.client.query({}, {}).await?;", sql, params));
                    w.line(&format!("rows.iter().map(|row| Ok({})).collect()", shape.construct()));
                }
                _ => {
                    w.line(&format!("self.client.execute({}, {}).await?;", sql, params));
                    w.line("Ok(())");
                }
            }
        }
        Driver::Sqlx => {
            let binds: String = args.iter().map(|a| format!(".bind({})", a.name)).collect();
            let fetch = |shape: &RowShape, method: &str| match shape {
                RowShape::Scalar(ty) => format!(
                    "sqlx::query_scalar::<_, {}>({}){}.{}(self.pool).await",
                    ty, sql, binds, method
                ),
                RowShape::Struct { name, .. } => format!(
                    "sqlx::query_as::<_, {}>({}){}.{}(self.pool).await",
                    name, sql, binds, method
                ),
            };
            match (query.cmd, shape) {
                (Cmd::ExecResult, _) => {
                    w.line(&format!("sqlx::query({}){}.execute(self.pool).await", sql, binds));
                }
                (Cmd::One, Some(shape)) => w.line(&fetch(shape, "fetch_one")),
                (Cmd::Many, Some(shape)) => w.line(&fetch(shape, "fetch_all")),
                _ => {
                    w.line(&format!("sqlx::query({}){}.execute(self.pool).await?;", sql, binds));
                    w.line("Ok(())");
                }
            }
        }
    }
}

fn interface_file(w: &mut Writer, ctx: &TemplateContext<'_>) {
    let driver = ctx.options.sql_driver;
    let catalog = &ctx.request.catalog;
    let imports: Vec<String> = query_modules(ctx)
        .into_iter()
        .map(|m| format!("#[allow(unused_imports)]\nuse super::{}::*;", m))
        .collect();
    uses(w, ctx, &imports);

    let methods: Vec<&Query> = ctx
        .request
        .queries
        .iter()
        .filter(|q| q.cmd != Cmd::CopyFrom && !q.cmd.is_batch())
        .collect();

    w.line("/// Every query of the package.");
    w.open("pub trait Querier {");
    for query in &methods {
        let shape = RowShape::for_query(query, catalog);
        w.docs(&query.comments);
        w.line(&format!("{};", signature(query, shape.as_ref(), driver, false)));
    }
    w.close("}");
    w.blank();

    let header = match driver {
        Driver::TokioPostgres => "impl<C: GenericClient + Sync> Querier for Queries<'_, C> {",
        Driver::Sqlx => "impl Querier for Queries<'_> {",
    };
    w.open(header);
    for (i, query) in methods.iter().enumerate() {
        if i > 0 {
            w.blank();
        }
        let shape = RowShape::for_query(query, catalog);
        let call: Vec<String> = std::iter::once("self".to_string())
            .chain(args(query).into_iter().map(|a| a.name))
            .collect();
        w.open(&format!("{} {{", signature(query, shape.as_ref(), driver, false)));
        w.line(&format!(
            "Queries::{}({}).await",
            ident(&snake(&query.name)),
            call.join(", ")
        ));
        w.close("}");
    }
    w.close("}");
}

fn params_struct(w: &mut Writer, ctx: &TemplateContext<'_>, query: &Query, name: &str) {
    w.line(&format!("/// Arguments of one `{}` row.", query.name));
    w.line(&derive_line(ctx, &["Debug", "Clone", "PartialEq"], &[]));
    w.open(&format!("pub struct {} {{", name));
    for arg in args(query) {
        w.line(&format!("pub {}: {},", arg.name, arg.owned));
    }
    w.close("}");
    w.blank();
}

fn copyfrom_file(w: &mut Writer, ctx: &TemplateContext<'_>) -> Result<(), RenderError> {
    w.line(&format!("use super::{}::Queries;", FileNames::module(&ctx.files.db)));
    w.line("#[allow(unused_imports)]");
    w.line(&format!("use super::{}::*;", FileNames::module(&ctx.files.models)));
    w.line("use tokio_postgres::binary_copy::BinaryCopyInWriter;");
    w.line("use tokio_postgres::types::{ToSql, Type};");
    w.blank();

    let queries: Vec<&Query> = ctx.queries().filter(|q| q.cmd == Cmd::CopyFrom).collect();
    for query in &queries {
        params_struct(w, ctx, query, &format!("{}Params", pascal(&query.name)));
    }

    w.open("impl Queries<'_, tokio_postgres::Client> {");
    for (i, query) in queries.iter().enumerate() {
        if i > 0 {
            w.blank();
        }
        let table = query.insert_into.as_ref().ok_or_else(|| {
            RenderError::Failed(format!("{}: :copyfrom query has no target table", query.name))
        })?;
        let columns: Vec<&str> = query.params.iter().map(|p| p.column.name.as_str()).collect();
        let types: Vec<String> = query.params.iter().map(|p| format!("Type::{}", pg_type(&p.column))).collect();
        let fields: Vec<String> = args(query).iter().map(|a| format!("&row.{}", a.name)).collect();
        let copy = format!("COPY {} ({}) FROM STDIN BINARY", table, columns.join(", "));

        w.docs(&query.comments);
        w.open(&format!(
            "pub async fn {}(&self, rows: &[{}Params]) -> Result<u64, tokio_postgres::Error> {{",
            ident(&snake(&query.name)),
            pascal(&query.name)
        ));
        w.line(&format!("let sink = self.client.copy_in({:?}).await?;", copy));
        w.line(&format!("let writer = BinaryCopyInWriter::new(sink, &[{}]);", types.join(", ")));
        w.line("let mut writer = std::pin::pin!(writer);");
        w.open("for row in rows {");
        w.line(&format!(
            "let values: &[&(dyn ToSql + Sync)] = &[{}];",
            fields.join(", ")
        ));
        w.line("writer.as_mut().write(values).await?;");
        w.close("}");
        w.line("writer.finish().await");
        w.close("}");
    }
    w.close("}");
    Ok(())
}

fn batch_file(w: &mut Writer, ctx: &TemplateContext<'_>) {
    let catalog = &ctx.request.catalog;
    let mut imports: Vec<String> = query_modules(ctx)
        .into_iter()
        .map(|m| format!("use super::{}::*;", m))
        .collect();
    imports.push("use tokio_postgres::types::ToSql;".to_string());
    uses(w, ctx, &imports);

    let queries: Vec<&Query> = ctx.queries().filter(|q| q.cmd.is_batch()).collect();
    let mut items = Vec::new();
    for query in &queries {
        let args = args(query);
        let item = match args.as_slice() {
            [] => "()".to_string(),
            [single] => single.owned.clone(),
            _ => {
                let name = format!("{}Params", pascal(&query.name));
                params_struct(w, ctx, query, &name);
                name
            }
        };
        items.push(item);
    }

    w.open("impl<C: GenericClient + Sync> Queries<'_, C> {");
    for (i, (query, item)) in queries.iter().zip(&items).enumerate() {
        if i > 0 {
            w.blank();
        }
        let shape = RowShape::for_query(query, catalog);
        let args = args(query);
        let values: Vec<String> = match args.as_slice() {
            [] => Vec::new(),
            [_] => vec!["item".to_string()],
            many => many.iter().map(|a| format!("&item.{}", a.name)).collect(),
        };
        let (result, call) = match (query.cmd, shape.as_ref()) {
            (Cmd::BatchOne, Some(shape)) => (
                shape.type_name().to_string(),
                format!(
                    "self.client.query_one(statement, values).await.and_then(|row| Ok({}))",
                    shape.construct()
                ),
            ),
            (Cmd::BatchMany, Some(shape)) => (
                format!("Vec<{}>", shape.type_name()),
                format!(
                    "self.client.query(statement, values).await.and_then(|rows| rows.iter().map(|row| Ok({})).collect())",
                    shape.construct()
                ),
            ),
            _ => (
                "()".to_string(),
                "self.client.execute(statement, values).await.map(|_| ())".to_string(),
            ),
        };

        w.docs(&query.comments);
        w.open(&format!(
            "pub async fn {}(&self, items: &[{}]) -> Vec<Result<{}, tokio_postgres::Error>> {{",
            ident(&snake(&query.name)),
            item,
            result
        ));
        w.open(&format!("let statement = match self.client.prepare({}).await {{", const_name(query)));
        w.line("Ok(statement) => statement,");
        w.line("Err(err) => return vec![Err(err)],");
        w.close("};");
        w.open("let calls = items.iter().map(|item| {");
        w.line("let statement = &statement;");
        w.open("async move {");
        w.line(&format!("let values: &[&(dyn ToSql + Sync)] = &[{}];", values.join(", ")));
        w.line(&call);
        w.close("}");
        w.close("});");
        w.line("futures::future::join_all(calls).await");
        w.close("}");
    }
    w.close("}");
}

struct RustType {
    owned: String,
    param: String,
}

fn rust_type(column: &Column) -> RustType {
    let base = if column.is_enum {
        pascal(&column.data_type)
    } else {
        TYPE_MAP
            .iter()
            .find(|(names, _, _)| names.contains(&column.data_type.as_str()))
            .map_or("String", |(_, ty, _)| ty)
            .to_string()
    };
    let (owned, param) = if column.is_array {
        (format!("Vec<{}>", base), format!("&[{}]", base))
    } else {
        let param = match base.as_str() {
            "String" => "&str".to_string(),
            "Vec<u8>" => "&[u8]".to_string(),
            "serde_json::Value" => "&serde_json::Value".to_string(),
            other => other.to_string(),
        };
        (base, param)
    };
    if column.not_null {
        RustType { owned, param }
    } else {
        RustType {
            owned: format!("Option<{}>", owned),
            param: format!("Option<{}>", param),
        }
    }
}

fn pg_type(column: &Column) -> String {
    let base = if column.is_enum {
        "TEXT"
    } else {
        TYPE_MAP
            .iter()
            .find(|(names, _, _)| names.contains(&column.data_type.as_str()))
            .map_or("TEXT", |(_, _, pg)| pg)
    };
    if column.is_array {
        format!("{}_ARRAY", base)
    } else {
        base.to_string()
    }
}

/// Struct fields for columns, made unique
fn fields(columns: &[Column]) -> Vec<(String, &Column)> {
    let names = unique(columns.iter().map(|c| ident(&snake(&c.name))));
    names.into_iter().zip(columns).collect()
}

fn unique(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .enumerate()
        .map(|(i, name)| {
            if seen.insert(name.clone()) {
                name
            } else {
                let renamed = format!("{}_{}", name, i + 1);
                seen.insert(renamed.clone());
                renamed
            }
        })
        .collect()
}

/// A valid Rust identifier for `name`
fn ident(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    match out.as_str() {
        "self" | "Self" | "super" | "crate" | "_" => format!("{}_", out),
        kw if KEYWORDS.contains(&kw) => format!("r#{}", out),
        _ => out,
    }
}

/// `GetAuthor` -> `get_author`, `HTTPServer` -> `http_server`
fn snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower) {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// `book_status` -> `BookStatus`
fn pascal(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for part in name.split(|c: char| !c.is_ascii_alphanumeric()) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    if out.is_empty() {
        return "Value".to_string();
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, 'V');
    }
    out
}

/// Naive English singular of a table name
fn singular(name: &str) -> String {
    if let Some(stem) = name.strip_suffix("ies") {
        format!("{}y", stem)
    } else if name.ends_with("sses") || name.ends_with("xes") {
        name[..name.len() - 2].to_string()
    } else if name.ends_with('s') && !name.ends_with("ss") {
        name[..name.len() - 1].to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{GenerateRequest, RustOptions, Settings};
    use sqlforge_compiler::{Compiler, ParseOptions};
    use sqlforge_core::{DebugOptions, SqlSource};
    use sqlforge_sql::Engine;

    const SCHEMA: &str = "
        CREATE TYPE book_status AS ENUM ('draft', 'in print');
        CREATE TABLE authors (id BIGSERIAL PRIMARY KEY, name text NOT NULL, bio text);
        CREATE TABLE books (id BIGINT PRIMARY KEY, author_id BIGINT NOT NULL, title text NOT NULL, status book_status NOT NULL, tags text[]);
    ";

    const QUERIES: &str = "
        -- name: GetAuthor :one
        -- Fetch one author.
        SELECT * FROM authors WHERE id = $1;

        -- name: ListTitles :many
        SELECT b.title, a.name FROM books b JOIN authors a ON a.id = b.author_id WHERE b.status = $1;

        -- name: CountAuthors :one
        SELECT count(*) FROM authors;

        -- name: UpdateBio :execresult
        UPDATE authors SET bio = $1 WHERE id = $2;

        -- name: AddAuthors :copyfrom
        INSERT INTO authors (name, bio) VALUES ($1, $2);

        -- name: DeleteAuthor :batchexec
        DELETE FROM authors WHERE id = $1;

        -- name: CreateBooks :batchone
        INSERT INTO books (id, author_id, title, status) VALUES ($1, $2, $3, $4) RETURNING *;
    ";

    fn request(options: RustOptions) -> GenerateRequest {
        let mut compiler = Compiler::new(Engine::PostgreSql, DebugOptions::new());
        compiler.parse_catalog(&[SqlSource::new("schema.sql", SCHEMA)]).unwrap();
        compiler
            .parse_queries(&[SqlSource::new("query.sql", QUERIES)], &ParseOptions::default())
            .unwrap();
        let settings = Settings {
            version: "1".to_string(),
            engine: Engine::PostgreSql,
            package: "library".to_string(),
            schema: vec!["schema.sql".to_string()],
            queries: vec!["query.sql".to_string()],
            rust: Some(options.clone()),
            json: None,
            codegen: None,
        };
        GenerateRequest::new(settings, compiler.result())
    }

    fn render_all(options: RustOptions) -> Vec<(String, String)> {
        let request = request(options.clone());
        let files = FileNames::new(&options);
        let ctx = TemplateContext {
            request: &request,
            options: &options,
            files: &files,
            source_name: None,
        };
        let mut out = Vec::new();
        for template in [DB_FILE, MODELS_FILE, INTERFACE_FILE, COPYFROM_FILE, BATCH_FILE] {
            out.push((template.to_string(), RustRenderer.render(template, &ctx).unwrap()));
        }
        let qctx = TemplateContext {
            source_name: Some("query.sql"),
            ..ctx
        };
        out.push((QUERY_FILE.to_string(), RustRenderer.render(QUERY_FILE, &qctx).unwrap()));
        out
    }

    #[test]
    fn test_tokio_postgres_output_parses() {
        let options = RustOptions {
            emit_interface: true,
            emit_serde: true,
            ..RustOptions::default()
        };
        for (template, text) in render_all(options) {
            if let Err(err) = syn::parse_file(&text) {
                panic!("{} does not parse: {}\n{}", template, err, text);
            }
        }
    }

    #[test]
    fn test_sqlx_output_parses() {
        let options = RustOptions {
            sql_driver: Driver::Sqlx,
            emit_interface: true,
            ..RustOptions::default()
        };
        for (template, text) in render_all(options) {
            if template == COPYFROM_FILE || template == BATCH_FILE {
                continue;
            }
            if let Err(err) = syn::parse_file(&text) {
                panic!("{} does not parse: {}\n{}", template, err, text);
            }
        }
    }

    #[test]
    fn test_query_methods() {
        let files = render_all(RustOptions::default());
        let (_, text) = files.iter().find(|(t, _)| t == QUERY_FILE).unwrap();
        assert!(text.contains("// source: query.sql"));
        assert!(text.contains("pub const GET_AUTHOR: &str = r#\"SELECT id, name, bio FROM authors WHERE id = $1\"#;"));
        assert!(text.contains("/// Fetch one author."));
        assert!(text.contains(
            "pub async fn get_author(&self, id: i64) -> Result<Author, tokio_postgres::Error> {"
        ));
        assert!(text.contains("pub struct ListTitlesRow {"));
        assert!(text.contains("status: BookStatus"));
        assert!(text.contains("pub async fn count_authors(&self) -> Result<i64, tokio_postgres::Error> {"));
        assert!(text.contains(
            "pub async fn update_bio(&self, bio: Option<&str>, id: i64) -> Result<u64, tokio_postgres::Error> {"
        ));
        assert!(!text.contains("pub async fn add_authors"));
    }

    #[test]
    fn test_models() {
        let files = render_all(RustOptions::default());
        let (_, text) = files.iter().find(|(t, _)| t == MODELS_FILE).unwrap();
        assert!(text.contains("#[postgres(name = \"book_status\")]"));
        assert!(text.contains("#[postgres(name = \"in print\")]\n    InPrint,"));
        assert!(text.contains("pub struct Author {"));
        assert!(text.contains("pub bio: Option<String>,"));
        assert!(text.contains("pub tags: Option<Vec<String>>,"));
    }

    #[test]
    fn test_copyfrom_and_batch() {
        let files = render_all(RustOptions::default());
        let (_, copy) = files.iter().find(|(t, _)| t == COPYFROM_FILE).unwrap();
        assert!(copy.contains("COPY authors (name, bio) FROM STDIN BINARY"));
        assert!(copy.contains("&[Type::TEXT, Type::TEXT]"));
        let (_, batch) = files.iter().find(|(t, _)| t == BATCH_FILE).unwrap();
        assert!(batch.contains("pub async fn delete_author(&self, items: &[i64])"));
        assert!(batch.contains("pub struct CreateBooksParams {"));
        assert!(batch.contains("Vec<Result<Book, tokio_postgres::Error>>"));
    }

    #[test]
    fn test_unknown_template() {
        let request = request(RustOptions::default());
        let options = RustOptions::default();
        let files = FileNames::new(&options);
        let ctx = TemplateContext {
            request: &request,
            options: &options,
            files: &files,
            source_name: None,
        };
        assert_eq!(
            RustRenderer.render("nope", &ctx),
            Err(RenderError::UnknownTemplate("nope".to_string()))
        );
    }

    #[test]
    fn test_naming() {
        assert_eq!(snake("GetAuthor"), "get_author");
        assert_eq!(snake("HTTPServer"), "http_server");
        assert_eq!(pascal("book_status"), "BookStatus");
        assert_eq!(pascal("in print"), "InPrint");
        assert_eq!(pascal("1st"), "V1st");
        assert_eq!(ident("type"), "r#type");
        assert_eq!(ident("self"), "self_");
        assert_eq!(singular("authors"), "author");
        assert_eq!(singular("categories"), "category");
        assert_eq!(singular("addresses"), "address");
        assert_eq!(singular("status"), "statu");
    }

    #[test]
    fn test_raw_string_hashes() {
        assert_eq!(raw_string("select 1"), "r#\"select 1\"#");
        assert_eq!(raw_string("select '\"#'"), "r##\"select '\"#'\"##");
    }
}
