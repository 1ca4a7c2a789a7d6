//! Statement analysis against the catalog.
//!
//! The analyzer resolves every table and column a statement references,
//! derives the result column list and types each `$n` placeholder from the
//! column it is compared with, assigned to or cast as. `SELECT *` and
//! `RETURNING *` can be expanded in place into explicit column lists.

use crate::error::{AnalysisError, AnalysisErrorKind, AnalysisResult};
use crate::query::{Column, Parameter};
use sqlforge_sql::catalog::normalize_type;
use sqlforge_sql::ident::{fold_ident, fold_object_name, fold_parts};
use sqlforge_sql::{Catalog, Parser, SqlError, Table, TableName};
use sqlparser::ast::{
    Expr, FromTable, Function, FunctionArg, FunctionArgExpr, FunctionArguments, Ident, Insert,
    ObjectName, Query as AstQuery, SelectItem, SelectItemQualifiedWildcardKind, SetExpr,
    Spanned, Statement as Ast, TableFactor, TableWithJoins,
};
use sqlparser::tokenizer::{Location, Span};
use std::collections::BTreeMap;

/// What analysis learned about one statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    /// Result columns
    pub columns: Vec<Column>,
    /// Parameters ordered by number
    pub params: Vec<Parameter>,
    /// Target of an INSERT
    pub insert_into: Option<TableName>,
    /// A `*` was replaced by explicit columns in the statement
    pub expanded: bool,
}

/// A table visible to column references, under its alias or name
#[derive(Debug)]
struct ScopeTable<'c> {
    qualifier: String,
    table: &'c Table,
}

#[derive(Debug, Default)]
struct Scope<'c> {
    tables: Vec<ScopeTable<'c>>,
}

impl<'c> Scope<'c> {
    fn push(&mut self, qualifier: Option<String>, table: &'c Table) {
        self.tables.push(ScopeTable {
            qualifier: qualifier.unwrap_or_else(|| table.name.name.clone()),
            table,
        });
    }

    fn find(&self, qualifier: &str) -> Option<&ScopeTable<'c>> {
        self.tables.iter().find(|t| t.qualifier == qualifier)
    }
}

/// Analyzes statements of one package against its catalog
pub struct Analyzer<'a> {
    catalog: &'a Catalog,
    parser: &'a dyn Parser,
    text: Option<&'a str>,
    params: BTreeMap<usize, Option<Column>>,
}

impl<'a> Analyzer<'a> {
    /// Create an analyzer for one statement
    #[must_use]
    pub fn new(catalog: &'a Catalog, parser: &'a dyn Parser) -> Self {
        Self {
            catalog,
            parser,
            text: None,
            params: BTreeMap::new(),
        }
    }

    /// Text the statement was parsed from; errors then carry the byte
    /// offset of the offending reference within it
    #[must_use]
    pub fn with_text(mut self, text: &'a str) -> Self {
        self.text = Some(text);
        self
    }

    fn locate(&self, err: impl Into<AnalysisError>, span: Span) -> AnalysisError {
        let err = err.into();
        match self.text.and_then(|text| byte_offset(text, span.start)) {
            Some(offset) => err.at(offset),
            None => err,
        }
    }

    /// Analyze a statement, expanding stars in place when `expand` is set.
    ///
    /// Returns `Ok(None)` for statement kinds that are not queries.
    ///
    /// # Errors
    ///
    /// Returns error if a reference cannot be resolved or a placeholder
    /// cannot be typed
    pub fn analyze(mut self, stmt: &mut Ast, expand: bool) -> AnalysisResult<Option<Analysis>> {
        let (columns, insert_into, expanded) = match stmt {
            Ast::Query(query) => {
                let (columns, expanded) = self.query(query, expand)?;
                (columns, None, expanded)
            }
            Ast::Insert(insert) => self.insert(insert, expand)?,
            Ast::Update {
                table,
                assignments,
                from,
                selection,
                returning,
                ..
            } => {
                if from.is_some() {
                    return Err(AnalysisErrorKind::Unsupported("UPDATE ... FROM".to_string()).into());
                }
                let scope = self.scope(std::slice::from_ref(&*table))?;
                let target = scope.tables[0].table;
                for assignment in assignments.iter() {
                    let name = fold_parts(&assignment.target.to_string())
                        .pop()
                        .unwrap_or_default();
                    let column = target.column(&name).ok_or_else(|| SqlError::ColumnNotFound {
                        table: target.name.to_string(),
                        column: name.clone(),
                    })?;
                    let column = Column::from_catalog(self.catalog, &target.name, column);
                    match placeholder(&assignment.value) {
                        Some(number) => self.bind(number, column),
                        None => self.walk(&assignment.value, &scope)?,
                    }
                }
                if let Some(expr) = selection {
                    self.walk(expr, &scope)?;
                }
                let (columns, expanded) = self.returning(returning.as_mut(), &scope, expand)?;
                (columns, None, expanded)
            }
            Ast::Delete(delete) => {
                if delete.using.is_some() {
                    return Err(AnalysisErrorKind::Unsupported("DELETE ... USING".to_string()).into());
                }
                let tables = match &delete.from {
                    FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables,
                };
                let scope = self.scope(tables)?;
                if let Some(expr) = &delete.selection {
                    self.walk(expr, &scope)?;
                }
                let (columns, expanded) = self.returning(delete.returning.as_mut(), &scope, expand)?;
                (columns, None, expanded)
            }
            _ => return Ok(None),
        };

        let params = self.finish_params()?;
        Ok(Some(Analysis {
            columns,
            params,
            insert_into,
            expanded,
        }))
    }

    fn query(&mut self, query: &mut AstQuery, expand: bool) -> AnalysisResult<(Vec<Column>, bool)> {
        if query.with.is_some() {
            return Err(AnalysisErrorKind::Unsupported("WITH clauses".to_string()).into());
        }
        for expr in [query.limit.as_ref(), query.offset.as_ref().map(|o| &o.value)]
            .into_iter()
            .flatten()
        {
            match placeholder(expr) {
                Some(number) => self.bind(number, Column::computed("limit", "integer", true)),
                None => self.walk(expr, &Scope::default())?,
            }
        }

        let SetExpr::Select(select) = query.body.as_mut() else {
            return Err(AnalysisErrorKind::Unsupported("set operations".to_string()).into());
        };
        let scope = self.scope(&select.from)?;
        if let Some(expr) = &select.selection {
            self.walk(expr, &scope)?;
        }
        if let Some(expr) = &select.having {
            self.walk(expr, &scope)?;
        }
        let columns = self.projection(&select.projection, &scope)?;
        let expanded = expand && expand_stars(&mut select.projection, &scope, self.parser);
        Ok((columns, expanded))
    }

    fn insert(
        &mut self,
        insert: &mut Insert,
        expand: bool,
    ) -> AnalysisResult<(Vec<Column>, Option<TableName>, bool)> {
        let catalog = self.catalog;
        let mut parts = fold_parts(&insert.table.to_string());
        let name = parts.pop().unwrap_or_default();
        let qualified = catalog.qualify(parts.pop(), name);
        let table = catalog.get_table(&qualified)?;

        let targets = if insert.columns.is_empty() {
            table.columns.iter().collect::<Vec<_>>()
        } else {
            insert
                .columns
                .iter()
                .map(|ident| {
                    let name = fold_ident(ident);
                    table.column(&name).ok_or_else(|| SqlError::ColumnNotFound {
                        table: qualified.to_string(),
                        column: name,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        if let Some(source) = insert.source.as_mut() {
            if let SetExpr::Values(values) = source.body.as_ref() {
                for row in &values.rows {
                    if row.len() > targets.len() {
                        return Err(AnalysisErrorKind::Unsupported(
                            "INSERT has more expressions than target columns".to_string(),
                        )
                        .into());
                    }
                    for (expr, target) in row.iter().zip(&targets) {
                        match (placeholder(expr), expr) {
                            (Some(number), _) => {
                                self.bind(number, Column::from_catalog(catalog, &qualified, target));
                            }
                            // DEFAULT and friends
                            (None, Expr::Identifier(_)) => {}
                            (None, _) => self.walk(expr, &Scope::default())?,
                        }
                    }
                }
            } else {
                self.query(source, false)?;
            }
        }

        let mut scope = Scope::default();
        scope.push(None, table);
        let (columns, expanded) = self.returning(insert.returning.as_mut(), &scope, expand)?;
        Ok((columns, Some(qualified), expanded))
    }

    fn returning(
        &mut self,
        returning: Option<&mut Vec<SelectItem>>,
        scope: &Scope<'a>,
        expand: bool,
    ) -> AnalysisResult<(Vec<Column>, bool)> {
        match returning {
            Some(items) => {
                let columns = self.projection(items, scope)?;
                let expanded = expand && expand_stars(items, scope, self.parser);
                Ok((columns, expanded))
            }
            None => Ok((Vec::new(), false)),
        }
    }

    fn scope(&self, from: &[TableWithJoins]) -> AnalysisResult<Scope<'a>> {
        let mut scope = Scope::default();
        for item in from {
            self.add_factor(&mut scope, &item.relation)?;
            for join in &item.joins {
                self.add_factor(&mut scope, &join.relation)?;
            }
        }
        Ok(scope)
    }

    fn add_factor(&self, scope: &mut Scope<'a>, factor: &TableFactor) -> AnalysisResult<()> {
        let catalog: &'a Catalog = self.catalog;
        match factor {
            TableFactor::Table { name, alias, .. } => {
                let (schema, table) = fold_object_name(name);
                let table = catalog
                    .get_table(&catalog.qualify(schema, table))
                    .map_err(|err| self.locate(err, name.span()))?;
                scope.push(alias.as_ref().map(|a| fold_ident(&a.name)), table);
                Ok(())
            }
            _ => Err(AnalysisErrorKind::Unsupported("FROM items other than tables".to_string()).into()),
        }
    }

    /// Resolve a column reference; `Ok(None)` if `expr` is not one
    fn resolve(&self, expr: &Expr, scope: &Scope<'_>) -> AnalysisResult<Option<Column>> {
        match expr {
            Expr::Identifier(ident) => {
                let name = fold_ident(ident);
                let mut found = scope
                    .tables
                    .iter()
                    .filter_map(|t| t.table.column(&name).map(|c| (t.table, c)));
                match (found.next(), found.next()) {
                    (Some((table, column)), None) => {
                        Ok(Some(Column::from_catalog(self.catalog, &table.name, column)))
                    }
                    (Some(_), Some(_)) => {
                        Err(self.locate(AnalysisErrorKind::AmbiguousColumn(name), ident.span))
                    }
                    (None, _) => Err(self.locate(AnalysisErrorKind::UnknownColumn(name), ident.span)),
                }
            }
            Expr::CompoundIdentifier(parts) if parts.len() >= 2 => {
                let qualifier_ident = &parts[parts.len() - 2];
                let name_ident = &parts[parts.len() - 1];
                let qualifier = fold_ident(qualifier_ident);
                let name = fold_ident(name_ident);
                let Some(entry) = scope.find(&qualifier) else {
                    return Err(self.locate(
                        AnalysisErrorKind::MissingFromEntry(qualifier),
                        qualifier_ident.span,
                    ));
                };
                let Some(column) = entry.table.column(&name) else {
                    return Err(self.locate(
                        SqlError::ColumnNotFound {
                            table: entry.table.name.to_string(),
                            column: name,
                        },
                        name_ident.span,
                    ));
                };
                Ok(Some(Column::from_catalog(self.catalog, &entry.table.name, column)))
            }
            Expr::Nested(inner) => self.resolve(inner, scope),
            _ => Ok(None),
        }
    }

    /// Check references and record placeholders in an expression tree
    fn walk(&mut self, expr: &Expr, scope: &Scope<'_>) -> AnalysisResult<()> {
        if let Some(number) = placeholder(expr) {
            self.params.entry(number).or_insert(None);
            return Ok(());
        }
        match expr {
            Expr::Identifier(_) | Expr::CompoundIdentifier(_) => {
                self.resolve(expr, scope)?;
            }
            Expr::BinaryOp { left, right, .. } => {
                self.bind_pair(left, right, scope)?;
                self.bind_pair(right, left, scope)?;
                self.walk(left, scope)?;
                self.walk(right, scope)?;
            }
            Expr::InList { expr: target, list, .. } => {
                for item in list {
                    self.bind_pair(item, target, scope)?;
                    self.walk(item, scope)?;
                }
                self.walk(target, scope)?;
            }
            Expr::Between {
                expr: target,
                low,
                high,
                ..
            } => {
                self.bind_pair(low, target, scope)?;
                self.bind_pair(high, target, scope)?;
                self.walk(target, scope)?;
                self.walk(low, scope)?;
                self.walk(high, scope)?;
            }
            Expr::Like {
                expr: target,
                pattern,
                ..
            }
            | Expr::ILike {
                expr: target,
                pattern,
                ..
            } => {
                self.bind_pair(pattern, target, scope)?;
                self.walk(target, scope)?;
                self.walk(pattern, scope)?;
            }
            Expr::Cast {
                expr: inner,
                data_type,
                ..
            } => match placeholder(inner) {
                Some(number) => {
                    let (data_type, is_array) = normalize_type(data_type);
                    let is_enum = self.catalog.find_enum(&data_type).is_some();
                    self.bind(
                        number,
                        Column {
                            name: String::new(),
                            data_type,
                            not_null: true,
                            is_array,
                            is_enum,
                            table: None,
                        },
                    );
                }
                None => self.walk(inner, scope)?,
            },
            Expr::Nested(inner)
            | Expr::UnaryOp { expr: inner, .. }
            | Expr::IsNull(inner)
            | Expr::IsNotNull(inner)
            | Expr::IsTrue(inner)
            | Expr::IsFalse(inner) => self.walk(inner, scope)?,
            Expr::Function(func) => {
                for arg in function_args(func) {
                    self.walk(arg, scope)?;
                }
            }
            Expr::Subquery(_) | Expr::InSubquery { .. } | Expr::Exists { .. } => {
                return Err(AnalysisErrorKind::Unsupported("subqueries".to_string()).into());
            }
            _ => {}
        }
        Ok(())
    }

    /// Type `maybe_param` from `other` when it is a placeholder and `other` a column
    fn bind_pair(&mut self, maybe_param: &Expr, other: &Expr, scope: &Scope<'_>) -> AnalysisResult<()> {
        if let Some(number) = placeholder(maybe_param) {
            if let Some(column) = self.resolve(other, scope)? {
                self.bind(number, column);
            }
        }
        Ok(())
    }

    /// First typing of a placeholder wins
    fn bind(&mut self, number: usize, column: Column) {
        let slot = self.params.entry(number).or_insert(None);
        if slot.is_none() {
            *slot = Some(column);
        }
    }

    fn projection(&mut self, items: &[SelectItem], scope: &Scope<'_>) -> AnalysisResult<Vec<Column>> {
        let mut columns = Vec::new();
        for (index, item) in items.iter().enumerate() {
            match item {
                SelectItem::Wildcard(_) => {
                    if scope.tables.is_empty() {
                        return Err(AnalysisErrorKind::Unsupported(
                            "SELECT * with no tables specified".to_string(),
                        )
                        .into());
                    }
                    for entry in &scope.tables {
                        columns.extend(self.table_columns(entry.table));
                    }
                }
                SelectItem::QualifiedWildcard(kind, _) => {
                    let SelectItemQualifiedWildcardKind::ObjectName(name) = kind else {
                        return Err(AnalysisErrorKind::Unsupported(
                            "wildcard on an expression".to_string(),
                        )
                        .into());
                    };
                    let qualifier = wildcard_qualifier(name);
                    let Some(entry) = scope.find(&qualifier) else {
                        return Err(self.locate(AnalysisErrorKind::MissingFromEntry(qualifier), name.span()));
                    };
                    columns.extend(self.table_columns(entry.table));
                }
                SelectItem::UnnamedExpr(expr) => {
                    columns.push(self.output_column(expr, None, index, scope)?);
                }
                SelectItem::ExprWithAlias { expr, alias } => {
                    columns.push(self.output_column(expr, Some(fold_ident(alias)), index, scope)?);
                }
            }
        }
        Ok(columns)
    }

    fn table_columns(&self, table: &Table) -> Vec<Column> {
        table
            .columns
            .iter()
            .map(|c| Column::from_catalog(self.catalog, &table.name, c))
            .collect()
    }

    fn output_column(
        &mut self,
        expr: &Expr,
        alias: Option<String>,
        index: usize,
        scope: &Scope<'_>,
    ) -> AnalysisResult<Column> {
        self.walk(expr, scope)?;
        let mut column = self
            .infer(expr, scope)?
            .unwrap_or_else(|| Column::computed("", "any", false));
        match alias {
            Some(alias) => column.name = alias,
            None if column.name.is_empty() => column.name = format!("column_{}", index + 1),
            None => {}
        }
        Ok(column)
    }

    fn infer(&self, expr: &Expr, scope: &Scope<'_>) -> AnalysisResult<Option<Column>> {
        if let Some(column) = self.resolve(expr, scope)? {
            return Ok(Some(column));
        }
        Ok(match expr {
            Expr::Function(func) => Some(self.function_column(func, scope)?),
            Expr::Cast {
                expr: inner,
                data_type,
                ..
            } => {
                let (data_type, is_array) = normalize_type(data_type);
                let inner = self.resolve(inner, scope)?;
                Some(Column {
                    name: inner.as_ref().map(|c| c.name.clone()).unwrap_or_default(),
                    is_enum: self.catalog.find_enum(&data_type).is_some(),
                    data_type,
                    not_null: inner.is_some_and(|c| c.not_null),
                    is_array,
                    table: None,
                })
            }
            Expr::Value(value) => literal_column(&value.to_string()),
            _ => None,
        })
    }

    fn function_column(&self, func: &Function, scope: &Scope<'_>) -> AnalysisResult<Column> {
        let name = fold_parts(&func.name.to_string()).pop().unwrap_or_default();
        let first = match function_args(func).first() {
            Some(arg) => self.infer(arg, scope)?,
            None => None,
        };
        let (data_type, not_null) = match name.as_str() {
            "count" => ("bigint".to_string(), true),
            "now" | "current_timestamp" => ("timestamptz".to_string(), true),
            "lower" | "upper" | "trim" | "concat" => ("text".to_string(), false),
            "coalesce" => (first.map_or_else(|| "any".to_string(), |c| c.data_type), true),
            "min" | "max" => (first.map_or_else(|| "any".to_string(), |c| c.data_type), false),
            _ => ("any".to_string(), false),
        };
        Ok(Column::computed(name, data_type, not_null))
    }

    fn finish_params(self) -> AnalysisResult<Vec<Parameter>> {
        let max = self.params.keys().next_back().copied().unwrap_or(0);
        (1..=max)
            .map(|number| match self.params.get(&number) {
                Some(Some(column)) => Ok(Parameter {
                    number,
                    column: column.clone(),
                }),
                _ => Err(AnalysisErrorKind::UntypedParameter(number).into()),
            })
            .collect()
    }
}

/// The number of a `$n` placeholder
#[must_use]
pub fn placeholder(expr: &Expr) -> Option<usize> {
    match expr {
        Expr::Value(value) => value.to_string().strip_prefix('$')?.parse().ok(),
        _ => None,
    }
}

/// Whether `stmt` is an INSERT of one VALUES row made only of placeholders
#[must_use]
pub fn is_copyfrom_insert(stmt: &Ast) -> bool {
    let Ast::Insert(insert) = stmt else {
        return false;
    };
    let Some(source) = &insert.source else {
        return false;
    };
    let SetExpr::Values(values) = source.body.as_ref() else {
        return false;
    };
    values.rows.len() == 1 && values.rows[0].iter().all(|e| placeholder(e).is_some())
}

fn function_args(func: &Function) -> Vec<&Expr> {
    match &func.args {
        FunctionArguments::List(list) => list
            .args
            .iter()
            .filter_map(|arg| match arg {
                FunctionArg::Unnamed(FunctionArgExpr::Expr(expr))
                | FunctionArg::Named {
                    arg: FunctionArgExpr::Expr(expr),
                    ..
                } => Some(expr),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn literal_column(literal: &str) -> Option<Column> {
    if literal.starts_with('$') {
        return None;
    }
    let (data_type, not_null) = if literal.starts_with('\'') {
        ("text", true)
    } else if literal.eq_ignore_ascii_case("null") {
        ("any", false)
    } else if literal.eq_ignore_ascii_case("true") || literal.eq_ignore_ascii_case("false") {
        ("boolean", true)
    } else if literal.contains('.') {
        ("numeric", true)
    } else {
        ("integer", true)
    };
    Some(Column::computed("", data_type, not_null))
}

fn ident(name: &str, parser: &dyn Parser) -> Ident {
    let plain = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if plain && !parser.is_reserved_keyword(name) {
        Ident::new(name)
    } else {
        Ident::with_quote('"', name)
    }
}

/// Table or alias named by the `t` of `t.*`
fn wildcard_qualifier(name: &ObjectName) -> String {
    fold_object_name(name).1
}

/// Byte offset of a 1-based line/column (in characters) within `text`
fn byte_offset(text: &str, at: Location) -> Option<usize> {
    let line = usize::try_from(at.line).ok()?.checked_sub(1)?;
    let column = usize::try_from(at.column).ok()?.checked_sub(1)?;
    let line_start = match line {
        0 => 0,
        n => text.match_indices('\n').nth(n - 1)?.0 + 1,
    };
    text[line_start..]
        .char_indices()
        .nth(column)
        .map(|(i, _)| line_start + i)
}

/// Replace `*` and `t.*` with explicit column references
fn expand_stars(items: &mut Vec<SelectItem>, scope: &Scope<'_>, parser: &dyn Parser) -> bool {
    let has_star = items
        .iter()
        .any(|i| matches!(i, SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..)));
    if !has_star {
        return false;
    }

    let qualify_all = scope.tables.len() > 1;
    let mut expanded = Vec::with_capacity(items.len());
    for item in items.drain(..) {
        let entries: Vec<&ScopeTable<'_>> = match &item {
            SelectItem::Wildcard(_) => scope.tables.iter().collect(),
            SelectItem::QualifiedWildcard(SelectItemQualifiedWildcardKind::ObjectName(name), _) => {
                scope.find(&wildcard_qualifier(name)).into_iter().collect()
            }
            _ => {
                expanded.push(item);
                continue;
            }
        };
        let qualify = qualify_all || matches!(item, SelectItem::QualifiedWildcard(..));
        for entry in entries {
            for column in &entry.table.columns {
                let column = ident(&column.name, parser);
                expanded.push(SelectItem::UnnamedExpr(if qualify {
                    Expr::CompoundIdentifier(vec![ident(&entry.qualifier, parser), column])
                } else {
                    Expr::Identifier(column)
                }));
            }
        }
    }
    *items = expanded;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;
    use sqlforge_sql::PostgreSqlParser;

    const SCHEMA: &str = "
        CREATE TYPE status AS ENUM ('draft', 'published');
        CREATE TABLE authors (id BIGSERIAL PRIMARY KEY, name TEXT NOT NULL, bio TEXT);
        CREATE TABLE books (id BIGINT PRIMARY KEY, author_id BIGINT NOT NULL, title TEXT NOT NULL, status status NOT NULL, \"order\" INT);
    ";

    fn catalog() -> Catalog {
        let parser = PostgreSqlParser::new();
        let mut catalog = Catalog::new();
        for stmt in parser.parse(SCHEMA).unwrap() {
            catalog.update(&stmt).unwrap();
        }
        catalog
    }

    fn analyze(sql: &str) -> Result<(Analysis, String), AnalysisError> {
        let parser = PostgreSqlParser::new();
        let catalog = catalog();
        let mut stmt = parser.parse(sql).unwrap().remove(0).raw;
        let analysis = Analyzer::new(&catalog, &parser)
            .analyze(&mut stmt, true)?
            .expect("statement is a query");
        Ok((analysis, stmt.to_string()))
    }

    fn names(columns: &[Column]) -> Vec<&str> {
        columns.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_select_star_with_param() {
        let (analysis, sql) = analyze("SELECT * FROM authors WHERE id = $1").unwrap();
        assert_eq!(names(&analysis.columns), vec!["id", "name", "bio"]);
        assert_eq!(analysis.params.len(), 1);
        assert_eq!(analysis.params[0].number, 1);
        assert_eq!(analysis.params[0].column.data_type, "bigserial");
        assert!(analysis.expanded);
        assert_eq!(sql, "SELECT id, name, bio FROM authors WHERE id = $1");
    }

    #[test]
    fn test_join_with_aliases() {
        let (analysis, sql) = analyze(
            "SELECT a.name, b.* FROM authors a JOIN books b ON b.author_id = a.id WHERE b.status = $1",
        )
        .unwrap();
        assert_eq!(
            names(&analysis.columns),
            vec!["name", "id", "author_id", "title", "status", "order"]
        );
        let param = &analysis.params[0].column;
        assert_eq!(param.data_type, "status");
        assert!(param.is_enum);
        assert!(sql.starts_with(
            "SELECT a.name, b.id, b.author_id, b.title, b.status, b.\"order\" FROM authors"
        ));
    }

    #[test]
    fn test_count_and_alias() {
        let (analysis, _) = analyze("SELECT count(*) AS total, count(*) FROM authors").unwrap();
        assert_eq!(names(&analysis.columns), vec!["total", "count"]);
        assert_eq!(analysis.columns[0].data_type, "bigint");
        assert!(analysis.columns[0].not_null);
        assert!(!analysis.expanded);
    }

    #[test]
    fn test_limit_and_in_list() {
        let (analysis, _) =
            analyze("SELECT name FROM authors WHERE id IN ($1, $2) LIMIT $3").unwrap();
        let types: Vec<&str> = analysis.params.iter().map(|p| p.column.data_type.as_str()).collect();
        assert_eq!(types, vec!["bigserial", "bigserial", "integer"]);
    }

    #[test]
    fn test_insert_values_returning() {
        let (analysis, sql) =
            analyze("INSERT INTO authors (name, bio) VALUES ($1, $2) RETURNING *").unwrap();
        assert_eq!(analysis.insert_into, Some(TableName::new("public", "authors")));
        assert_eq!(analysis.params[0].column.name, "name");
        assert!(analysis.params[0].column.not_null);
        assert!(!analysis.params[1].column.not_null);
        assert_eq!(names(&analysis.columns), vec!["id", "name", "bio"]);
        assert!(sql.ends_with("RETURNING id, name, bio"));
    }

    #[test]
    fn test_update_and_delete() {
        let (analysis, _) = analyze("UPDATE authors SET bio = $1 WHERE id = $2").unwrap();
        let params: Vec<&str> = analysis.params.iter().map(|p| p.column.name.as_str()).collect();
        assert_eq!(params, vec!["bio", "id"]);
        assert!(analysis.columns.is_empty());

        let (analysis, _) = analyze("DELETE FROM authors WHERE name LIKE $1 RETURNING id").unwrap();
        assert_eq!(analysis.params[0].column.data_type, "text");
        assert_eq!(names(&analysis.columns), vec!["id"]);
    }

    #[test]
    fn test_cast_param() {
        let (analysis, _) = analyze("SELECT name FROM authors WHERE bio = $1::text").unwrap();
        assert_eq!(analysis.params[0].column.data_type, "text");
    }

    #[test]
    fn test_unknown_references() {
        let err = analyze("SELECT * FROM missing").unwrap_err();
        assert_eq!(
            err.kind,
            AnalysisErrorKind::Catalog(SqlError::RelationNotFound("missing".to_string()))
        );

        let err = analyze("SELECT nope FROM authors").unwrap_err();
        assert_eq!(err.kind, AnalysisErrorKind::UnknownColumn("nope".to_string()));

        let err = analyze("SELECT id FROM authors JOIN books ON true").unwrap_err();
        assert_eq!(err.kind, AnalysisErrorKind::AmbiguousColumn("id".to_string()));

        let err = analyze("SELECT x.id FROM authors").unwrap_err();
        assert_eq!(err.kind, AnalysisErrorKind::MissingFromEntry("x".to_string()));
    }

    #[test]
    fn test_error_offsets() {
        let parser = PostgreSqlParser::new();
        let catalog = catalog();
        let locate = |sql: &str| {
            let mut stmt = parser.parse(sql).unwrap().remove(0).raw;
            Analyzer::new(&catalog, &parser)
                .with_text(sql)
                .analyze(&mut stmt, true)
                .unwrap_err()
                .location
        };
        assert_eq!(locate("SELECT nope FROM authors"), Some(7));
        assert_eq!(locate("SELECT id\nFROM authors\nWHERE b.id = 1"), Some(29));
        assert_eq!(locate("SELECT id FROM authors WHERE name = $1 AND x.id = 1"), Some(43));
        assert_eq!(locate("SELECT *\n  FROM missing"), Some(16));
    }

    #[test]
    fn test_byte_offset() {
        let text = "-- é\nSELECT  x";
        assert_eq!(byte_offset(text, Location { line: 1, column: 4 }), Some(3));
        assert_eq!(byte_offset(text, Location { line: 2, column: 9 }), Some(14));
        assert_eq!(byte_offset(text, Location { line: 0, column: 0 }), None);
        assert_eq!(byte_offset(text, Location { line: 5, column: 1 }), None);
    }

    #[test]
    fn test_qualified_wildcard_unknown_table() {
        let err = analyze("SELECT z.* FROM authors a").unwrap_err();
        assert_eq!(err.kind, AnalysisErrorKind::MissingFromEntry("z".to_string()));
    }

    #[test]
    fn test_untyped_param() {
        let err = analyze("SELECT name FROM authors WHERE id = $2").unwrap_err();
        assert_eq!(err.kind, AnalysisErrorKind::UntypedParameter(1));
    }

    #[test]
    fn test_non_query_skipped() {
        let parser = PostgreSqlParser::new();
        let catalog = catalog();
        let mut stmt = parser.parse("CREATE TABLE t (id int)").unwrap().remove(0).raw;
        let analysis = Analyzer::new(&catalog, &parser).analyze(&mut stmt, true).unwrap();
        assert!(analysis.is_none());
    }

    #[test]
    fn test_copyfrom_shape() {
        let parser = PostgreSqlParser::new();
        let parse = |sql: &str| parser.parse(sql).unwrap().remove(0).raw;
        assert!(is_copyfrom_insert(&parse("INSERT INTO authors (name, bio) VALUES ($1, $2)")));
        assert!(!is_copyfrom_insert(&parse("INSERT INTO authors (name) VALUES ('x')")));
        assert!(!is_copyfrom_insert(&parse("SELECT 1")));
    }
}
