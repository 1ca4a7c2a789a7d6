//! In-memory schema model.
//!
//! A catalog is built by applying schema statements in order. It is owned by
//! a single compiler for the lifetime of one package compilation. Maps keep
//! insertion order, so applying the same statements to a fresh catalog always
//! yields an identical catalog.

use crate::ast::Statement;
use crate::error::{SqlError, SqlResult};
use crate::ident::{fold, fold_ident, fold_object_name, fold_parts};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sqlparser::ast::{
    AlterColumnOperation, AlterTableOperation, ColumnDef, ColumnOption, CreateTable, DataType,
    Statement as Ast, TableConstraint, UserDefinedTypeRepresentation,
};
use std::fmt;

/// Name of the schema unqualified names resolve to
pub const DEFAULT_SCHEMA: &str = "public";

/// A schema-qualified table name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableName {
    /// Schema the table lives in
    pub schema: String,
    /// Table name
    pub name: String,
}

impl TableName {
    /// Create a new table name
    #[must_use]
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.schema == DEFAULT_SCHEMA {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.schema, self.name)
        }
    }
}

/// A table column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Folded type name without modifiers (`varchar(20)` -> `varchar`)
    pub data_type: String,
    /// NOT NULL or part of the primary key
    pub not_null: bool,
    /// Declared with `[]`
    pub is_array: bool,
    /// Part of the primary key
    pub primary_key: bool,
}

impl Column {
    fn from_def(def: &ColumnDef) -> Self {
        let (data_type, is_array) = normalize_type(&def.data_type);
        let mut column = Self {
            name: fold_ident(&def.name),
            data_type,
            not_null: false,
            is_array,
            primary_key: false,
        };
        for opt in &def.options {
            match &opt.option {
                ColumnOption::NotNull => column.not_null = true,
                ColumnOption::Null => column.not_null = false,
                ColumnOption::Unique { is_primary: true, .. } => {
                    column.primary_key = true;
                    column.not_null = true;
                }
                _ => {}
            }
        }
        column
    }
}

/// A table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Qualified name
    pub name: TableName,
    /// Columns in declaration order
    pub columns: Vec<Column>,
}

impl Table {
    /// Find a column by folded name
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn column_mut(&mut self, name: &str) -> SqlResult<&mut Column> {
        let table = self.name.to_string();
        self.columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| SqlError::ColumnNotFound {
                table,
                column: name.to_string(),
            })
    }
}

/// An enum type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enum {
    /// Type name
    pub name: String,
    /// Labels in declaration order
    pub values: Vec<String>,
}

/// A schema (namespace)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Schema name
    pub name: String,
    /// Tables by name
    pub tables: IndexMap<String, Table>,
    /// Enums by name
    pub enums: IndexMap<String, Enum>,
}

impl Schema {
    /// Create an empty schema
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: IndexMap::new(),
            enums: IndexMap::new(),
        }
    }
}

/// The schema model for one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Schema that unqualified names resolve to
    pub default_schema: String,
    /// Schemas by name
    pub schemas: IndexMap<String, Schema>,
}

impl Catalog {
    /// Create a catalog holding only the empty default schema
    #[must_use]
    pub fn new() -> Self {
        let mut schemas = IndexMap::new();
        schemas.insert(DEFAULT_SCHEMA.to_string(), Schema::new(DEFAULT_SCHEMA));
        Self {
            default_schema: DEFAULT_SCHEMA.to_string(),
            schemas,
        }
    }

    /// Qualify an optional schema name with the default
    #[must_use]
    pub fn qualify(&self, schema: Option<String>, name: String) -> TableName {
        TableName::new(schema.unwrap_or_else(|| self.default_schema.clone()), name)
    }

    /// Look up a schema
    ///
    /// # Errors
    ///
    /// Returns error if the schema does not exist
    pub fn schema(&self, name: &str) -> SqlResult<&Schema> {
        self.schemas
            .get(name)
            .ok_or_else(|| SqlError::SchemaNotFound(name.to_string()))
    }

    fn schema_mut(&mut self, name: &str) -> SqlResult<&mut Schema> {
        self.schemas
            .get_mut(name)
            .ok_or_else(|| SqlError::SchemaNotFound(name.to_string()))
    }

    /// Look up a table
    ///
    /// # Errors
    ///
    /// Returns error if the schema or table does not exist
    pub fn get_table(&self, name: &TableName) -> SqlResult<&Table> {
        self.schema(&name.schema)?
            .tables
            .get(&name.name)
            .ok_or_else(|| SqlError::RelationNotFound(name.to_string()))
    }

    /// Find an enum by type name, searching the default schema first
    #[must_use]
    pub fn find_enum(&self, type_name: &str) -> Option<&Enum> {
        let parts = fold_parts(type_name);
        if let [schema, name] = parts.as_slice() {
            return self.schemas.get(schema).and_then(|s| s.enums.get(name));
        }
        self.schemas
            .get(&self.default_schema)
            .and_then(|s| s.enums.get(type_name))
            .or_else(|| self.schemas.values().find_map(|s| s.enums.get(type_name)))
    }

    /// Every table in schema order
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.schemas.values().flat_map(|s| s.tables.values())
    }

    /// Every enum in schema order
    pub fn enums(&self) -> impl Iterator<Item = &Enum> {
        self.schemas.values().flat_map(|s| s.enums.values())
    }

    /// Apply one schema statement.
    ///
    /// Statements that do not change the schema are ignored. A failing
    /// statement leaves the catalog unchanged.
    ///
    /// # Errors
    ///
    /// Returns error if the statement conflicts with the current catalog
    pub fn update(&mut self, stmt: &Statement) -> SqlResult<()> {
        match &stmt.raw {
            Ast::CreateSchema {
                schema_name,
                if_not_exists,
                ..
            } => {
                let name = fold(&schema_name.to_string());
                if self.schemas.contains_key(&name) {
                    if *if_not_exists {
                        return Ok(());
                    }
                    return Err(SqlError::SchemaExists(name));
                }
                self.schemas.insert(name.clone(), Schema::new(name));
                Ok(())
            }
            Ast::CreateTable(create) => self.create_table(create),
            Ast::AlterTable {
                name,
                if_exists,
                operations,
                ..
            } => {
                let (schema, table) = fold_object_name(name);
                let table = self.qualify(schema, table);
                if *if_exists && self.get_table(&table).is_err() {
                    return Ok(());
                }
                self.alter_table(&table, operations)
            }
            Ast::Drop {
                object_type,
                if_exists,
                names,
                ..
            } => {
                let kind = object_type.to_string();
                for name in names {
                    let (schema, item) = fold_object_name(name);
                    let removed = match kind.as_str() {
                        "TABLE" => {
                            let table = self.qualify(schema, item);
                            self.schema_mut(&table.schema).and_then(|s| {
                                s.tables
                                    .shift_remove(&table.name)
                                    .map(|_| ())
                                    .ok_or_else(|| SqlError::RelationNotFound(table.to_string()))
                            })
                        }
                        "TYPE" => {
                            let qualified = self.qualify(schema, item);
                            self.schema_mut(&qualified.schema).and_then(|s| {
                                s.enums
                                    .shift_remove(&qualified.name)
                                    .map(|_| ())
                                    .ok_or_else(|| SqlError::TypeNotFound(qualified.name.clone()))
                            })
                        }
                        "SCHEMA" => self
                            .schemas
                            .shift_remove(&item)
                            .map(|_| ())
                            .ok_or(SqlError::SchemaNotFound(item)),
                        _ => Ok(()),
                    };
                    match removed {
                        Err(_) if *if_exists => {}
                        other => other?,
                    }
                }
                Ok(())
            }
            Ast::CreateType {
                name,
                representation: UserDefinedTypeRepresentation::Enum { labels },
            } => {
                let (schema, type_name) = fold_object_name(name);
                let qualified = self.qualify(schema, type_name);
                let schema = self.schema_mut(&qualified.schema)?;
                if schema.enums.contains_key(&qualified.name) {
                    return Err(SqlError::TypeExists(qualified.name));
                }
                let values = labels.iter().map(|l| l.value.clone()).collect();
                schema.enums.insert(
                    qualified.name.clone(),
                    Enum {
                        name: qualified.name,
                        values,
                    },
                );
                Ok(())
            }
            other => {
                tracing::trace!(statement = %other, "statement does not change the catalog");
                Ok(())
            }
        }
    }

    fn create_table(&mut self, create: &CreateTable) -> SqlResult<()> {
        let (schema, name) = fold_object_name(&create.name);
        let name = self.qualify(schema, name);
        let schema = self.schema_mut(&name.schema)?;
        if schema.tables.contains_key(&name.name) {
            if create.if_not_exists {
                return Ok(());
            }
            return Err(SqlError::RelationExists(name.to_string()));
        }

        let mut table = Table {
            name: name.clone(),
            columns: Vec::with_capacity(create.columns.len()),
        };
        for def in &create.columns {
            let column = Column::from_def(def);
            if table.column(&column.name).is_some() {
                return Err(SqlError::ColumnExists {
                    table: name.to_string(),
                    column: column.name,
                });
            }
            table.columns.push(column);
        }
        for constraint in &create.constraints {
            if let TableConstraint::PrimaryKey { columns, .. } = constraint {
                for key in columns {
                    let column = table.column_mut(&fold(&key.to_string()))?;
                    column.primary_key = true;
                    column.not_null = true;
                }
            }
        }
        schema.tables.insert(name.name, table);
        Ok(())
    }

    fn alter_table(&mut self, name: &TableName, operations: &[AlterTableOperation]) -> SqlResult<()> {
        let mut table = self.get_table(name)?.clone();
        let mut rename_to = None;

        for op in operations {
            match op {
                AlterTableOperation::AddColumn {
                    column_def,
                    if_not_exists,
                    ..
                } => {
                    let column = Column::from_def(column_def);
                    if table.column(&column.name).is_some() {
                        if *if_not_exists {
                            continue;
                        }
                        return Err(SqlError::ColumnExists {
                            table: name.to_string(),
                            column: column.name,
                        });
                    }
                    table.columns.push(column);
                }
                AlterTableOperation::DropColumn {
                    column_name,
                    if_exists,
                    ..
                } => {
                    let column = fold_ident(column_name);
                    match table.columns.iter().position(|c| c.name == column) {
                        Some(idx) => {
                            table.columns.remove(idx);
                        }
                        None if *if_exists => {}
                        None => {
                            return Err(SqlError::ColumnNotFound {
                                table: name.to_string(),
                                column,
                            });
                        }
                    }
                }
                AlterTableOperation::RenameColumn {
                    old_column_name,
                    new_column_name,
                } => {
                    let new_name = fold_ident(new_column_name);
                    if table.column(&new_name).is_some() {
                        return Err(SqlError::ColumnExists {
                            table: name.to_string(),
                            column: new_name,
                        });
                    }
                    table.column_mut(&fold_ident(old_column_name))?.name = new_name;
                }
                AlterTableOperation::AlterColumn { column_name, op } => {
                    let column = table.column_mut(&fold_ident(column_name))?;
                    match op {
                        AlterColumnOperation::SetNotNull => column.not_null = true,
                        AlterColumnOperation::DropNotNull => column.not_null = false,
                        AlterColumnOperation::SetDataType { data_type, .. } => {
                            let (ty, is_array) = normalize_type(data_type);
                            column.data_type = ty;
                            column.is_array = is_array;
                        }
                        _ => {}
                    }
                }
                AlterTableOperation::RenameTable { table_name } => {
                    let (_, new_name) = fold_object_name(table_name);
                    rename_to = Some(new_name);
                }
                _ => {}
            }
        }

        let schema = self.schema_mut(&name.schema)?;
        match rename_to {
            Some(new_name) if new_name != name.name => {
                if schema.tables.contains_key(&new_name) {
                    return Err(SqlError::RelationExists(new_name));
                }
                schema.tables.shift_remove(&name.name);
                table.name.name = new_name.clone();
                schema.tables.insert(new_name, table);
            }
            _ => {
                schema.tables.insert(name.name.clone(), table);
            }
        }
        Ok(())
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Fold a declared type into `(name, is_array)`
#[must_use]
pub fn normalize_type(data_type: &DataType) -> (String, bool) {
    let mut raw = data_type.to_string();
    let mut is_array = false;
    while let Some(stripped) = raw.trim_end().strip_suffix("[]") {
        raw = stripped.to_string();
        is_array = true;
    }
    let base = match raw.find('(') {
        Some(idx) => {
            let tail = raw[idx..].find(')').map_or("", |end| &raw[idx + end + 1..]);
            format!("{}{}", &raw[..idx], tail)
        }
        None => raw,
    };
    let name = fold_parts(base.trim()).pop().unwrap_or_default();
    (name.split_whitespace().collect::<Vec<_>>().join(" "), is_array)
}
