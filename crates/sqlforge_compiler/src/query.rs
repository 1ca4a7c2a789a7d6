//! Compiled query model.

use serde::{Deserialize, Serialize};
use sqlforge_sql::{Catalog, TableName};
use std::fmt;
use std::str::FromStr;

/// How a query's results are consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cmd {
    /// Run, discard results
    Exec,
    /// Exactly one row
    One,
    /// Zero or more rows
    Many,
    /// Run and return the driver's result handle
    ExecResult,
    /// Bulk insert through the copy protocol
    CopyFrom,
    /// Batched exec
    BatchExec,
    /// Batched many
    BatchMany,
    /// Batched one
    BatchOne,
}

impl Cmd {
    /// Every command kind, in annotation order
    pub const ALL: [Cmd; 8] = [
        Cmd::Exec,
        Cmd::One,
        Cmd::Many,
        Cmd::ExecResult,
        Cmd::CopyFrom,
        Cmd::BatchExec,
        Cmd::BatchMany,
        Cmd::BatchOne,
    ];

    /// Name as written after the colon in an annotation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Exec => "exec",
            Self::One => "one",
            Self::Many => "many",
            Self::ExecResult => "execresult",
            Self::CopyFrom => "copyfrom",
            Self::BatchExec => "batchexec",
            Self::BatchMany => "batchmany",
            Self::BatchOne => "batchone",
        }
    }

    /// Whether this is one of the batch kinds
    #[must_use]
    pub const fn is_batch(&self) -> bool {
        matches!(self, Self::BatchExec | Self::BatchMany | Self::BatchOne)
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.as_str())
    }
}

impl FromStr for Cmd {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_prefix(':').unwrap_or(s);
        Self::ALL
            .into_iter()
            .find(|cmd| cmd.as_str() == name)
            .ok_or_else(|| s.to_string())
    }
}

/// A typed column of a query's result or parameter list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Output or parameter name (may be empty for unnamed parameters)
    pub name: String,
    /// Lower-cased SQL type name
    pub data_type: String,
    /// Never NULL
    pub not_null: bool,
    /// SQL array
    pub is_array: bool,
    /// Values are labels of a catalog enum
    pub is_enum: bool,
    /// Table the column came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableName>,
}

impl Column {
    /// A computed column with no originating table
    #[must_use]
    pub fn computed(name: impl Into<String>, data_type: impl Into<String>, not_null: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            not_null,
            is_array: false,
            is_enum: false,
            table: None,
        }
    }

    /// Project a catalog column of `table`
    #[must_use]
    pub fn from_catalog(catalog: &Catalog, table: &TableName, column: &sqlforge_sql::Column) -> Self {
        Self {
            name: column.name.clone(),
            data_type: column.data_type.clone(),
            not_null: column.not_null,
            is_array: column.is_array,
            is_enum: catalog.find_enum(&column.data_type).is_some(),
            table: Some(table.clone()),
        }
    }
}

/// A positional query parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// 1-based placeholder number (`$1` -> 1)
    pub number: usize,
    /// Type of the value bound to the placeholder
    pub column: Column,
}

/// A named, analyzed query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Name from the annotation
    pub name: String,
    /// Name of the source the query was read from
    pub filename: String,
    /// Command kind
    pub cmd: Cmd,
    /// SQL text without the annotation and doc comments
    pub sql: String,
    /// Doc comment lines, without their comment markers
    pub comments: Vec<String>,
    /// Parameters ordered by number
    pub params: Vec<Parameter>,
    /// Result columns in output order
    pub columns: Vec<Column>,
    /// Target table of an INSERT
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_into: Option<TableName>,
}
