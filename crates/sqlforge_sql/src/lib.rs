//! SQLFORGE SQL Engine
//!
//! The engine capability consumed by the compiler: a [`Parser`] that turns
//! SQL text into located statements, the [`Catalog`] schema model those
//! statements are applied to, and a PostgreSQL reference engine built on
//! `sqlparser`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod catalog;
pub mod error;
pub mod ident;
pub mod parser;
pub mod postgresql;
pub mod split;

pub use ast::{CommentSyntax, Statement};
pub use catalog::{Catalog, Column, Enum, Schema, Table, TableName};
pub use error::{ParseError, SqlError, SqlResult, SyntaxError};
pub use parser::{Engine, Parser};
pub use postgresql::PostgreSqlParser;
