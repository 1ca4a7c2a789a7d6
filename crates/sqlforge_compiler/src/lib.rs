//! SQLFORGE Compiler
//!
//! Turns the schema and query sources of one package into a
//! [`CompiledResult`]: a catalog plus typed, analyzed queries. Every
//! recoverable failure is collected with its source position instead of
//! stopping at the first one.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analyze;
pub mod compiler;
pub mod error;
pub mod metadata;
pub mod migrations;
pub mod query;

pub use analyze::{Analysis, Analyzer};
pub use compiler::{CompiledResult, Compiler, ParseOptions};
pub use error::{AnalysisError, AnalysisErrorKind, AnalysisResult, CompileError};
pub use query::{Cmd, Column, Parameter, Query};
