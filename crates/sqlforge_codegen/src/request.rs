//! The generation request/response wire contract.
//!
//! A [`GenerateRequest`] is a complete snapshot of one compiled package plus
//! the settings of the backend it is sent to. Out-of-process generators
//! receive it as JSON on stdin and answer with a JSON [`GenerateResponse`].

use serde::{Deserialize, Serialize};
use sqlforge_compiler::{CompiledResult, Query};
use sqlforge_sql::{Catalog, Engine};

/// Database driver targeted by the built-in Rust backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Driver {
    /// `tokio-postgres`
    #[default]
    #[serde(rename = "tokio-postgres")]
    TokioPostgres,
    /// `sqlx` (PostgreSQL)
    #[serde(rename = "sqlx")]
    Sqlx,
}

impl Driver {
    /// Name as written in configuration
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TokioPostgres => "tokio-postgres",
            Self::Sqlx => "sqlx",
        }
    }

    /// Whether `:copyfrom` and the batch kinds can be generated
    #[must_use]
    pub const fn supports_copy_and_batch(&self) -> bool {
        matches!(self, Self::TokioPostgres)
    }
}

/// Options of the built-in Rust backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RustOptions {
    /// Module name used in generated file headers
    pub package: String,
    /// Output directory, relative to the configuration
    pub out: String,
    /// Database driver
    pub sql_driver: Driver,
    /// Emit a `Querier` trait
    pub emit_interface: bool,
    /// Derive serde traits on models and rows
    pub emit_serde: bool,
    /// Override for the db file name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_db_file_name: Option<String>,
    /// Override for the models file name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_models_file_name: Option<String>,
    /// Override for the querier file name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_querier_file_name: Option<String>,
    /// Override for the copyfrom file name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_copyfrom_file_name: Option<String>,
    /// Override for the batch file name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_batch_file_name: Option<String>,
    /// Suffix appended to the stem of each query file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_files_suffix: Option<String>,
}

impl Default for RustOptions {
    fn default() -> Self {
        Self {
            package: "db".to_string(),
            out: String::new(),
            sql_driver: Driver::default(),
            emit_interface: false,
            emit_serde: false,
            output_db_file_name: None,
            output_models_file_name: None,
            output_querier_file_name: None,
            output_copyfrom_file_name: None,
            output_batch_file_name: None,
            output_files_suffix: None,
        }
    }
}

/// Options of the JSON backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonOptions {
    /// Output directory, relative to the configuration
    pub out: String,
    /// Output file name
    pub filename: String,
    /// Indentation unit
    pub indent: String,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            out: String::new(),
            filename: "codegen_request.json".to_string(),
            indent: "  ".to_string(),
        }
    }
}

/// A plugin invocation configured on a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Codegen {
    /// Plugin name
    pub plugin: String,
    /// Output directory, relative to the configuration
    pub out: String,
    /// Plugin options, forwarded untouched
    #[serde(default)]
    pub options: serde_json::Value,
}

/// Package settings sent with every request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Configuration format version
    pub version: String,
    /// Engine name
    pub engine: Engine,
    /// Package name
    pub package: String,
    /// Schema source names
    pub schema: Vec<String>,
    /// Query source names
    pub queries: Vec<String>,
    /// Options of the built-in Rust backend, when it is the target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rust: Option<RustOptions>,
    /// Options of the JSON backend, when it is the target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<JsonOptions>,
    /// Plugin invocation, when a plugin is the target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codegen: Option<Codegen>,
}

/// Everything a backend needs to generate code for one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Package settings
    pub settings: Settings,
    /// Schema model
    pub catalog: Catalog,
    /// Compiled queries
    pub queries: Vec<Query>,
    /// Version of the tool that built the request
    pub sqlforge_version: String,
    /// Options of the targeted plugin, as JSON
    #[serde(default)]
    pub plugin_options: serde_json::Value,
}

impl GenerateRequest {
    /// Build a request from a compiled package
    #[must_use]
    pub fn new(settings: Settings, result: CompiledResult) -> Self {
        let plugin_options = settings
            .codegen
            .as_ref()
            .map_or(serde_json::Value::Null, |c| c.options.clone());
        Self {
            settings,
            catalog: result.catalog,
            queries: result.queries,
            sqlforge_version: sqlforge_core::VERSION.to_string(),
            plugin_options,
        }
    }
}

/// One generated file
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct File {
    /// File name, relative to the backend's output directory
    pub name: String,
    /// UTF-8 contents
    pub contents: String,
}

impl File {
    /// Create a file
    #[must_use]
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// Files produced by a backend, sorted by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Generated files
    pub files: Vec<File>,
}

impl GenerateResponse {
    /// Create a response, sorting files by name
    #[must_use]
    pub fn new(mut files: Vec<File>) -> Self {
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Self { files }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_options_defaults_fill_in() {
        let options: RustOptions =
            serde_json::from_str(r#"{"out": "src/db", "sql_driver": "sqlx"}"#).unwrap();
        assert_eq!(options.package, "db");
        assert_eq!(options.sql_driver, Driver::Sqlx);
        assert!(!options.emit_interface);
    }

    #[test]
    fn test_unknown_driver_rejected() {
        let err = serde_json::from_str::<RustOptions>(r#"{"sql_driver": "diesel"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_response_sorted() {
        let response = GenerateResponse::new(vec![File::new("b.rs", ""), File::new("a.rs", "")]);
        let names: Vec<&str> = response.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.rs", "b.rs"]);
    }

    #[test]
    fn test_request_carries_plugin_options() {
        let settings = Settings {
            version: "1".to_string(),
            engine: Engine::PostgreSql,
            package: "authors".to_string(),
            schema: vec!["schema.sql".to_string()],
            queries: vec!["queries.sql".to_string()],
            rust: None,
            json: None,
            codegen: Some(Codegen {
                plugin: "echo".to_string(),
                out: "gen".to_string(),
                options: serde_json::json!({"flavor": "mild"}),
            }),
        };
        let result = CompiledResult {
            catalog: Catalog::new(),
            queries: Vec::new(),
        };
        let request = GenerateRequest::new(settings, result);
        assert_eq!(request.plugin_options["flavor"], "mild");
        assert_eq!(request.sqlforge_version, sqlforge_core::VERSION);
    }
}
