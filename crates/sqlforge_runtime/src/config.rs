//! Project configuration.
//!
//! A configuration file declares plugins and SQL packages. Each package
//! names its engine, schema and query sources, and the generators to run:
//! the built-in `rust` and `json` backends under `gen`, and any number of
//! plugins under `codegen`.

use serde::{Deserialize, Serialize};
use sqlforge_codegen::{Codegen, JsonOptions, RustOptions};
use sqlforge_core::{Checksum, SqlSource};
use sqlforge_sql::Engine;
use std::path::{Path, PathBuf};

/// The only supported configuration version
pub const CONFIG_VERSION: &str = "1";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "sqlforge.json";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("{}: {source}", .path.display())]
    Read {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The text is not a valid configuration document
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// No `version` key
    #[error("no version number in configuration")]
    MissingVersion,

    /// A version other than `"1"`
    #[error("invalid version number: {0}")]
    UnknownVersion(String),

    /// No `sql` entries
    #[error("no packages in configuration")]
    NoPackages,

    /// The engine of a package is not supported
    #[error("package {package}: unknown engine {engine:?}")]
    UnknownEngine {
        /// Package name
        package: String,
        /// Configured engine
        engine: String,
    },

    /// A package references an undeclared plugin
    #[error("package {package}: plugin not found: {plugin}")]
    PluginNotFound {
        /// Package name
        package: String,
        /// Referenced plugin
        plugin: String,
    },

    /// A plugin sets neither or both of `process` and `wasm`
    #[error("plugin {0}: exactly one of process or wasm must be set")]
    PluginKind(String),

    /// Process plugins are switched off
    #[error("plugin {0}: process-based plugins disabled via SQLFORGE_DEBUG=processplugins=0")]
    ProcessPluginsDisabled(String),

    /// A plugin backend could not be set up
    #[error("plugin {plugin}: {message}")]
    Plugin {
        /// Plugin name
        plugin: String,
        /// What went wrong
        message: String,
    },

    /// A package lists no schema or no query sources
    #[error("package {package}: no {kind} sources")]
    EmptySources {
        /// Package name
        package: String,
        /// `schema` or `queries`
        kind: &'static str,
    },
}

/// A code generator plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plugin {
    /// Name packages refer to
    pub name: String,
    /// Run as a child process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<ProcessPlugin>,
    /// Run as a sandboxed module
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wasm: Option<WasmPlugin>,
}

/// Child-process plugin settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessPlugin {
    /// Command to run
    pub cmd: String,
}

/// Sandboxed-module plugin settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasmPlugin {
    /// `file://`, `http://` or `https://` URL of the module
    pub url: String,
    /// Expected SHA-256 of the module bytes
    pub sha256: Checksum,
}

/// A schema or query source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Source {
    /// SQL written in the configuration
    Inline {
        /// Name used in diagnostics and output file names
        name: String,
        /// SQL text
        sql: String,
    },
    /// A file, or a directory of `.sql` files, relative to the configuration
    File {
        /// Path
        path: PathBuf,
    },
}

impl Source {
    /// Read the source, resolving paths against `base`.
    ///
    /// A directory yields its `.sql` files in name order.
    ///
    /// # Errors
    ///
    /// Returns error if a file or directory cannot be read
    pub fn load(&self, base: &Path) -> Result<Vec<SqlSource>, ConfigError> {
        match self {
            Self::Inline { name, sql } => Ok(vec![SqlSource::new(name.clone(), sql.as_str())]),
            Self::File { path } => {
                let full = base.join(path);
                if full.is_dir() {
                    let read_err = |source| ConfigError::Read {
                        path: full.clone(),
                        source,
                    };
                    let mut names = Vec::new();
                    for entry in std::fs::read_dir(&full).map_err(read_err)? {
                        let entry = entry.map_err(read_err)?;
                        let file_name = entry.file_name();
                        if Path::new(&file_name).extension().is_some_and(|e| e == "sql") {
                            names.push(file_name);
                        }
                    }
                    names.sort();
                    names
                        .into_iter()
                        .map(|n| read_file(&full.join(&n), &path.join(&n)))
                        .collect()
                } else {
                    Ok(vec![read_file(&full, path)?])
                }
            }
        }
    }
}

fn read_file(full: &Path, name: &Path) -> Result<SqlSource, ConfigError> {
    let text = std::fs::read_to_string(full).map_err(|source| ConfigError::Read {
        path: full.to_path_buf(),
        source,
    })?;
    Ok(SqlSource::new(name.to_string_lossy(), text))
}

/// Built-in generators of a package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gen {
    /// Rust source through the template backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rust: Option<RustOptions>,
    /// The request as JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<JsonOptions>,
}

/// One SQL package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Package name
    pub name: String,
    /// Engine name
    #[serde(default)]
    pub engine: String,
    /// Schema sources
    #[serde(default)]
    pub schema: Vec<Source>,
    /// Query sources
    #[serde(default)]
    pub queries: Vec<Source>,
    /// Built-in generators
    #[serde(default)]
    pub r#gen: Gen,
    /// Plugin generators
    #[serde(default)]
    pub codegen: Vec<Codegen>,
}

impl Package {
    /// The parsed engine
    ///
    /// # Errors
    ///
    /// Returns error if the engine is unknown
    pub fn engine(&self) -> Result<Engine, ConfigError> {
        self.engine.parse().map_err(|_| ConfigError::UnknownEngine {
            package: self.name.clone(),
            engine: self.engine.clone(),
        })
    }
}

/// A configuration document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Format version, always `"1"`
    #[serde(default)]
    pub version: String,
    /// Declared plugins
    #[serde(default)]
    pub plugins: Vec<Plugin>,
    /// Packages
    #[serde(default)]
    pub sql: Vec<Package>,
}

impl Config {
    /// Parse and validate a configuration document
    ///
    /// # Errors
    ///
    /// Returns error if the document is malformed or invalid
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is invalid
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Look up a plugin by name
    #[must_use]
    pub fn plugin(&self, name: &str) -> Option<&Plugin> {
        self.plugins.iter().find(|p| p.name == name)
    }

    /// Check everything that can be checked without touching sources
    ///
    /// # Errors
    ///
    /// Returns the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.version.as_str() {
            "" => return Err(ConfigError::MissingVersion),
            CONFIG_VERSION => {}
            other => return Err(ConfigError::UnknownVersion(other.to_string())),
        }
        if self.sql.is_empty() {
            return Err(ConfigError::NoPackages);
        }
        for plugin in &self.plugins {
            if plugin.process.is_some() == plugin.wasm.is_some() {
                return Err(ConfigError::PluginKind(plugin.name.clone()));
            }
        }
        for package in &self.sql {
            package.engine()?;
            if package.schema.is_empty() {
                return Err(ConfigError::EmptySources {
                    package: package.name.clone(),
                    kind: "schema",
                });
            }
            if package.queries.is_empty() {
                return Err(ConfigError::EmptySources {
                    package: package.name.clone(),
                    kind: "queries",
                });
            }
            for codegen in &package.codegen {
                if self.plugin(&codegen.plugin).is_none() {
                    return Err(ConfigError::PluginNotFound {
                        package: package.name.clone(),
                        plugin: codegen.plugin.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"{
        "version": "1",
        "plugins": [
            { "name": "echo", "process": { "cmd": "/usr/bin/echo-gen" } },
            { "name": "wasm-gen", "wasm": {
                "url": "https://example.com/gen.wasm",
                "sha256": "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
            } }
        ],
        "sql": [
            {
                "name": "authors",
                "engine": "postgresql",
                "schema": [ { "path": "schema.sql" } ],
                "queries": [ { "name": "queries", "sql": "-- name: GetAuthor :one\nSELECT 1;" } ],
                "gen": {
                    "rust": { "package": "db", "out": "src/db", "sql_driver": "tokio-postgres", "emit_interface": true },
                    "json": { "out": "gen", "filename": "codegen.json", "indent": "  " }
                },
                "codegen": [ { "plugin": "echo", "out": "plugin", "options": { "flavor": "mild" } } ]
            }
        ]
    }"#;

    fn with_package(extra: &str) -> String {
        format!(
            r#"{{"version": "1", {} "sql": [{{"name": "p", "engine": "postgresql",
                "schema": [{{"path": "s.sql"}}], "queries": [{{"path": "q.sql"}}],
                "codegen": [{{"plugin": "gen", "out": "o"}}]}}]}}"#,
            extra
        )
    }

    #[test]
    fn test_parse_example() {
        let config = Config::parse(EXAMPLE).unwrap();
        assert_eq!(config.plugins.len(), 2);
        let package = &config.sql[0];
        assert_eq!(package.engine().unwrap(), Engine::PostgreSql);
        assert_eq!(package.schema, vec![Source::File { path: PathBuf::from("schema.sql") }]);
        assert!(matches!(&package.queries[0], Source::Inline { name, .. } if name == "queries"));
        let rust = package.r#gen.rust.as_ref().unwrap();
        assert_eq!(rust.out, "src/db");
        assert!(rust.emit_interface);
        assert_eq!(package.r#gen.json.as_ref().unwrap().filename, "codegen.json");
        assert_eq!(package.codegen[0].options["flavor"], "mild");
        assert_eq!(
            config.plugin("wasm-gen").unwrap().wasm.as_ref().unwrap().sha256,
            Checksum::compute(b"abc")
        );
    }

    #[test]
    fn test_missing_version() {
        let err = Config::parse(r#"{"sql": []}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVersion));
        assert_eq!(err.to_string(), "no version number in configuration");
    }

    #[test]
    fn test_unknown_version() {
        let err = Config::parse(r#"{"version": "2"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownVersion(ref v) if v == "2"));
    }

    #[test]
    fn test_no_packages() {
        let err = Config::parse(r#"{"version": "1"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::NoPackages));
    }

    #[test]
    fn test_unknown_engine() {
        let text = r#"{"version": "1", "sql": [{"name": "p", "engine": "mysql",
            "schema": [{"path": "s.sql"}], "queries": [{"path": "q.sql"}]}]}"#;
        let err = Config::parse(text).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownEngine { ref engine, .. } if engine == "mysql"));
    }

    #[test]
    fn test_plugin_not_found() {
        let err = Config::parse(&with_package("")).unwrap_err();
        assert!(matches!(err, ConfigError::PluginNotFound { ref plugin, .. } if plugin == "gen"));
        assert!(err.to_string().contains("plugin not found: gen"));
    }

    #[test]
    fn test_plugin_kind() {
        let neither = with_package(r#""plugins": [{"name": "gen"}],"#);
        assert!(matches!(Config::parse(&neither), Err(ConfigError::PluginKind(_))));

        let both = with_package(
            r#""plugins": [{"name": "gen", "process": {"cmd": "x"},
                "wasm": {"url": "file:///x.wasm", "sha256": "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"}}],"#,
        );
        assert!(matches!(Config::parse(&both), Err(ConfigError::PluginKind(_))));

        let one = with_package(r#""plugins": [{"name": "gen", "process": {"cmd": "x"}}],"#);
        assert!(Config::parse(&one).is_ok());
    }

    #[test]
    fn test_empty_sources() {
        let text = r#"{"version": "1", "sql": [{"name": "p", "engine": "postgresql",
            "schema": [{"path": "s.sql"}], "queries": []}]}"#;
        let err = Config::parse(text).unwrap_err();
        assert!(matches!(err, ConfigError::EmptySources { kind: "queries", .. }));
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let text = with_package(r#""plugins": [{"name": "gen", "wasm": {"url": "file:///x.wasm", "sha256": "zz"}}],"#);
        assert!(matches!(Config::parse(&text), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_sources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("schema.sql"), "CREATE TABLE t (id int);").unwrap();
        std::fs::create_dir(dir.path().join("queries")).unwrap();
        std::fs::write(dir.path().join("queries/b.sql"), "-- b").unwrap();
        std::fs::write(dir.path().join("queries/a.sql"), "-- a").unwrap();
        std::fs::write(dir.path().join("queries/notes.txt"), "skip").unwrap();

        let file = Source::File { path: PathBuf::from("schema.sql") };
        let sources = file.load(dir.path()).unwrap();
        assert_eq!(sources[0].name, "schema.sql");
        assert_eq!(&*sources[0].text, "CREATE TABLE t (id int);");

        let directory = Source::File { path: PathBuf::from("queries") };
        let names: Vec<String> = directory
            .load(dir.path())
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec![
            Path::new("queries").join("a.sql").to_string_lossy().to_string(),
            Path::new("queries").join("b.sql").to_string_lossy().to_string(),
        ]);

        let missing = Source::File { path: PathBuf::from("nope.sql") };
        assert!(matches!(missing.load(dir.path()), Err(ConfigError::Read { .. })));
    }
}
