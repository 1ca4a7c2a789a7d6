//! Debug switches.
//!
//! Debug behaviour is an explicit value handed to the compiler and the
//! orchestrator at construction time. The CLI builds it from the
//! `SQLFORGE_DEBUG` environment variable with [`DebugOptions::parse`].

use serde::{Deserialize, Serialize};

/// Debug switches for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugOptions {
    /// Log the catalog after schema parsing
    pub dump_catalog: bool,
    /// Log every generation request before dispatch
    pub dump_request: bool,
    /// Allow process-based plugins to run
    pub process_plugins: bool,
}

impl DebugOptions {
    /// Create the default options: nothing dumped, process plugins allowed
    #[must_use]
    pub const fn new() -> Self {
        Self {
            dump_catalog: false,
            dump_request: false,
            process_plugins: true,
        }
    }

    /// Parse a comma-separated list of `key=value` switches.
    ///
    /// Recognized keys are `dumpcatalog`, `dumprequest` and `processplugins`;
    /// a value of `1` enables a switch and `0` disables it. Unknown keys and
    /// malformed entries are ignored.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let mut opts = Self::new();
        for pair in value.split(',') {
            let Some((key, val)) = pair.trim().split_once('=') else {
                continue;
            };
            let enabled = match val.trim() {
                "1" => true,
                "0" => false,
                _ => continue,
            };
            match key.trim() {
                "dumpcatalog" => opts.dump_catalog = enabled,
                "dumprequest" => opts.dump_request = enabled,
                "processplugins" => opts.process_plugins = enabled,
                _ => {}
            }
        }
        opts
    }

    /// Enable catalog dumps
    #[must_use]
    pub fn with_dump_catalog(mut self, enable: bool) -> Self {
        self.dump_catalog = enable;
        self
    }

    /// Enable or disable process plugins
    #[must_use]
    pub fn with_process_plugins(mut self, enable: bool) -> Self {
        self.process_plugins = enable;
        self
    }
}

impl Default for DebugOptions {
    fn default() -> Self {
        Self::new()
    }
}
