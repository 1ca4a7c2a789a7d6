//! SQLFORGE Runtime
//!
//! Reads a project configuration, expands every package into one task per
//! configured backend and runs the tasks concurrently. The output is either
//! every generated file or, if anything failed, nothing plus the
//! diagnostics of each failed task.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod config;
pub mod options;
pub mod orchestrator;

pub use backend::Backend;
pub use config::{
    CONFIG_VERSION, Config, ConfigError, DEFAULT_CONFIG_FILE, Gen, Package, Plugin, ProcessPlugin,
    Source, WasmPlugin,
};
pub use options::RunOptions;
pub use orchestrator::{GenerateOutput, Orchestrator, RunError, Task, TaskFailure};
