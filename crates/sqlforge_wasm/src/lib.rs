//! SQLFORGE WASM Sandbox
//!
//! Runs code generators distributed as WASI preview 1 modules. Modules are
//! addressed by URL and pinned by SHA-256; the bytes are verified before
//! they are compiled, then executed under fuel and memory limits.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod cache;
pub mod error;
pub mod sandbox;

pub use backend::WasmBackend;
pub use cache::{ModuleCache, fetch};
pub use error::{WasmError, WasmResult};
pub use sandbox::{Sandbox, SandboxConfig};
