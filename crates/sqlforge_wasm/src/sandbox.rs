//! WASI preview 1 sandbox for generator modules.
//!
//! A module gets the request on stdin and must write its response to
//! stdout. It has no preopened directories, no network and no clock beyond
//! what WASI provides; execution is bounded by fuel and linear memory.

use crate::error::{WasmError, WasmResult};
use serde::{Deserialize, Serialize};
use wasmtime::{Config, Engine, Linker, Module, Store, StoreLimits, StoreLimitsBuilder, Trap};
use wasmtime_wasi::pipe::{MemoryInputPipe, MemoryOutputPipe};
use wasmtime_wasi::preview1::{self, WasiP1Ctx};
use wasmtime_wasi::{I32Exit, WasiCtxBuilder};

/// Sandbox limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Fuel available to one run
    pub max_fuel: u64,
    /// Fuel consumed between yields to the async runtime
    pub yield_interval: u64,
    /// Linear memory limit in bytes
    pub memory_limit: usize,
    /// Largest stdout/stderr captured, in bytes
    pub max_output: usize,
}

impl SandboxConfig {
    /// Create the default limits
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_fuel: 20_000_000_000,
            yield_interval: 100_000,
            memory_limit: 512 * 1024 * 1024, // 512MB
            max_output: 64 * 1024 * 1024,
        }
    }

    /// Set maximum fuel
    #[must_use]
    pub fn with_max_fuel(mut self, fuel: u64) -> Self {
        self.max_fuel = fuel;
        self
    }

    /// Set memory limit
    #[must_use]
    pub fn with_memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = limit;
        self
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self::new()
    }
}

struct HostState {
    wasi: WasiP1Ctx,
    limits: StoreLimits,
}

/// A wasmtime engine configured for metered async execution
pub struct Sandbox {
    engine: Engine,
    config: SandboxConfig,
}

impl Sandbox {
    /// Create a sandbox
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot be configured
    pub fn new(config: SandboxConfig) -> WasmResult<Self> {
        let mut wasm_config = Config::new();
        wasm_config.async_support(true);
        wasm_config.consume_fuel(true);
        let engine = Engine::new(&wasm_config).map_err(|e| WasmError::Compile(format!("{e:#}")))?;
        Ok(Self { engine, config })
    }

    /// Get the sandbox configuration
    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Compile module bytes
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a valid module
    pub fn compile(&self, bytes: &[u8]) -> WasmResult<Module> {
        Module::new(&self.engine, bytes).map_err(|e| WasmError::Compile(format!("{e:#}")))
    }

    /// Run `_start` with `input` on stdin and return stdout.
    ///
    /// Exit status 0 is success; any other status, a trap or fuel
    /// exhaustion is an error carrying the captured stderr.
    ///
    /// # Errors
    ///
    /// Returns error if linking fails or the module does not finish cleanly
    pub async fn run(&self, module: &Module, input: Vec<u8>) -> WasmResult<Vec<u8>> {
        let stdout = MemoryOutputPipe::new(self.config.max_output);
        let stderr = MemoryOutputPipe::new(self.config.max_output);
        let wasi = WasiCtxBuilder::new()
            .stdin(MemoryInputPipe::new(input))
            .stdout(stdout.clone())
            .stderr(stderr.clone())
            .env("SQLFORGE_VERSION", sqlforge_core::VERSION)
            .args(&["plugin.wasm", "generate"])
            .build_p1();
        let limits = StoreLimitsBuilder::new()
            .memory_size(self.config.memory_limit)
            .build();

        let mut store = Store::new(&self.engine, HostState { wasi, limits });
        store.limiter(|state| &mut state.limits);
        store
            .set_fuel(self.config.max_fuel)
            .map_err(|e| WasmError::Compile(format!("{e:#}")))?;
        store
            .fuel_async_yield_interval(Some(self.config.yield_interval))
            .map_err(|e| WasmError::Compile(format!("{e:#}")))?;

        let mut linker: Linker<HostState> = Linker::new(&self.engine);
        preview1::add_to_linker_async(&mut linker, |state: &mut HostState| &mut state.wasi)
            .map_err(|e| WasmError::Compile(format!("{e:#}")))?;
        let instance = linker
            .instantiate_async(&mut store, module)
            .await
            .map_err(|e| WasmError::Compile(format!("{e:#}")))?;
        let start = instance
            .get_typed_func::<(), ()>(&mut store, "_start")
            .map_err(|e| WasmError::Compile(format!("{e:#}")))?;

        let outcome = start.call_async(&mut store, ()).await;
        let consumed = self.config.max_fuel.saturating_sub(store.get_fuel().unwrap_or(0));
        tracing::debug!(fuel = consumed, "module finished");

        if let Err(err) = outcome {
            let stderr = String::from_utf8_lossy(&stderr.contents()).trim().to_string();
            if let Some(I32Exit(code)) = err.downcast_ref::<I32Exit>() {
                if *code != 0 {
                    return Err(WasmError::Exit { code: *code, stderr });
                }
            } else if matches!(err.downcast_ref::<Trap>(), Some(Trap::OutOfFuel)) {
                return Err(WasmError::OutOfFuel);
            } else {
                return Err(WasmError::Trap {
                    message: format!("{err:#}"),
                    stderr,
                });
            }
        }
        Ok(stdout.contents().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_module(text: &str) -> Vec<u8> {
        let source = format!(
            r#"(module
                (import "wasi_snapshot_preview1" "fd_write"
                    (func $fd_write (param i32 i32 i32 i32) (result i32)))
                (memory (export "memory") 1)
                (data (i32.const 16) "{data}")
                (func (export "_start")
                    (i32.store (i32.const 0) (i32.const 16))
                    (i32.store (i32.const 4) (i32.const {len}))
                    (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 8)))))"#,
            data = text.replace('\\', "\\\\").replace('"', "\\\""),
            len = text.len()
        );
        wat::parse_str(source).unwrap()
    }

    #[tokio::test]
    async fn test_stdout_captured() {
        let sandbox = Sandbox::new(SandboxConfig::new()).unwrap();
        let module = sandbox.compile(&echo_module("hello")).unwrap();
        let out = sandbox.run(&module, b"ignored".to_vec()).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn test_exit_status() {
        let source = r#"(module
            (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
            (memory (export "memory") 1)
            (func (export "_start") (call $exit (i32.const 3))))"#;
        let sandbox = Sandbox::new(SandboxConfig::new()).unwrap();
        let module = sandbox.compile(&wat::parse_str(source).unwrap()).unwrap();
        let err = sandbox.run(&module, Vec::new()).await.unwrap_err();
        assert!(matches!(err, WasmError::Exit { code: 3, .. }));
    }

    #[tokio::test]
    async fn test_exit_zero_is_success() {
        let source = r#"(module
            (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
            (memory (export "memory") 1)
            (func (export "_start") (call $exit (i32.const 0))))"#;
        let sandbox = Sandbox::new(SandboxConfig::new()).unwrap();
        let module = sandbox.compile(&wat::parse_str(source).unwrap()).unwrap();
        assert!(sandbox.run(&module, Vec::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_fuel() {
        let source = r#"(module
            (memory (export "memory") 1)
            (func (export "_start") (loop $l (br $l))))"#;
        let sandbox = Sandbox::new(SandboxConfig::new().with_max_fuel(100_000)).unwrap();
        let module = sandbox.compile(&wat::parse_str(source).unwrap()).unwrap();
        let err = sandbox.run(&module, Vec::new()).await.unwrap_err();
        assert!(matches!(err, WasmError::OutOfFuel));
    }

    #[tokio::test]
    async fn test_missing_start() {
        let source = r#"(module (memory (export "memory") 1))"#;
        let sandbox = Sandbox::new(SandboxConfig::new()).unwrap();
        let module = sandbox.compile(&wat::parse_str(source).unwrap()).unwrap();
        let err = sandbox.run(&module, Vec::new()).await.unwrap_err();
        assert!(matches!(err, WasmError::Compile(_)));
    }

    #[test]
    fn test_invalid_module() {
        let sandbox = Sandbox::new(SandboxConfig::new()).unwrap();
        assert!(matches!(sandbox.compile(b"not wasm"), Err(WasmError::Compile(_))));
    }
}
