//! Generator backend running a sandboxed module.

use crate::cache::ModuleCache;
use crate::error::{WasmError, WasmResult};
use crate::sandbox::{Sandbox, SandboxConfig};
use async_trait::async_trait;
use sqlforge_codegen::{BackendError, BackendResult, GenerateBackend, GenerateContext};
use sqlforge_codegen::{GenerateRequest, GenerateResponse};
use sqlforge_core::Checksum;
use std::sync::Arc;

/// Runs a checksum-pinned WASM module as a generator
#[derive(Clone)]
pub struct WasmBackend {
    name: String,
    url: String,
    checksum: Checksum,
    cache: ModuleCache,
    sandbox: Arc<Sandbox>,
}

impl WasmBackend {
    /// Create a backend for plugin `name`
    ///
    /// # Errors
    ///
    /// Returns error if the sandbox engine cannot be created
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        checksum: Checksum,
        cache: ModuleCache,
        config: SandboxConfig,
    ) -> WasmResult<Self> {
        Ok(Self {
            name: name.into(),
            url: url.into(),
            checksum,
            cache,
            sandbox: Arc::new(Sandbox::new(config)?),
        })
    }

    /// Module URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, input: Vec<u8>) -> WasmResult<Vec<u8>> {
        let bytes = self.cache.load(&self.url, &self.checksum).await?;
        let sandbox = Arc::clone(&self.sandbox);
        let module = tokio::task::spawn_blocking(move || sandbox.compile(&bytes))
            .await
            .map_err(|err| WasmError::Compile(format!("compile task failed: {}", err)))??;
        self.sandbox.run(&module, input).await
    }
}

impl std::fmt::Debug for WasmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmBackend")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("checksum", &self.checksum)
            .finish_non_exhaustive()
    }
}

fn sandbox_error(err: WasmError) -> BackendError {
    BackendError::Sandbox(Box::new(err))
}

#[async_trait]
impl GenerateBackend for WasmBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        ctx: &GenerateContext,
        request: &GenerateRequest,
    ) -> BackendResult<GenerateResponse> {
        let input = serde_json::to_vec(request).map_err(BackendError::Encode)?;
        tracing::debug!(plugin = %self.name, url = %self.url, "running module");
        let output = ctx
            .run(async { self.call(input).await.map_err(sandbox_error) })
            .await?;
        let response: GenerateResponse =
            serde_json::from_slice(&output).map_err(|err| BackendError::InvalidResponse {
                origin: self.url.clone(),
                message: err.to_string(),
            })?;
        Ok(GenerateResponse::new(response.files))
    }
}
