//! The closed set of generator backends.

use async_trait::async_trait;
use sqlforge_codegen::{
    BackendResult, GenerateBackend, GenerateContext, GenerateRequest, GenerateResponse,
    JsonBackend, ProcessBackend, TemplateBackend,
};
use sqlforge_wasm::WasmBackend;

/// A backend chosen from configuration
pub enum Backend {
    /// Built-in Rust templates
    Template(TemplateBackend),
    /// Request dump
    Json(JsonBackend),
    /// Child-process plugin
    Process(ProcessBackend),
    /// Sandboxed module plugin
    Wasm(WasmBackend),
}

impl Backend {
    /// Kind label used in logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Template(_) => "template",
            Self::Json(_) => "json",
            Self::Process(_) => "process",
            Self::Wasm(_) => "wasm",
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Backend::{}({})", self.kind(), self.name())
    }
}

#[async_trait]
impl GenerateBackend for Backend {
    fn name(&self) -> &str {
        match self {
            Self::Template(b) => b.name(),
            Self::Json(b) => b.name(),
            Self::Process(b) => b.name(),
            Self::Wasm(b) => b.name(),
        }
    }

    async fn generate(
        &self,
        ctx: &GenerateContext,
        request: &GenerateRequest,
    ) -> BackendResult<GenerateResponse> {
        match self {
            Self::Template(b) => b.generate(ctx, request).await,
            Self::Json(b) => b.generate(ctx, request).await,
            Self::Process(b) => b.generate(ctx, request).await,
            Self::Wasm(b) => b.generate(ctx, request).await,
        }
    }
}
