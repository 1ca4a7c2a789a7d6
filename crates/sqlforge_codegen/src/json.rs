//! Backend that writes the request itself as JSON.

use crate::backend::{BackendError, BackendResult, GenerateBackend, GenerateContext};
use crate::request::{File, GenerateRequest, GenerateResponse};
use async_trait::async_trait;
use serde::Serialize;

/// Serializes the full request into one file
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonBackend;

impl JsonBackend {
    /// Create a JSON backend
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn encode(request: &GenerateRequest) -> BackendResult<File> {
        let options = request.settings.json.clone().unwrap_or_default();
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(options.indent.as_bytes());
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        request.serialize(&mut ser).map_err(BackendError::Encode)?;
        buf.push(b'\n');
        let contents = String::from_utf8(buf).map_err(|err| {
            BackendError::Encode(serde_json::Error::io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                err,
            )))
        })?;
        Ok(File::new(options.filename, contents))
    }
}

#[async_trait]
impl GenerateBackend for JsonBackend {
    fn name(&self) -> &str {
        "json"
    }

    async fn generate(
        &self,
        ctx: &GenerateContext,
        request: &GenerateRequest,
    ) -> BackendResult<GenerateResponse> {
        if ctx.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        let file = Self::encode(request)?;
        tracing::debug!(file = %file.name, bytes = file.contents.len(), "encoded request");
        Ok(GenerateResponse::new(vec![file]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{JsonOptions, Settings};
    use sqlforge_compiler::CompiledResult;
    use sqlforge_sql::{Catalog, Engine};

    fn request(json: Option<JsonOptions>) -> GenerateRequest {
        let settings = Settings {
            version: "1".to_string(),
            engine: Engine::PostgreSql,
            package: "authors".to_string(),
            schema: vec!["schema.sql".to_string()],
            queries: vec!["query.sql".to_string()],
            rust: None,
            json,
            codegen: None,
        };
        GenerateRequest::new(
            settings,
            CompiledResult {
                catalog: Catalog::new(),
                queries: Vec::new(),
            },
        )
    }

    #[tokio::test]
    async fn test_default_file() {
        let request = request(None);
        let response = JsonBackend::new()
            .generate(&GenerateContext::new(), &request)
            .await
            .unwrap();
        assert_eq!(response.files.len(), 1);
        let file = &response.files[0];
        assert_eq!(file.name, "codegen_request.json");
        assert!(file.contents.starts_with("{\n  \"settings\""));
        let decoded: GenerateRequest = serde_json::from_str(&file.contents).unwrap();
        assert_eq!(decoded, request);
    }

    #[tokio::test]
    async fn test_configured_indent_and_name() {
        let request = request(Some(JsonOptions {
            out: "gen".to_string(),
            filename: "request.json".to_string(),
            indent: "\t".to_string(),
        }));
        let response = JsonBackend::new()
            .generate(&GenerateContext::new(), &request)
            .await
            .unwrap();
        assert_eq!(response.files[0].name, "request.json");
        assert!(response.files[0].contents.starts_with("{\n\t\"settings\""));
    }
}
