//! Backend that runs an external generator.
//!
//! The command is started as `<cmd> generate` with the request as JSON on
//! stdin. It must print a JSON response on stdout and exit with status 0;
//! anything it writes to stderr is reported when it fails. A child that
//! stops reading before the whole request is written has failed too.

use crate::backend::{BackendError, BackendResult, GenerateBackend, GenerateContext};
use crate::request::{GenerateRequest, GenerateResponse};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Environment variable carrying the tool version to the child
pub const VERSION_ENV: &str = "SQLFORGE_VERSION";

/// Runs a generator as a child process
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    name: String,
    cmd: String,
}

impl ProcessBackend {
    /// Create a backend for the plugin `name` running `cmd`
    #[must_use]
    pub fn new(name: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cmd: cmd.into(),
        }
    }

    /// The configured command
    #[must_use]
    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    fn failure(&self, message: impl Into<String>) -> BackendError {
        BackendError::Process {
            cmd: self.cmd.clone(),
            message: message.into(),
        }
    }

    async fn call(&self, input: Vec<u8>) -> BackendResult<GenerateResponse> {
        let mut child = Command::new(&self.cmd)
            .arg("generate")
            .env(VERSION_ENV, sqlforge_core::VERSION)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| self.failure(format!("spawn: {}", err)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| self.failure("failed to capture stdin"))?;
        let write = async move {
            let result = stdin.write_all(&input).await;
            drop(stdin);
            result
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output.map_err(|err| self.failure(format!("wait: {}", err)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failure(format!("{}: {}", output.status, stderr.trim())));
        }
        // The child must consume the whole request
        if let Err(err) = written {
            return Err(self.failure(format!("write stdin: {}", err)));
        }

        serde_json::from_slice(&output.stdout).map_err(|err| BackendError::InvalidResponse {
            origin: self.cmd.clone(),
            message: err.to_string(),
        })
    }
}

#[async_trait]
impl GenerateBackend for ProcessBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        ctx: &GenerateContext,
        request: &GenerateRequest,
    ) -> BackendResult<GenerateResponse> {
        let input = serde_json::to_vec(request).map_err(BackendError::Encode)?;
        tracing::debug!(plugin = %self.name, cmd = %self.cmd, bytes = input.len(), "running plugin");
        let response = ctx.run(self.call(input)).await?;
        Ok(GenerateResponse::new(response.files))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::request::Settings;
    use sqlforge_compiler::CompiledResult;
    use sqlforge_sql::{Catalog, Engine};
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn request() -> GenerateRequest {
        let settings = Settings {
            version: "1".to_string(),
            engine: Engine::PostgreSql,
            package: "authors".to_string(),
            schema: Vec::new(),
            queries: Vec::new(),
            rust: None,
            json: None,
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
    async fn test_echo_plugin() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(
            dir.path(),
            "echo.sh",
            r#"cat > /dev/null
printf '{"files":[{"name":"b.txt","contents":"%s"},{"name":"a.txt","contents":"hi"}]}' "$SQLFORGE_VERSION""#,
        );
        let backend = ProcessBackend::new("echo", path.to_string_lossy());
        let response = backend.generate(&GenerateContext::new(), &request()).await.unwrap();
        let names: Vec<&str> = response.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        assert_eq!(response.files[1].contents, sqlforge_core::VERSION);
    }

    #[tokio::test]
    async fn test_failing_plugin_names_command() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "fail.sh", "echo broken >&2\nexit 1");
        let cmd = path.to_string_lossy().to_string();
        let backend = ProcessBackend::new("fail", cmd.clone());
        let err = backend
            .generate(&GenerateContext::new(), &request())
            .await
            .unwrap_err();
        match &err {
            BackendError::Process { cmd: got, message } => {
                assert_eq!(got, &cmd);
                assert!(message.contains("broken"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains(&cmd));
    }

    #[tokio::test]
    async fn test_unread_request_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "deaf.sh", "exec 0<&-\necho '{\"files\":[]}'");
        let cmd = path.to_string_lossy().to_string();
        let backend = ProcessBackend::new("deaf", cmd.clone());
        let mut request = request();
        request.settings.package = "x".repeat(4 * 1024 * 1024);
        let err = backend.generate(&GenerateContext::new(), &request).await.unwrap_err();
        match err {
            BackendError::Process { cmd: got, message } => {
                assert_eq!(got, cmd);
                assert!(message.starts_with("write stdin:"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_garbage_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "garbage.sh", "cat > /dev/null\necho not json");
        let backend = ProcessBackend::new("garbage", path.to_string_lossy());
        let err = backend
            .generate(&GenerateContext::new(), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_missing_command() {
        let backend = ProcessBackend::new("missing", "/nonexistent/sqlforge-gen-missing");
        let err = backend
            .generate(&GenerateContext::new(), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Process { .. }));
    }

    #[tokio::test]
    async fn test_slow_plugin_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "slow.sh", "sleep 30");
        let backend = ProcessBackend::new("slow", path.to_string_lossy());
        let ctx = GenerateContext::new().with_timeout(Some(Duration::from_millis(200)));
        let err = backend.generate(&ctx, &request()).await.unwrap_err();
        assert!(matches!(err, BackendError::Timeout(_)));
    }
}
