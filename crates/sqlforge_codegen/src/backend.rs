//! The backend capability and its execution context.

use crate::request::{GenerateRequest, GenerateResponse};
use crate::template::RenderError;
use async_trait::async_trait;
use sqlforge_core::multierr::BoxError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Result type for backend calls
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors from code generation backends
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// A backend-specific requirement is not met
    #[error("{0}")]
    Precondition(String),

    /// A template failed to render, or rendered invalid source
    #[error("{template}: {source}")]
    Render {
        /// Template name
        template: String,
        /// Text produced before the failure was detected
        raw: String,
        /// Underlying render failure
        source: RenderError,
    },

    /// The request could not be serialized
    #[error("encode request: {0}")]
    Encode(#[source] serde_json::Error),

    /// A child process failed
    #[error("process {cmd}: {message}")]
    Process {
        /// Configured command
        cmd: String,
        /// What went wrong
        message: String,
    },

    /// A generator answered with something that is not a response
    #[error("invalid response from {origin}: {message}")]
    InvalidResponse {
        /// Command or module that answered
        origin: String,
        /// Decoder message
        message: String,
    },

    /// A sandboxed module failed
    #[error("{0}")]
    Sandbox(#[source] BoxError),

    /// The call was cancelled
    #[error("cancelled")]
    Cancelled,

    /// The call ran out of time
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Per-call context: cancellation and an optional deadline
#[derive(Debug, Clone, Default)]
pub struct GenerateContext {
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl GenerateContext {
    /// Create a context that is never cancelled and has no deadline
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a shared cancellation token
    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Bound every call by a deadline
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The cancellation token
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run a future until it completes, the token fires or the deadline passes.
    ///
    /// On cancellation or timeout the future is dropped.
    ///
    /// # Errors
    ///
    /// Returns the future's error, [`BackendError::Cancelled`] or
    /// [`BackendError::Timeout`]
    pub async fn run<T, F>(&self, fut: F) -> BackendResult<T>
    where
        F: Future<Output = BackendResult<T>>,
    {
        let bounded = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, fut)
                    .await
                    .map_err(|_| BackendError::Timeout(limit))?,
                None => fut.await,
            }
        };
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(BackendError::Cancelled),
            result = bounded => result,
        }
    }
}

/// A code generator
#[async_trait]
pub trait GenerateBackend: Send + Sync {
    /// Name used in logs and diagnostics
    fn name(&self) -> &str;

    /// Generate files for one package
    ///
    /// # Errors
    ///
    /// Returns error if a precondition is unmet or generation fails
    async fn generate(
        &self,
        ctx: &GenerateContext,
        request: &GenerateRequest,
    ) -> BackendResult<GenerateResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = GenerateContext::new();
        let value = ctx.run(async { Ok::<_, BackendError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_run_cancelled() {
        let token = CancellationToken::new();
        let ctx = GenerateContext::new().with_cancel(token.clone());
        token.cancel();
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, BackendError>(())
            })
            .await;
        assert!(matches!(result, Err(BackendError::Cancelled)));
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let ctx = GenerateContext::new().with_timeout(Some(Duration::from_millis(10)));
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, BackendError>(())
            })
            .await;
        assert!(matches!(result, Err(BackendError::Timeout(_))));
    }
}
