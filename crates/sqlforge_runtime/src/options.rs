//! Run options.

use sqlforge_core::DebugOptions;
use sqlforge_wasm::{ModuleCache, SandboxConfig};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How one run is executed
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Concurrent tasks; the host's available parallelism when unset
    pub parallelism: Option<NonZeroUsize>,
    /// Deadline for each backend call
    pub timeout: Option<Duration>,
    /// Module cache root; a directory under the system temp dir when unset
    pub wasm_cache_dir: Option<PathBuf>,
    /// Sandbox limits
    pub sandbox: SandboxConfig,
    /// Debug switches
    pub debug: DebugOptions,
    /// Cancels every in-flight backend call
    pub cancel: CancellationToken,
}

impl RunOptions {
    /// Create the default options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the number of concurrent tasks
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: Option<NonZeroUsize>) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Set the per-call deadline
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the module cache root
    #[must_use]
    pub fn with_wasm_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.wasm_cache_dir = Some(dir.into());
        self
    }

    /// Set the debug switches
    #[must_use]
    pub fn with_debug(mut self, debug: DebugOptions) -> Self {
        self.debug = debug;
        self
    }

    /// Share a cancellation token
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Effective number of concurrent tasks
    #[must_use]
    pub fn effective_parallelism(&self) -> usize {
        self.parallelism
            .or_else(|| std::thread::available_parallelism().ok())
            .map_or(1, NonZeroUsize::get)
    }

    /// The module cache
    #[must_use]
    pub fn module_cache(&self) -> ModuleCache {
        ModuleCache::new(
            self.wasm_cache_dir
                .clone()
                .unwrap_or_else(ModuleCache::default_dir),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallelism_override() {
        let options = RunOptions::new().with_parallelism(NonZeroUsize::new(3));
        assert_eq!(options.effective_parallelism(), 3);
        assert!(RunOptions::new().effective_parallelism() >= 1);
    }

    #[test]
    fn test_cache_dir() {
        let options = RunOptions::new().with_wasm_cache_dir("/tmp/modules");
        assert_eq!(options.module_cache().dir(), std::path::Path::new("/tmp/modules"));
        assert_eq!(RunOptions::new().module_cache().dir(), ModuleCache::default_dir());
    }
}
