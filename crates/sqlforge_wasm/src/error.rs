//! Sandbox errors.

use sqlforge_core::Checksum;
use std::path::PathBuf;

/// Result type for sandbox operations
pub type WasmResult<T> = Result<T, WasmError>;

/// Errors from fetching, verifying or running a module
#[derive(Debug, thiserror::Error)]
pub enum WasmError {
    /// The module URL does not parse
    #[error("invalid module url {url}: {message}")]
    InvalidUrl {
        /// Configured URL
        url: String,
        /// Parser message
        message: String,
    },

    /// Only `file`, `http` and `https` are fetched
    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),

    /// Download failed
    #[error("fetch {url}: {message}")]
    Fetch {
        /// Module URL
        url: String,
        /// Transport or status message
        message: String,
    },

    /// Local file access failed
    #[error("{}: {source}", .path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The module bytes do not hash to the configured checksum
    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Module URL
        url: String,
        /// Configured SHA-256
        expected: Checksum,
        /// SHA-256 of the fetched bytes
        actual: Checksum,
    },

    /// Engine setup, compilation or linking failed
    #[error("compile: {0}")]
    Compile(String),

    /// The module ran out of fuel
    #[error("module ran out of fuel")]
    OutOfFuel,

    /// The module exited with a non-zero status
    #[error("module exited with status {code}: {stderr}")]
    Exit {
        /// Exit status
        code: i32,
        /// Captured stderr
        stderr: String,
    },

    /// The module trapped
    #[error("module trapped: {message}")]
    Trap {
        /// Trap description
        message: String,
        /// Captured stderr
        stderr: String,
    },
}
