//! SQLFORGE Core Types
//!
//! This crate contains pure types and logic with no I/O: SQL sources,
//! source positions, aggregated file errors, checksums and debug options.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod debug;
pub mod hash;
pub mod location;
pub mod multierr;
pub mod source;

// Re-exports
pub use debug::DebugOptions;
pub use hash::{Checksum, HashError};
pub use location::LineColumn;
pub use multierr::{FileError, MultiError};
pub use source::SqlSource;

/// Version of the toolchain, reported to plugins and in generated headers.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
