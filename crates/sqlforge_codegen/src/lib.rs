//! SQLFORGE Codegen
//!
//! The contract between a compiled package and the code generators, and the
//! backends that live outside the sandbox:
//!
//! - [`TemplateBackend`] renders Rust source in-process through a [`Renderer`]
//! - [`JsonBackend`] writes the request itself as JSON
//! - [`ProcessBackend`] hands the request to an external command
//!
//! Every backend implements [`GenerateBackend`] and is driven with a
//! [`GenerateContext`] carrying cancellation and a deadline.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod json;
pub mod process;
pub mod request;
pub mod rust;
pub mod template;

pub use backend::{BackendError, BackendResult, GenerateBackend, GenerateContext};
pub use json::JsonBackend;
pub use process::ProcessBackend;
pub use request::{
    Codegen, Driver, File, GenerateRequest, GenerateResponse, JsonOptions, RustOptions, Settings,
};
pub use rust::RustRenderer;
pub use template::{FileNames, RenderError, Renderer, TemplateBackend, TemplateContext};
