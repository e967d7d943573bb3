//! Hostbridge Runtime
//!
//! A reference [`TypeSystemProvider`](hostbridge_sdk::TypeSystemProvider)
//! for the broker. Module images are JSON manifests declaring types and
//! members; member bodies are Rust closures the host registers by symbol in
//! a [`NativeRegistry`].
//!
//! # Example
//!
//! ```ignore
//! use hostbridge_runtime::ManifestProvider;
//! use hostbridge_sdk::Value;
//!
//! let provider = ManifestProvider::new();
//! provider.natives().register("Sample.Widget::Compute", |call| {
//!     Ok(Value::I32(call.arg_i32(0)? * 2))
//! });
//! ```

#![warn(missing_docs)]

pub mod builtin;
mod convert;
mod loader;
pub mod manifest;
pub mod model;
pub mod natives;
pub mod object;
pub mod provider;

pub use crate::builtin::CORE_MODULE_NAME;
pub use manifest::ModuleManifest;
pub use model::{ContextInfo, ModuleInfo, TypeInfo};
pub use natives::{NativeCall, NativeFn, NativeRegistry};
pub use object::ManagedObject;
pub use provider::{ManifestProvider, DEFAULT_CONTEXT_NAME};
