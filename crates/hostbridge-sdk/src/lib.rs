//! Hostbridge SDK - capability surface for type-system providers
//!
//! This crate holds the types shared between the broker and the
//! reflection backend it drives: opaque entity descriptors, semantic
//! value tags, typed values, and the [`TypeSystemProvider`] trait.
//!
//! # Example
//!
//! ```ignore
//! use hostbridge_sdk::{ManagedType, TypeKind};
//!
//! assert_eq!(TypeKind::Handle.managed_type(), ManagedType::Pointer);
//! ```

#![warn(missing_docs)]

pub mod descriptor;
pub mod error;
pub mod provider;
pub mod value;

pub use descriptor::{
    AttributeRef, ContextRef, Descriptor, Entity, FieldRef, MethodRef, ModuleRef, ObjectRef,
    PropertyRef, TypeRef, WeakDescriptor, WeakObjectRef,
};
pub use error::{ProviderError, ProviderResult};
pub use provider::{
    BindingScope, InternalCall, MemberRef, ModuleResolver, NoResolver, TypeSystemProvider,
};
pub use value::{Accessibility, ManagedType, TypeKind, Value};
