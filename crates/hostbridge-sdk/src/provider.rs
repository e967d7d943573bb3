//! The type-system provider capability interface
//!
//! The broker never reflects over managed code itself. Everything it knows
//! about types, members and objects comes through [`TypeSystemProvider`],
//! and everything it needs to resolve across contexts is offered back to
//! the provider through [`ModuleResolver`].

use std::sync::Arc;

use crate::descriptor::{
    AttributeRef, ContextRef, FieldRef, MethodRef, ModuleRef, ObjectRef, PropertyRef, TypeRef,
};
use crate::error::{ProviderError, ProviderResult};
use crate::value::{Accessibility, ManagedType, TypeKind, Value};

/// Which members a lookup considers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingScope {
    /// Instance methods, including inherited ones
    Instance,
    /// Static methods, including inherited ones
    Static,
    /// Constructors declared on the type itself
    Constructor,
}

/// A borrowed reference to any member kind
#[derive(Debug, Clone, Copy)]
pub enum MemberRef<'a> {
    /// A method or constructor
    Method(&'a MethodRef),
    /// A field
    Field(&'a FieldRef),
    /// A property
    Property(&'a PropertyRef),
}

/// Hook a provider calls when it cannot resolve a referenced module itself
pub trait ModuleResolver {
    /// Look up a loaded module by name across every live context
    fn resolve_module(&mut self, name: &str) -> Option<ModuleRef>;
}

/// A resolver that never finds anything
pub struct NoResolver;

impl ModuleResolver for NoResolver {
    fn resolve_module(&mut self, _name: &str) -> Option<ModuleRef> {
        None
    }
}

/// A host function bound to a managed member by name.
///
/// Receives the call's arguments and the declared return tag
/// (`None` for `void` members).
pub type InternalCall =
    Arc<dyn Fn(&[Value], Option<ManagedType>) -> ProviderResult<Value> + Send + Sync>;

/// Reflection and object-lifetime capability the broker is built on
pub trait TypeSystemProvider: Send {
    // ------------------------------------------------------------------------
    // Contexts and modules
    // ------------------------------------------------------------------------

    /// The context the hosting process starts with
    fn default_context(&self) -> ContextRef;

    /// Modules already present in the default context at startup
    fn default_modules(&self) -> Vec<ModuleRef>;

    /// Create a new, empty, unloadable context
    fn create_context(&mut self, name: &str) -> ProviderResult<ContextRef>;

    /// Load a module image into `context`.
    ///
    /// References the provider cannot satisfy on its own go through
    /// `resolver`.
    fn load_module(
        &mut self,
        context: &ContextRef,
        image: &[u8],
        resolver: &mut dyn ModuleResolver,
    ) -> ProviderResult<ModuleRef>;

    /// Unload a context and everything it owns
    fn unload_context(&mut self, context: &ContextRef) -> ProviderResult<()>;

    /// Drop a module the broker loaded but could not register
    fn discard_module(&mut self, context: &ContextRef, module: &ModuleRef) {
        let _ = (context, module);
    }

    /// Simple name of a module
    fn module_name(&self, module: &ModuleRef) -> String;

    // ------------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------------

    /// Types defined by a module
    fn module_types(&self, module: &ModuleRef) -> ProviderResult<Vec<TypeRef>>;

    /// Built-in core types
    fn core_types(&self) -> Vec<TypeRef>;

    /// Find a type by full name or by `"Name, Module"` qualified name
    fn find_type(&self, name: &str, resolver: &mut dyn ModuleResolver) -> Option<TypeRef>;

    /// Module that defines `ty`
    fn type_module(&self, ty: &TypeRef) -> Option<ModuleRef>;

    /// Namespace-qualified name, e.g. `Sample.Widget`
    fn full_name(&self, ty: &TypeRef) -> String;

    /// Name qualified with its module, e.g. `Sample.Widget, Sample`
    fn qualified_name(&self, ty: &TypeRef) -> String;

    /// Shape of the type
    fn type_kind(&self, ty: &TypeRef) -> TypeKind;

    /// Direct base type, if any
    fn base_type(&self, ty: &TypeRef) -> Option<TypeRef>;

    /// Whether a value of `ty` can be stored in a location of `target`
    fn is_assignable_to(&self, ty: &TypeRef, target: &TypeRef) -> bool;

    /// Native size of a value of `ty`
    fn type_size(&self, ty: &TypeRef) -> ProviderResult<usize>;

    /// Element type of an array or pointer type
    fn element_type(&self, ty: &TypeRef) -> Option<TypeRef>;

    // ------------------------------------------------------------------------
    // Declared members
    // ------------------------------------------------------------------------

    /// Methods declared on `ty` itself, in declaration order
    fn methods(&self, ty: &TypeRef) -> Vec<MethodRef>;

    /// Constructors declared on `ty`
    fn constructors(&self, ty: &TypeRef) -> Vec<MethodRef>;

    /// Fields declared on `ty` itself
    fn fields(&self, ty: &TypeRef) -> Vec<FieldRef>;

    /// Properties declared on `ty` itself
    fn properties(&self, ty: &TypeRef) -> Vec<PropertyRef>;

    /// Attributes attached to `ty`
    fn type_attributes(&self, ty: &TypeRef) -> ProviderResult<Vec<AttributeRef>>;

    // ------------------------------------------------------------------------
    // Member information
    // ------------------------------------------------------------------------

    /// Simple name of a member
    fn member_name(&self, member: MemberRef<'_>) -> String;

    /// Return type of a method, or the type of a field or property
    fn member_type(&self, member: MemberRef<'_>) -> TypeRef;

    /// Declared accessibility
    fn member_accessibility(&self, member: MemberRef<'_>) -> Accessibility;

    /// Attributes attached to a member
    fn member_attributes(&self, member: MemberRef<'_>) -> ProviderResult<Vec<AttributeRef>>;

    /// Whether the member is static
    fn is_static(&self, member: MemberRef<'_>) -> bool;

    /// Rendered signature, e.g. `Int32 Compute(Int32)`
    fn method_signature(&self, method: &MethodRef) -> String;

    /// Declared parameter types in order
    fn method_parameters(&self, method: &MethodRef) -> Vec<TypeRef>;

    /// Type of an attribute instance
    fn attribute_type(&self, attribute: &AttributeRef) -> TypeRef;

    /// Named field of an attribute instance, with its declared type
    fn attribute_value(
        &self,
        attribute: &AttributeRef,
        field: &str,
    ) -> ProviderResult<(TypeRef, Value)>;

    // ------------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------------

    /// Run `ctor` on a new instance of `ty`
    fn construct(&self, ty: &TypeRef, ctor: &MethodRef, args: Vec<Value>)
        -> ProviderResult<ObjectRef>;

    /// Invoke `method`; `target` is `None` for static methods
    fn invoke(
        &self,
        method: &MethodRef,
        target: Option<&ObjectRef>,
        args: Vec<Value>,
    ) -> ProviderResult<Value>;

    /// Runtime type of an object
    fn object_type(&self, object: &ObjectRef) -> ProviderResult<TypeRef>;

    /// Read a field of an object
    fn get_field(&self, object: &ObjectRef, field: &FieldRef) -> ProviderResult<Value>;

    /// Write a field of an object
    fn set_field(&self, object: &ObjectRef, field: &FieldRef, value: Value) -> ProviderResult<()>;

    /// Read a property of an object
    fn get_property(&self, object: &ObjectRef, property: &PropertyRef) -> ProviderResult<Value>;

    /// Write a property of an object
    fn set_property(
        &self,
        object: &ObjectRef,
        property: &PropertyRef,
        value: Value,
    ) -> ProviderResult<()>;

    // ------------------------------------------------------------------------
    // Runtime services
    // ------------------------------------------------------------------------

    /// Bind a host function to every member that names `name` as its body
    fn register_internal_call(&mut self, name: &str, call: InternalCall) -> ProviderResult<()> {
        let _ = (name, call);
        Err(ProviderError::Unsupported("internal calls"))
    }

    /// Ask the runtime to reclaim unreachable objects
    fn collect_garbage(&mut self) {}

    /// Block until pending finalizers have run
    fn wait_for_pending_finalizers(&mut self) {}
}
