//! Instance handles: create, invoke, access and destroy
//!
//! Object-typed parameters and return values travel as instance handles in
//! pointer-sized slots. An object returned to native code gets a fresh
//! strong handle owned by the module that defines its type; a zero handle
//! stands for null in both directions. Returned handles are never shared,
//! so each one stays in the table until the caller destroys it or the
//! owning context unloads. Types of the default context never unload.

use hostbridge_sdk::{
    BindingScope, FieldRef, ManagedType, MemberRef, ObjectRef, PropertyRef, TypeKind, TypeRef,
    Value,
};
use tracing::{debug, trace};

use super::Broker;
use crate::cache::EntityId;
use crate::error::{BrokerError, BrokerResult};
use crate::handles::InstanceHandle;
use crate::marshal::{marshal_arguments, marshal_return, read_value, MarshalError};
use crate::resolver::semantic_tag;

/// Name the resolver uses for constructor lookups
const CONSTRUCTOR_NAME: &str = ".ctor";

/// A value ready to be written back to native code
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    /// The value; objects have already been turned into handles
    pub value: Value,
    /// Declared tag, or `None` for `void`
    pub declared: Option<ManagedType>,
}

impl TypedValue {
    /// Write the value into `out`; `void` values write nothing
    pub fn write_to(&self, out: Option<&mut [u8]>) -> Result<(), MarshalError> {
        marshal_return(&self.value, self.declared, out)
    }
}

impl Broker {
    // ========================================================================
    // Value conversion
    // ========================================================================

    fn object_to_handle(&mut self, object: &ObjectRef) -> BrokerResult<InstanceHandle> {
        let ty = self.provider.object_type(object)?;
        Ok(self.allocate_handle(&ty, object, false))
    }

    fn allocate_handle(&mut self, ty: &TypeRef, object: &ObjectRef, weak: bool) -> InstanceHandle {
        let owner = self
            .provider
            .type_module(ty)
            .and_then(|module| self.contexts.module_id_of(&module));
        let handle = self.handles.allocate(object, weak, owner);
        if let Some(owner) = owner {
            self.contexts.track_handle(owner, handle);
        }
        trace!(handle = handle.get(), weak, "allocated instance handle");
        handle
    }

    fn handle_to_object(&self, raw: usize) -> BrokerResult<Value> {
        match InstanceHandle::from_raw(raw as u64) {
            None => Ok(Value::Null),
            Some(handle) => Ok(Value::Object(self.handles.target(handle)?)),
        }
    }

    /// Turn a slot value into what a parameter of type `ty` expects
    fn incoming(&self, ty: &TypeRef, value: Value) -> BrokerResult<Value> {
        match (self.provider.type_kind(ty), value) {
            (kind, Value::Pointer(raw)) if kind.is_object() => self.handle_to_object(raw),
            (_, value) => Ok(value),
        }
    }

    /// Turn a provider result of declared type `ty` into a native value
    fn outgoing(&mut self, ty: &TypeRef, value: Value) -> BrokerResult<TypedValue> {
        let kind = self.provider.type_kind(ty);
        let declared = match kind {
            TypeKind::Void => None,
            _ => Some(kind.managed_type()),
        };
        let value = match value {
            Value::Object(object) => Value::Pointer(self.object_to_handle(&object)?.get() as usize),
            other => other,
        };
        Ok(TypedValue { value, declared })
    }

    fn marshal_call_args(
        &self,
        params: &[TypeRef],
        args: Option<&[u8]>,
        tags: &[ManagedType],
    ) -> BrokerResult<Vec<Value>> {
        let param_tags: Vec<ManagedType> = params
            .iter()
            .map(|param| semantic_tag(self.provider(), param))
            .collect();
        let values = marshal_arguments(args, tags, &param_tags)?.unwrap_or_default();
        params
            .iter()
            .zip(values)
            .map(|(param, value)| self.incoming(param, value))
            .collect()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Construct an instance of `type_id` and return an ownership handle.
    ///
    /// The constructor must match the argument tags exactly. A `weak` handle
    /// does not keep the object alive: it only resolves while something
    /// else in the runtime retains the object, and fails with
    /// [`BrokerError::TargetCollected`] afterwards. A provider whose objects
    /// are referenced only through handles hands back a weak handle that is
    /// already stale.
    pub fn create_instance(
        &mut self,
        type_id: EntityId,
        weak: bool,
        args: Option<&[u8]>,
        tags: &[ManagedType],
    ) -> BrokerResult<InstanceHandle> {
        let ty = self.ty(type_id)?;
        let ctor = self.resolver.resolve(
            &*self.provider,
            &ty,
            CONSTRUCTOR_NAME,
            tags,
            BindingScope::Constructor,
        )?;
        let params = self.provider.method_parameters(&ctor);
        let args = self.marshal_call_args(&params, args, tags)?;
        let object = self.provider.construct(&ty, &ctor, args)?;
        let handle = self.allocate_handle(&ty, &object, weak);
        debug!(
            handle = handle.get(),
            type_name = %self.provider.full_name(&ty),
            weak,
            "created instance"
        );
        Ok(handle)
    }

    /// Release an instance handle.
    ///
    /// Releasing a handle that is not live fails with
    /// [`BrokerError::HandleNotFound`] instead of faulting.
    pub fn destroy_instance(&mut self, handle: InstanceHandle) -> BrokerResult<()> {
        if !self.handles.release(handle) {
            return Err(BrokerError::HandleNotFound(handle.get()));
        }
        debug!(handle = handle.get(), "destroyed instance");
        Ok(())
    }

    // ========================================================================
    // Invocation
    // ========================================================================

    fn invoke_resolved(
        &mut self,
        ty: &TypeRef,
        target: Option<&ObjectRef>,
        name: &str,
        args: Option<&[u8]>,
        tags: &[ManagedType],
        scope: BindingScope,
    ) -> BrokerResult<TypedValue> {
        let method = self.resolver.resolve(&*self.provider, ty, name, tags, scope)?;
        let params = self.provider.method_parameters(&method);
        let args = self.marshal_call_args(&params, args, tags)?;
        let result = self.provider.invoke(&method, target, args)?;
        let return_type = self.provider.member_type(MemberRef::Method(&method));
        self.outgoing(&return_type, result)
    }

    /// Invoke an instance method on the object behind `handle`
    pub fn invoke_instance_method(
        &mut self,
        handle: InstanceHandle,
        name: &str,
        args: Option<&[u8]>,
        tags: &[ManagedType],
    ) -> BrokerResult<TypedValue> {
        let target = self.handles.target(handle)?;
        let ty = self.provider.object_type(&target)?;
        self.invoke_resolved(&ty, Some(&target), name, args, tags, BindingScope::Instance)
    }

    /// Invoke a static method of `type_id`
    pub fn invoke_static_method(
        &mut self,
        type_id: EntityId,
        name: &str,
        args: Option<&[u8]>,
        tags: &[ManagedType],
    ) -> BrokerResult<TypedValue> {
        let ty = self.ty(type_id)?;
        self.invoke_resolved(&ty, None, name, args, tags, BindingScope::Static)
    }

    // ========================================================================
    // Fields and properties
    // ========================================================================

    fn find_field(&self, ty: &TypeRef, name: &str) -> BrokerResult<FieldRef> {
        self.type_chain(ty)
            .iter()
            .flat_map(|t| self.provider.fields(t))
            .find(|field| self.provider.member_name(MemberRef::Field(field)) == name)
            .ok_or_else(|| BrokerError::MemberNotFound {
                kind: "field",
                type_name: self.provider.full_name(ty),
                name: name.to_string(),
            })
    }

    fn find_property(&self, ty: &TypeRef, name: &str) -> BrokerResult<PropertyRef> {
        self.type_chain(ty)
            .iter()
            .flat_map(|t| self.provider.properties(t))
            .find(|property| self.provider.member_name(MemberRef::Property(property)) == name)
            .ok_or_else(|| BrokerError::MemberNotFound {
                kind: "property",
                type_name: self.provider.full_name(ty),
                name: name.to_string(),
            })
    }

    fn read_single(&self, ty: &TypeRef, value: Option<&[u8]>) -> BrokerResult<Value> {
        let tag = semantic_tag(self.provider(), ty);
        let bytes = value.ok_or(MarshalError::MissingBuffer(1))?;
        let value = read_value(bytes, tag)?;
        self.incoming(ty, value)
    }

    /// Read a field of the object behind `handle`
    pub fn get_field(&mut self, handle: InstanceHandle, name: &str) -> BrokerResult<TypedValue> {
        let target = self.handles.target(handle)?;
        let ty = self.provider.object_type(&target)?;
        let field = self.find_field(&ty, name)?;
        let value = self.provider.get_field(&target, &field)?;
        let field_type = self.provider.member_type(MemberRef::Field(&field));
        self.outgoing(&field_type, value)
    }

    /// Write a field of the object behind `handle` from a single slot
    pub fn set_field(
        &mut self,
        handle: InstanceHandle,
        name: &str,
        value: Option<&[u8]>,
    ) -> BrokerResult<()> {
        let target = self.handles.target(handle)?;
        let ty = self.provider.object_type(&target)?;
        let field = self.find_field(&ty, name)?;
        let field_type = self.provider.member_type(MemberRef::Field(&field));
        let value = self.read_single(&field_type, value)?;
        Ok(self.provider.set_field(&target, &field, value)?)
    }

    /// Read a property of the object behind `handle`
    pub fn get_property(&mut self, handle: InstanceHandle, name: &str) -> BrokerResult<TypedValue> {
        let target = self.handles.target(handle)?;
        let ty = self.provider.object_type(&target)?;
        let property = self.find_property(&ty, name)?;
        let value = self.provider.get_property(&target, &property)?;
        let property_type = self.provider.member_type(MemberRef::Property(&property));
        self.outgoing(&property_type, value)
    }

    /// Write a property of the object behind `handle` from a single slot
    pub fn set_property(
        &mut self,
        handle: InstanceHandle,
        name: &str,
        value: Option<&[u8]>,
    ) -> BrokerResult<()> {
        let target = self.handles.target(handle)?;
        let ty = self.provider.object_type(&target)?;
        let property = self.find_property(&ty, name)?;
        let property_type = self.provider.member_type(MemberRef::Property(&property));
        let value = self.read_single(&property_type, value)?;
        Ok(self.provider.set_property(&target, &property, value)?)
    }
}
