//! Type, member and attribute queries
//!
//! Every query takes and returns cache ids. Descriptors handed out by the
//! provider are registered in the matching cache on the way out, so the
//! same entity always comes back with the same id until the next unload.
//!
//! Bulk queries fail as a whole if any single entry fails.

use hostbridge_sdk::{
    Accessibility, AttributeRef, FieldRef, ManagedType, MemberRef, MethodRef, PropertyRef,
    TypeKind, TypeRef,
};

use super::Broker;
use crate::cache::EntityId;
use crate::context::ModuleId;
use crate::error::{BrokerError, BrokerResult};
use crate::marshal::write_value;
use crate::resolver::semantic_tag;

/// Member kind selector used by member queries
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// Methods and constructors
    Method = 0,
    /// Fields
    Field = 1,
    /// Properties
    Property = 2,
}

impl MemberKind {
    /// Decode a raw kind from native code
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(MemberKind::Method),
            1 => Some(MemberKind::Field),
            2 => Some(MemberKind::Property),
            _ => None,
        }
    }
}

enum Member {
    Method(MethodRef),
    Field(FieldRef),
    Property(PropertyRef),
}

impl Member {
    fn as_ref(&self) -> MemberRef<'_> {
        match self {
            Member::Method(m) => MemberRef::Method(m),
            Member::Field(f) => MemberRef::Field(f),
            Member::Property(p) => MemberRef::Property(p),
        }
    }
}

impl Broker {
    // ========================================================================
    // Cache access
    // ========================================================================

    pub(crate) fn ty(&self, id: EntityId) -> BrokerResult<TypeRef> {
        self.caches.types.get(id).cloned()
    }

    pub(crate) fn method(&self, id: EntityId) -> BrokerResult<MethodRef> {
        self.caches.methods.get(id).cloned()
    }

    fn attribute(&self, id: EntityId) -> BrokerResult<AttributeRef> {
        self.caches.attributes.get(id).cloned()
    }

    fn member(&self, kind: MemberKind, id: EntityId) -> BrokerResult<Member> {
        Ok(match kind {
            MemberKind::Method => Member::Method(self.method(id)?),
            MemberKind::Field => Member::Field(self.caches.fields.get(id)?.clone()),
            MemberKind::Property => Member::Property(self.caches.properties.get(id)?.clone()),
        })
    }

    fn register_type(&mut self, ty: TypeRef) -> BrokerResult<EntityId> {
        self.caches.types.add(ty)
    }

    /// Walk `ty` and its ancestors, most-derived first
    pub(crate) fn type_chain(&self, ty: &TypeRef) -> Vec<TypeRef> {
        let mut chain = Vec::new();
        let mut current = Some(ty.clone());
        while let Some(t) = current {
            current = self.provider.base_type(&t);
            chain.push(t);
        }
        chain
    }

    // ========================================================================
    // Type queries
    // ========================================================================

    /// Types defined by a module
    pub fn module_types(&mut self, module: ModuleId) -> BrokerResult<Vec<EntityId>> {
        let module = self.contexts.module(module)?.module.clone();
        let types = self.provider.module_types(&module)?;
        self.caches.types.add_all(types)
    }

    /// Built-in core types
    pub fn core_types(&mut self) -> BrokerResult<Vec<EntityId>> {
        let types = self.provider.core_types();
        self.caches.types.add_all(types)
    }

    /// Find a type by full or module-qualified name
    pub fn type_by_name(&mut self, name: &str) -> BrokerResult<EntityId> {
        let ty = self
            .provider
            .find_type(name, &mut self.contexts)
            .ok_or_else(|| BrokerError::TypeNotFound(name.to_string()))?;
        self.register_type(ty)
    }

    /// Namespace-qualified type name
    pub fn full_type_name(&self, id: EntityId) -> BrokerResult<String> {
        Ok(self.provider.full_name(&self.ty(id)?))
    }

    /// Module-qualified type name
    pub fn qualified_type_name(&self, id: EntityId) -> BrokerResult<String> {
        Ok(self.provider.qualified_name(&self.ty(id)?))
    }

    /// Direct base type, if any
    pub fn base_type(&mut self, id: EntityId) -> BrokerResult<Option<EntityId>> {
        let ty = self.ty(id)?;
        self.provider
            .base_type(&ty)
            .map(|base| self.register_type(base))
            .transpose()
    }

    /// Whether `id` strictly derives from `base`
    pub fn is_derived_from(&self, id: EntityId, base: EntityId) -> BrokerResult<bool> {
        let ty = self.ty(id)?;
        let base = self.ty(base)?;
        Ok(self.type_chain(&ty).iter().skip(1).any(|t| *t == base))
    }

    /// Whether a value of `id` can be stored in a location of `target`
    pub fn is_assignable_to(&self, id: EntityId, target: EntityId) -> BrokerResult<bool> {
        Ok(self
            .provider
            .is_assignable_to(&self.ty(id)?, &self.ty(target)?))
    }

    /// Whether a value of `source` can be stored in a location of `id`
    pub fn is_assignable_from(&self, id: EntityId, source: EntityId) -> BrokerResult<bool> {
        self.is_assignable_to(source, id)
    }

    /// Native size of a value of the type
    pub fn type_size(&self, id: EntityId) -> BrokerResult<usize> {
        Ok(self.provider.type_size(&self.ty(id)?)?)
    }

    /// Whether the type is an array type
    pub fn is_array_type(&self, id: EntityId) -> BrokerResult<bool> {
        Ok(self.provider.type_kind(&self.ty(id)?) == TypeKind::Array)
    }

    /// Element type of an array or pointer type
    pub fn element_type(&mut self, id: EntityId) -> BrokerResult<Option<EntityId>> {
        let ty = self.ty(id)?;
        self.provider
            .element_type(&ty)
            .map(|element| self.register_type(element))
            .transpose()
    }

    /// Semantic tag of the type
    pub fn type_managed_type(&self, id: EntityId) -> BrokerResult<ManagedType> {
        Ok(semantic_tag(self.provider(), &self.ty(id)?))
    }

    /// Methods declared on the type and its ancestors
    pub fn type_methods(&mut self, id: EntityId) -> BrokerResult<Vec<EntityId>> {
        let ty = self.ty(id)?;
        let methods: Vec<_> = self
            .type_chain(&ty)
            .iter()
            .flat_map(|t| self.provider.methods(t))
            .collect();
        self.caches.methods.add_all(methods)
    }

    /// Constructors declared on the type
    pub fn type_constructors(&mut self, id: EntityId) -> BrokerResult<Vec<EntityId>> {
        let ty = self.ty(id)?;
        let ctors = self.provider.constructors(&ty);
        self.caches.methods.add_all(ctors)
    }

    /// Fields declared on the type and its ancestors
    pub fn type_fields(&mut self, id: EntityId) -> BrokerResult<Vec<EntityId>> {
        let ty = self.ty(id)?;
        let fields: Vec<_> = self
            .type_chain(&ty)
            .iter()
            .flat_map(|t| self.provider.fields(t))
            .collect();
        self.caches.fields.add_all(fields)
    }

    /// Properties declared on the type and its ancestors
    pub fn type_properties(&mut self, id: EntityId) -> BrokerResult<Vec<EntityId>> {
        let ty = self.ty(id)?;
        let properties: Vec<_> = self
            .type_chain(&ty)
            .iter()
            .flat_map(|t| self.provider.properties(t))
            .collect();
        self.caches.properties.add_all(properties)
    }

    /// Whether the type carries an attribute of type `attribute_type`
    /// (or a subtype of it)
    pub fn has_attribute(&self, id: EntityId, attribute_type: EntityId) -> BrokerResult<bool> {
        let ty = self.ty(id)?;
        let wanted = self.ty(attribute_type)?;
        let attributes = self.provider.type_attributes(&ty)?;
        Ok(attributes.iter().any(|attr| {
            self.provider
                .is_assignable_to(&self.provider.attribute_type(attr), &wanted)
        }))
    }

    /// Attributes attached to the type
    pub fn type_attributes(&mut self, id: EntityId) -> BrokerResult<Vec<EntityId>> {
        let ty = self.ty(id)?;
        let attributes = self.provider.type_attributes(&ty)?;
        self.caches.attributes.add_all(attributes)
    }

    // ========================================================================
    // Member queries
    // ========================================================================

    /// Simple name of a member
    pub fn member_name(&self, kind: MemberKind, id: EntityId) -> BrokerResult<String> {
        let member = self.member(kind, id)?;
        Ok(self.provider.member_name(member.as_ref()))
    }

    /// Return type of a method, or the type of a field or property
    pub fn member_declared_type(&mut self, kind: MemberKind, id: EntityId) -> BrokerResult<EntityId> {
        let member = self.member(kind, id)?;
        let ty = self.provider.member_type(member.as_ref());
        self.register_type(ty)
    }

    /// Declared accessibility of a member
    pub fn member_accessibility(&self, kind: MemberKind, id: EntityId) -> BrokerResult<Accessibility> {
        let member = self.member(kind, id)?;
        Ok(self.provider.member_accessibility(member.as_ref()))
    }

    /// Whether a member is static
    pub fn member_is_static(&self, kind: MemberKind, id: EntityId) -> BrokerResult<bool> {
        let member = self.member(kind, id)?;
        Ok(self.provider.is_static(member.as_ref()))
    }

    /// Attributes attached to a member
    pub fn member_attributes(&mut self, kind: MemberKind, id: EntityId) -> BrokerResult<Vec<EntityId>> {
        let member = self.member(kind, id)?;
        let attributes = self.provider.member_attributes(member.as_ref())?;
        self.caches.attributes.add_all(attributes)
    }

    /// Declared parameter types of a method
    pub fn method_parameter_types(&mut self, id: EntityId) -> BrokerResult<Vec<EntityId>> {
        let method = self.method(id)?;
        let params = self.provider.method_parameters(&method);
        self.caches.types.add_all(params)
    }

    /// Rendered signature of a method
    pub fn method_signature(&self, id: EntityId) -> BrokerResult<String> {
        Ok(self.provider.method_signature(&self.method(id)?))
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    /// Type of an attribute instance
    pub fn attribute_type(&mut self, id: EntityId) -> BrokerResult<EntityId> {
        let attribute = self.attribute(id)?;
        let ty = self.provider.attribute_type(&attribute);
        self.register_type(ty)
    }

    /// Write a named field of an attribute instance into `out`, returning
    /// the number of bytes written
    pub fn attribute_field_value(
        &self,
        id: EntityId,
        field: &str,
        out: &mut [u8],
    ) -> BrokerResult<usize> {
        let attribute = self.attribute(id)?;
        let (ty, value) = self.provider.attribute_value(&attribute, field)?;
        let declared = semantic_tag(self.provider(), &ty);
        Ok(write_value(&value, declared, out)?)
    }
}
