//! Module loading
//!
//! A manifest is turned into a [`ModuleInfo`] in two passes. The first
//! creates every declared type so that members may refer to types declared
//! later in the same image (or to the declaring type itself). The second
//! links bases, members and attributes.

use std::sync::Arc;

use hostbridge_sdk::{ModuleResolver, ProviderError, ProviderResult, TypeKind};

use crate::builtin::{split_derived, CoreTypes, CORE_MODULE_NAME};
use crate::convert::json_to_value;
use crate::manifest::{
    parse_access, AttributeDecl, ModuleManifest, PropertyDecl, TypeDecl, TypeDeclKind,
};
use crate::model::{
    AttributeInfo, ContextInfo, FieldInfo, Members, MethodInfo, ModuleInfo, PropertyBody,
    PropertyInfo, TypeInfo,
};

// ============================================================================
// Type name lookup
// ============================================================================

/// Resolves type names the way manifests write them.
///
/// Accepted forms are full names (`Sample.Widget`), core keywords (`int`),
/// module-qualified names (`Sample.Widget, Sample`) and any of those with
/// `[]` or `*` suffixes.
pub(crate) struct TypeLookup<'a> {
    pub(crate) core: &'a CoreTypes,
    /// Module whose types take precedence, if any
    pub(crate) local: Option<&'a Arc<ModuleInfo>>,
    /// Further modules searched by unqualified names
    pub(crate) search: &'a [Arc<ModuleInfo>],
    pub(crate) resolver: &'a mut dyn ModuleResolver,
}

impl TypeLookup<'_> {
    /// Find a type, `Ok(None)` when no module defines it
    pub(crate) fn find(&mut self, name: &str) -> ProviderResult<Option<Arc<TypeInfo>>> {
        let name = name.trim();
        let (type_name, module_name) = match name.split_once(',') {
            Some((ty, module)) => (ty.trim(), Some(module.trim())),
            None => (name, None),
        };

        if let Some((element, kind)) = split_derived(type_name) {
            let element_name = match module_name {
                Some(module) => format!("{}, {}", element, module),
                None => element.to_string(),
            };
            return Ok(self
                .find(&element_name)?
                .map(|element| self.core.derived(&element, kind)));
        }

        if let Some(module_name) = module_name {
            let module = self.module(module_name)?;
            return Ok(if Arc::ptr_eq(&module, &self.core.module) {
                self.core.find(type_name)
            } else {
                module.find_type(type_name)
            });
        }

        if let Some(ty) = self.local.and_then(|m| m.find_type(type_name)) {
            return Ok(Some(ty));
        }
        if let Some(ty) = self.core.find(type_name) {
            return Ok(Some(ty));
        }
        Ok(self.search.iter().find_map(|m| m.find_type(type_name)))
    }

    /// Find a type, failing with an invalid-image error when it is unknown
    pub(crate) fn require(&mut self, name: &str) -> ProviderResult<Arc<TypeInfo>> {
        self.find(name)?.ok_or_else(|| {
            let module = self.local.map_or("<none>", |m| m.name.as_str());
            ProviderError::InvalidImage(format!("Unknown type {} in module {}", name, module))
        })
    }

    fn module(&mut self, name: &str) -> ProviderResult<Arc<ModuleInfo>> {
        if name == CORE_MODULE_NAME {
            return Ok(Arc::clone(&self.core.module));
        }
        if let Some(local) = self.local.filter(|m| m.name == name) {
            return Ok(Arc::clone(local));
        }
        if let Some(found) = self.search.iter().find(|m| m.name == name) {
            return Ok(Arc::clone(found));
        }
        match self.resolver.resolve_module(name) {
            Some(module) => module.downcast::<ModuleInfo>(),
            None => Err(ProviderError::ModuleNotFound(name.to_string())),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Find the module a manifest references: same context first, then any
/// other live context through `resolver`
fn resolve_reference(
    core: &CoreTypes,
    context: &ContextInfo,
    name: &str,
    resolver: &mut dyn ModuleResolver,
) -> ProviderResult<Arc<ModuleInfo>> {
    if name == CORE_MODULE_NAME {
        return Ok(Arc::clone(&core.module));
    }
    if let Some(module) = context.find_module(name) {
        return Ok(module);
    }
    match resolver.resolve_module(name) {
        Some(module) => module.downcast::<ModuleInfo>(),
        None => Err(ProviderError::ModuleNotFound(name.to_string())),
    }
}

/// Build a module from its manifest.
///
/// The module is not added to `context`; the caller does that once the
/// build has succeeded.
pub(crate) fn build_module(
    core: &CoreTypes,
    context: &ContextInfo,
    manifest: &ModuleManifest,
    resolver: &mut dyn ModuleResolver,
) -> ProviderResult<Arc<ModuleInfo>> {
    if manifest.name == CORE_MODULE_NAME || context.find_module(&manifest.name).is_some() {
        return Err(ProviderError::LoadFailed(format!(
            "Module {} is already loaded in context {}",
            manifest.name, context.name
        )));
    }

    let references = manifest
        .references
        .iter()
        .map(|name| resolve_reference(core, context, name, resolver))
        .collect::<ProviderResult<Vec<_>>>()?;

    let module = Arc::new(ModuleInfo::new(
        &manifest.name,
        manifest.version.clone(),
        references.iter().map(Arc::downgrade).collect(),
    ));

    // Pass 1: declare
    let types: Vec<Arc<TypeInfo>> = manifest
        .types
        .iter()
        .map(|decl| {
            let kind = match decl.kind {
                TypeDeclKind::Class => TypeKind::Class,
                TypeDeclKind::Struct => TypeKind::Struct,
            };
            Arc::new(TypeInfo::new(&decl.name, kind, false, Arc::downgrade(&module)))
        })
        .collect();
    let _ = module.types.set(types.clone());

    // Pass 2: bases
    let mut lookup = TypeLookup {
        core,
        local: Some(&module),
        search: &references,
        resolver,
    };
    for (decl, ty) in manifest.types.iter().zip(&types) {
        link_base(&mut lookup, decl, ty)?;
    }

    // Pass 3: members
    for (decl, ty) in manifest.types.iter().zip(&types) {
        link_members(&mut lookup, decl, ty)?;
    }

    tracing::debug!(
        module = %manifest.name,
        context = %context.name,
        types = types.len(),
        "Built module"
    );
    Ok(module)
}

fn link_base(
    lookup: &mut TypeLookup<'_>,
    decl: &TypeDecl,
    ty: &Arc<TypeInfo>,
) -> ProviderResult<()> {
    let base = match (&decl.base, ty.kind()) {
        (Some(_), TypeKind::Struct) => {
            return Err(ProviderError::InvalidImage(format!(
                "Struct {} cannot declare a base type",
                decl.name
            )))
        }
        (Some(name), _) => {
            let base = lookup.require(name)?;
            if base.kind() != TypeKind::Class {
                return Err(ProviderError::InvalidImage(format!(
                    "Base of {} must be a class, found {}",
                    decl.name,
                    base.full_name()
                )));
            }
            if base.is_subtype_of(ty) {
                return Err(ProviderError::InvalidImage(format!(
                    "Circular inheritance involving {}",
                    decl.name
                )));
            }
            Some(base)
        }
        (None, TypeKind::Class) => Some(Arc::clone(&lookup.core.object)),
        (None, _) => None,
    };
    let _ = ty.base.set(base.as_ref().map(Arc::downgrade));
    Ok(())
}

fn link_members(
    lookup: &mut TypeLookup<'_>,
    decl: &TypeDecl,
    ty: &Arc<TypeInfo>,
) -> ProviderResult<()> {
    let mut members = Members {
        attributes: link_attributes(lookup, &decl.attributes)?,
        ..Default::default()
    };

    for field in &decl.fields {
        let field_ty = lookup.require(&field.ty)?;
        if field_ty.kind() == TypeKind::Void {
            return Err(ProviderError::InvalidImage(format!(
                "Field {}.{} cannot be void",
                decl.name, field.name
            )));
        }
        if let Some(default) = &field.default {
            json_to_value(default, &field_ty).map_err(|e| {
                ProviderError::InvalidImage(format!("{}.{}: {}", decl.name, field.name, e))
            })?;
        }
        members.fields.push(Arc::new(FieldInfo {
            name: field.name.clone(),
            ty: Arc::downgrade(&field_ty),
            access: parse_access(field.access.as_deref())?,
            default: field.default.clone(),
            attributes: link_attributes(lookup, &field.attributes)?,
        }));
    }

    for property in &decl.properties {
        members
            .properties
            .push(Arc::new(link_property(lookup, property)?));
    }

    for ctor in &decl.constructors {
        members.constructors.push(Arc::new(MethodInfo {
            name: ".ctor".to_string(),
            declaring: Arc::downgrade(ty),
            params: link_params(lookup, &ctor.params)?,
            returns: Arc::downgrade(&lookup.core.void),
            is_static: false,
            is_constructor: true,
            access: parse_access(ctor.access.as_deref())?,
            native: ctor.native.clone(),
            attributes: link_attributes(lookup, &ctor.attributes)?,
        }));
    }

    for method in &decl.methods {
        let returns = match &method.returns {
            Some(name) => lookup.require(name)?,
            None => Arc::clone(&lookup.core.void),
        };
        members.methods.push(Arc::new(MethodInfo {
            name: method.name.clone(),
            declaring: Arc::downgrade(ty),
            params: link_params(lookup, &method.params)?,
            returns: Arc::downgrade(&returns),
            is_static: method.is_static,
            is_constructor: false,
            access: parse_access(method.access.as_deref())?,
            native: method.native.clone(),
            attributes: link_attributes(lookup, &method.attributes)?,
        }));
    }

    let _ = ty.members.set(members);
    Ok(())
}

fn link_params(
    lookup: &mut TypeLookup<'_>,
    params: &[String],
) -> ProviderResult<Vec<std::sync::Weak<TypeInfo>>> {
    params
        .iter()
        .map(|name| {
            let param = lookup.require(name)?;
            if param.kind() == TypeKind::Void {
                return Err(ProviderError::InvalidImage(format!(
                    "Parameter type cannot be void: {}",
                    name
                )));
            }
            Ok(Arc::downgrade(&param))
        })
        .collect()
}

fn link_property(lookup: &mut TypeLookup<'_>, decl: &PropertyDecl) -> ProviderResult<PropertyInfo> {
    let ty = lookup.require(&decl.ty)?;
    let body = match &decl.backing {
        Some(field) => PropertyBody::Backing(field.clone()),
        None => PropertyBody::Accessors {
            getter: decl.getter.clone(),
            setter: decl.setter.clone(),
        },
    };
    Ok(PropertyInfo {
        name: decl.name.clone(),
        ty: Arc::downgrade(&ty),
        access: parse_access(decl.access.as_deref())?,
        body,
        attributes: link_attributes(lookup, &decl.attributes)?,
    })
}

fn link_attributes(
    lookup: &mut TypeLookup<'_>,
    decls: &[AttributeDecl],
) -> ProviderResult<Vec<Arc<AttributeInfo>>> {
    let mut attributes = Vec::with_capacity(decls.len());
    for decl in decls {
        let ty = lookup.require(&decl.ty)?;
        if !ty.is_subtype_of(&lookup.core.attribute) {
            return Err(ProviderError::InvalidImage(format!(
                "{} is not an attribute type",
                ty.full_name()
            )));
        }
        // Named values must match a field of the attribute type. Field
        // lists of types declared later in the same image are not linked
        // yet, so those values are checked when read.
        if ty.members.get().is_some() {
            let fields = ty.instance_fields();
            for (name, value) in &decl.values {
                let field = fields.iter().find(|f| &f.name == name).ok_or_else(|| {
                    ProviderError::InvalidImage(format!(
                        "Attribute {} has no field {}",
                        ty.full_name(),
                        name
                    ))
                })?;
                if let Some(field_ty) = field.ty.upgrade() {
                    json_to_value(value, &field_ty)
                        .map_err(|e| ProviderError::InvalidImage(e.to_string()))?;
                }
            }
        }
        attributes.push(Arc::new(AttributeInfo {
            ty: Arc::downgrade(&ty),
            values: decl.values.clone(),
        }));
    }
    Ok(attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostbridge_sdk::NoResolver;
    use serde_json::json;

    fn manifest(value: serde_json::Value) -> ModuleManifest {
        ModuleManifest::from_slice(&serde_json::to_vec(&value).unwrap()).unwrap()
    }

    fn build(core: &CoreTypes, context: &ContextInfo, value: serde_json::Value) -> ProviderResult<Arc<ModuleInfo>> {
        build_module(core, context, &manifest(value), &mut NoResolver)
    }

    #[test]
    fn test_forward_and_self_references() {
        let core = CoreTypes::new();
        let ctx = ContextInfo::new("Default", false);
        let module = build(
            &core,
            &ctx,
            json!({
                "name": "Graph",
                "types": [
                    { "name": "Graph.Node", "fields": [
                        { "name": "next", "type": "Graph.Node" },
                        { "name": "edges", "type": "Graph.Edge[]" }
                    ]},
                    { "name": "Graph.Edge", "kind": "struct", "fields": [
                        { "name": "weight", "type": "double" }
                    ]}
                ]
            }),
        )
        .unwrap();

        let node = module.find_type("Graph.Node").unwrap();
        let fields = &node.members().fields;
        assert!(Arc::ptr_eq(&fields[0].ty.upgrade().unwrap(), &node));
        let edges = fields[1].ty.upgrade().unwrap();
        assert_eq!(edges.kind(), TypeKind::Array);
        assert_eq!(edges.element().unwrap().full_name(), "Graph.Edge");
        assert!(Arc::ptr_eq(&node.base().unwrap(), &core.object));
        assert!(module.find_type("Graph.Edge").unwrap().base().is_none());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let core = CoreTypes::new();
        let ctx = ContextInfo::new("Default", false);
        let err = build(
            &core,
            &ctx,
            json!({
                "name": "Bad",
                "types": [{ "name": "Bad.T", "fields": [{ "name": "x", "type": "Missing.Type" }] }]
            }),
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidImage(msg) if msg.contains("Missing.Type")));
    }

    #[test]
    fn test_missing_reference() {
        let core = CoreTypes::new();
        let ctx = ContextInfo::new("Default", false);
        let err = build(&core, &ctx, json!({ "name": "A", "references": ["Nowhere"] })).unwrap_err();
        assert_eq!(err, ProviderError::ModuleNotFound("Nowhere".to_string()));
    }

    #[test]
    fn test_reference_in_same_context() {
        let core = CoreTypes::new();
        let ctx = ContextInfo::new("Default", false);
        let shared = build(
            &core,
            &ctx,
            json!({ "name": "Shared", "types": [{ "name": "Shared.Base" }] }),
        )
        .unwrap();
        ctx.modules.lock().push(shared);

        let module = build(
            &core,
            &ctx,
            json!({
                "name": "App",
                "references": ["Shared"],
                "types": [{ "name": "App.Derived", "base": "Shared.Base" }]
            }),
        )
        .unwrap();
        let derived = module.find_type("App.Derived").unwrap();
        assert_eq!(derived.base().unwrap().full_name(), "Shared.Base");
        assert_eq!(module.references().len(), 1);
    }

    #[test]
    fn test_circular_inheritance_rejected() {
        let core = CoreTypes::new();
        let ctx = ContextInfo::new("Default", false);
        let err = build(
            &core,
            &ctx,
            json!({
                "name": "Loop",
                "types": [
                    { "name": "Loop.A", "base": "Loop.B" },
                    { "name": "Loop.B", "base": "Loop.A" }
                ]
            }),
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidImage(_)));
    }

    #[test]
    fn test_attribute_types_checked() {
        let core = CoreTypes::new();
        let ctx = ContextInfo::new("Default", false);
        let ok = build(
            &core,
            &ctx,
            json!({
                "name": "Attrs",
                "types": [
                    { "name": "Attrs.TagAttribute", "base": "System.Attribute",
                      "fields": [{ "name": "Level", "type": "int" }] },
                    { "name": "Attrs.Tagged",
                      "attributes": [{ "type": "Attrs.TagAttribute", "values": { "Level": 3 } }] }
                ]
            }),
        );
        assert!(ok.is_ok());

        let err = build(
            &core,
            &ctx,
            json!({
                "name": "NotAttrs",
                "types": [{ "name": "NotAttrs.T", "attributes": [{ "type": "object" }] }]
            }),
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidImage(_)));
    }

    #[test]
    fn test_duplicate_module_in_context() {
        let core = CoreTypes::new();
        let ctx = ContextInfo::new("Default", false);
        let module = build(&core, &ctx, json!({ "name": "Once" })).unwrap();
        ctx.modules.lock().push(module);
        let err = build(&core, &ctx, json!({ "name": "Once" })).unwrap_err();
        assert!(matches!(err, ProviderError::LoadFailed(_)));
    }

    #[test]
    fn test_bad_field_default() {
        let core = CoreTypes::new();
        let ctx = ContextInfo::new("Default", false);
        let err = build(
            &core,
            &ctx,
            json!({
                "name": "D",
                "types": [{ "name": "D.T", "fields": [{ "name": "x", "type": "int", "default": "one" }] }]
            }),
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidImage(_)));
    }
}
