//! [`TypeSystemProvider`] over JSON module manifests

use std::sync::{Arc, Weak};

use hostbridge_sdk::{
    Accessibility, AttributeRef, ContextRef, FieldRef, InternalCall, ManagedType, MemberRef,
    MethodRef, ModuleRef, ModuleResolver, NoResolver, ObjectRef, PropertyRef, ProviderError,
    ProviderResult, TypeKind, TypeRef, TypeSystemProvider, Value,
};
use rustc_hash::FxHashMap;

use crate::convert::{check_value, json_to_value, zero_value};
use crate::builtin::CoreTypes;
use crate::loader::{build_module, TypeLookup};
use crate::manifest::ModuleManifest;
use crate::model::{
    AttributeInfo, ContextInfo, FieldInfo, Members, MethodInfo, ModuleInfo, PropertyBody,
    PropertyInfo, TypeInfo,
};
use crate::natives::{NativeCall, NativeRegistry};
use crate::object::ManagedObject;

/// Nesting limit when sizing structs that contain structs
const MAX_STRUCT_DEPTH: usize = 32;

/// Name of the provider's default context
pub const DEFAULT_CONTEXT_NAME: &str = "Default";

/// A type-system provider whose modules are JSON manifests and whose
/// member bodies are host-registered native functions
pub struct ManifestProvider {
    core: CoreTypes,
    default_context: Arc<ContextInfo>,
    contexts: Vec<Arc<ContextInfo>>,
    natives: Arc<NativeRegistry>,
}

impl ManifestProvider {
    /// Create a provider with only the core module loaded
    pub fn new() -> Self {
        Self::with_natives(Arc::new(NativeRegistry::new()))
    }

    /// Create a provider sharing an existing native registry
    pub fn with_natives(natives: Arc<NativeRegistry>) -> Self {
        let core = CoreTypes::new();
        let default_context = Arc::new(ContextInfo::new(DEFAULT_CONTEXT_NAME, false));
        default_context.modules.lock().push(Arc::clone(&core.module));
        Self {
            core,
            default_context,
            contexts: Vec::new(),
            natives,
        }
    }

    /// Native member bodies
    pub fn natives(&self) -> &Arc<NativeRegistry> {
        &self.natives
    }

    /// Load a module into the default context.
    ///
    /// Host modules are part of the startup state, so call this before
    /// handing the provider to a broker.
    pub fn add_host_module(&mut self, image: &[u8]) -> ProviderResult<ModuleRef> {
        let context = ContextRef::new(Arc::clone(&self.default_context));
        self.load_module(&context, image, &mut NoResolver)
    }

    /// Number of live collectible contexts
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    fn live_modules(&self) -> Vec<Arc<ModuleInfo>> {
        std::iter::once(&self.default_context)
            .chain(self.contexts.iter())
            .flat_map(|ctx| ctx.modules.lock().clone())
            .collect()
    }

    /// Follow a type link, falling back to `System.Object` if the target
    /// module has gone away
    fn link(&self, weak: &Weak<TypeInfo>) -> Arc<TypeInfo> {
        weak.upgrade()
            .unwrap_or_else(|| Arc::clone(&self.core.object))
    }

    fn type_ref(&self, weak: &Weak<TypeInfo>) -> TypeRef {
        TypeRef::new(self.link(weak))
    }

    fn assignable(&self, ty: &Arc<TypeInfo>, target: &Arc<TypeInfo>) -> bool {
        if ty.is_subtype_of(target) {
            return true;
        }
        if Arc::ptr_eq(target, &self.core.object) {
            return ty.kind().is_object();
        }
        match (ty.kind(), target.kind(), ty.element(), target.element()) {
            (TypeKind::Array, TypeKind::Array, Some(from), Some(to)) => {
                from.kind().is_object() && self.assignable(&from, &to)
            }
            _ => false,
        }
    }

    fn size_of(&self, ty: &Arc<TypeInfo>, depth: usize) -> ProviderResult<usize> {
        match ty.kind() {
            TypeKind::Primitive(tag) => Ok(tag.size()),
            TypeKind::Pointer | TypeKind::Handle => Ok(std::mem::size_of::<usize>()),
            TypeKind::Struct if depth < MAX_STRUCT_DEPTH => ty
                .members()
                .fields
                .iter()
                .map(|field| self.size_of(&self.link(&field.ty), depth + 1))
                .sum(),
            _ => Err(ProviderError::NotBlittable(ty.full_name().to_string())),
        }
    }

    fn signature(&self, method: &MethodInfo) -> String {
        let params: Vec<String> = method
            .params
            .iter()
            .map(|p| self.link(p).short_name().to_string())
            .collect();
        format!(
            "{} {}({})",
            self.link(&method.returns).short_name(),
            method.name,
            params.join(", ")
        )
    }

    fn return_tag(&self, method: &MethodInfo) -> Option<ManagedType> {
        match self.link(&method.returns).kind() {
            TypeKind::Void => None,
            kind => Some(kind.managed_type()),
        }
    }

    fn check_args(&self, method: &MethodInfo, args: &[Value]) -> ProviderResult<()> {
        if args.len() != method.params.len() {
            return Err(ProviderError::InvocationFailed(format!(
                "{} expects {} arguments, got {}",
                self.signature(method),
                method.params.len(),
                args.len()
            )));
        }
        for (arg, param) in args.iter().zip(&method.params) {
            check_value(arg, &self.link(param))?;
        }
        Ok(())
    }

    fn object(&self, object: &ObjectRef) -> ProviderResult<Arc<ManagedObject>> {
        object.downcast::<ManagedObject>()
    }

    /// Check that `member` is declared somewhere on the object's type chain
    fn declared_on<T>(
        object: &ManagedObject,
        member: &Arc<T>,
        name: &str,
        pick: impl Fn(&Members) -> &[Arc<T>],
    ) -> ProviderResult<()> {
        let found = object
            .type_info()
            .chain()
            .iter()
            .any(|ty| pick(ty.members()).iter().any(|m| Arc::ptr_eq(m, member)));
        if found {
            Ok(())
        } else {
            Err(ProviderError::MemberNotFound(format!(
                "{}.{}",
                object.type_name(),
                name
            )))
        }
    }

    fn member_attribute_list(&self, member: MemberRef<'_>) -> ProviderResult<Vec<Arc<AttributeInfo>>> {
        Ok(match member {
            MemberRef::Method(m) => m.downcast::<MethodInfo>()?.attributes.clone(),
            MemberRef::Field(f) => f.downcast::<FieldInfo>()?.attributes.clone(),
            MemberRef::Property(p) => p.downcast::<PropertyInfo>()?.attributes.clone(),
        })
    }
}

impl Default for ManifestProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ManifestProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestProvider")
            .field("contexts", &self.contexts.len())
            .field("natives", &self.natives)
            .finish()
    }
}

fn type_refs(types: &[Arc<TypeInfo>]) -> Vec<TypeRef> {
    types.iter().map(|t| TypeRef::new(Arc::clone(t))).collect()
}

impl TypeSystemProvider for ManifestProvider {
    // ------------------------------------------------------------------------
    // Contexts and modules
    // ------------------------------------------------------------------------

    fn default_context(&self) -> ContextRef {
        ContextRef::new(Arc::clone(&self.default_context))
    }

    fn default_modules(&self) -> Vec<ModuleRef> {
        self.default_context
            .modules
            .lock()
            .iter()
            .map(|m| ModuleRef::new(Arc::clone(m)))
            .collect()
    }

    fn create_context(&mut self, name: &str) -> ProviderResult<ContextRef> {
        let context = Arc::new(ContextInfo::new(name, true));
        self.contexts.push(Arc::clone(&context));
        tracing::debug!(context = name, "Created collectible context");
        Ok(ContextRef::new(context))
    }

    fn load_module(
        &mut self,
        context: &ContextRef,
        image: &[u8],
        resolver: &mut dyn ModuleResolver,
    ) -> ProviderResult<ModuleRef> {
        let context = context.downcast::<ContextInfo>()?;
        if context.is_unloaded() {
            return Err(ProviderError::ContextUnusable(format!(
                "Context {} has been unloaded",
                context.name()
            )));
        }
        let manifest = ModuleManifest::from_slice(image)?;
        let module = build_module(&self.core, &context, &manifest, resolver)?;
        context.modules.lock().push(Arc::clone(&module));
        Ok(ModuleRef::new(module))
    }

    fn unload_context(&mut self, context: &ContextRef) -> ProviderResult<()> {
        let context = context.downcast::<ContextInfo>()?;
        if !context.collectible {
            return Err(ProviderError::ContextUnusable(format!(
                "Context {} cannot be unloaded",
                context.name()
            )));
        }
        context.mark_unloaded();
        let modules = std::mem::take(&mut *context.modules.lock());
        self.contexts.retain(|c| !Arc::ptr_eq(c, &context));
        tracing::debug!(
            context = context.name(),
            modules = modules.len(),
            "Unloaded context"
        );
        Ok(())
    }

    fn discard_module(&mut self, context: &ContextRef, module: &ModuleRef) {
        if let (Ok(context), Ok(module)) = (
            context.downcast::<ContextInfo>(),
            module.downcast::<ModuleInfo>(),
        ) {
            context.modules.lock().retain(|m| !Arc::ptr_eq(m, &module));
            tracing::debug!(module = module.name(), "Discarded module");
        }
    }

    fn module_name(&self, module: &ModuleRef) -> String {
        module
            .downcast::<ModuleInfo>()
            .map(|m| m.name().to_string())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------------

    fn module_types(&self, module: &ModuleRef) -> ProviderResult<Vec<TypeRef>> {
        Ok(type_refs(module.downcast::<ModuleInfo>()?.types()))
    }

    fn core_types(&self) -> Vec<TypeRef> {
        type_refs(self.core.types())
    }

    fn find_type(&self, name: &str, resolver: &mut dyn ModuleResolver) -> Option<TypeRef> {
        let search = self.live_modules();
        let mut lookup = TypeLookup {
            core: &self.core,
            local: None,
            search: &search,
            resolver,
        };
        lookup.find(name).ok().flatten().map(TypeRef::new)
    }

    fn type_module(&self, ty: &TypeRef) -> Option<ModuleRef> {
        ty.downcast::<TypeInfo>().ok()?.module().map(ModuleRef::new)
    }

    fn full_name(&self, ty: &TypeRef) -> String {
        ty.downcast::<TypeInfo>()
            .map(|t| t.full_name().to_string())
            .unwrap_or_default()
    }

    fn qualified_name(&self, ty: &TypeRef) -> String {
        match ty.downcast::<TypeInfo>() {
            Ok(t) => match t.module() {
                Some(module) => format!("{}, {}", t.full_name(), module.name()),
                None => t.full_name().to_string(),
            },
            Err(_) => String::new(),
        }
    }

    fn type_kind(&self, ty: &TypeRef) -> TypeKind {
        ty.downcast::<TypeInfo>()
            .map(|t| t.kind())
            .unwrap_or(TypeKind::Void)
    }

    fn base_type(&self, ty: &TypeRef) -> Option<TypeRef> {
        ty.downcast::<TypeInfo>().ok()?.base().map(TypeRef::new)
    }

    fn is_assignable_to(&self, ty: &TypeRef, target: &TypeRef) -> bool {
        match (ty.downcast::<TypeInfo>(), target.downcast::<TypeInfo>()) {
            (Ok(ty), Ok(target)) => self.assignable(&ty, &target),
            _ => false,
        }
    }

    fn type_size(&self, ty: &TypeRef) -> ProviderResult<usize> {
        self.size_of(&ty.downcast::<TypeInfo>()?, 0)
    }

    fn element_type(&self, ty: &TypeRef) -> Option<TypeRef> {
        ty.downcast::<TypeInfo>().ok()?.element().map(TypeRef::new)
    }

    // ------------------------------------------------------------------------
    // Declared members
    // ------------------------------------------------------------------------

    fn methods(&self, ty: &TypeRef) -> Vec<MethodRef> {
        ty.downcast::<TypeInfo>()
            .map(|t| t.members().methods.iter().map(|m| MethodRef::new(Arc::clone(m))).collect())
            .unwrap_or_default()
    }

    fn constructors(&self, ty: &TypeRef) -> Vec<MethodRef> {
        ty.downcast::<TypeInfo>()
            .map(|t| {
                t.members()
                    .constructors
                    .iter()
                    .map(|m| MethodRef::new(Arc::clone(m)))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn fields(&self, ty: &TypeRef) -> Vec<FieldRef> {
        ty.downcast::<TypeInfo>()
            .map(|t| t.members().fields.iter().map(|f| FieldRef::new(Arc::clone(f))).collect())
            .unwrap_or_default()
    }

    fn properties(&self, ty: &TypeRef) -> Vec<PropertyRef> {
        ty.downcast::<TypeInfo>()
            .map(|t| {
                t.members()
                    .properties
                    .iter()
                    .map(|p| PropertyRef::new(Arc::clone(p)))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn type_attributes(&self, ty: &TypeRef) -> ProviderResult<Vec<AttributeRef>> {
        let ty = ty.downcast::<TypeInfo>()?;
        Ok(ty
            .members()
            .attributes
            .iter()
            .map(|a| AttributeRef::new(Arc::clone(a)))
            .collect())
    }

    // ------------------------------------------------------------------------
    // Member information
    // ------------------------------------------------------------------------

    fn member_name(&self, member: MemberRef<'_>) -> String {
        let name = match member {
            MemberRef::Method(m) => m.downcast::<MethodInfo>().map(|m| m.name.clone()),
            MemberRef::Field(f) => f.downcast::<FieldInfo>().map(|f| f.name.clone()),
            MemberRef::Property(p) => p.downcast::<PropertyInfo>().map(|p| p.name.clone()),
        };
        name.unwrap_or_default()
    }

    fn member_type(&self, member: MemberRef<'_>) -> TypeRef {
        let ty = match member {
            MemberRef::Method(m) => m.downcast::<MethodInfo>().map(|m| self.type_ref(&m.returns)),
            MemberRef::Field(f) => f.downcast::<FieldInfo>().map(|f| self.type_ref(&f.ty)),
            MemberRef::Property(p) => p.downcast::<PropertyInfo>().map(|p| self.type_ref(&p.ty)),
        };
        ty.unwrap_or_else(|_| TypeRef::new(Arc::clone(&self.core.object)))
    }

    fn member_accessibility(&self, member: MemberRef<'_>) -> Accessibility {
        let access = match member {
            MemberRef::Method(m) => m.downcast::<MethodInfo>().map(|m| m.access),
            MemberRef::Field(f) => f.downcast::<FieldInfo>().map(|f| f.access),
            MemberRef::Property(p) => p.downcast::<PropertyInfo>().map(|p| p.access),
        };
        access.unwrap_or(Accessibility::Private)
    }

    fn member_attributes(&self, member: MemberRef<'_>) -> ProviderResult<Vec<AttributeRef>> {
        Ok(self
            .member_attribute_list(member)?
            .into_iter()
            .map(AttributeRef::new)
            .collect())
    }

    fn is_static(&self, member: MemberRef<'_>) -> bool {
        match member {
            MemberRef::Method(m) => m
                .downcast::<MethodInfo>()
                .map(|m| m.is_static)
                .unwrap_or(false),
            MemberRef::Field(_) | MemberRef::Property(_) => false,
        }
    }

    fn method_signature(&self, method: &MethodRef) -> String {
        method
            .downcast::<MethodInfo>()
            .map(|m| self.signature(&m))
            .unwrap_or_default()
    }

    fn method_parameters(&self, method: &MethodRef) -> Vec<TypeRef> {
        method
            .downcast::<MethodInfo>()
            .map(|m| m.params.iter().map(|p| self.type_ref(p)).collect())
            .unwrap_or_default()
    }

    fn attribute_type(&self, attribute: &AttributeRef) -> TypeRef {
        attribute
            .downcast::<AttributeInfo>()
            .map(|a| self.type_ref(&a.ty))
            .unwrap_or_else(|_| TypeRef::new(Arc::clone(&self.core.attribute)))
    }

    fn attribute_value(
        &self,
        attribute: &AttributeRef,
        field: &str,
    ) -> ProviderResult<(TypeRef, Value)> {
        let attribute = attribute.downcast::<AttributeInfo>()?;
        let ty = self.link(&attribute.ty);
        let declared = ty
            .instance_fields()
            .into_iter()
            .find(|f| f.name == field)
            .ok_or_else(|| {
                ProviderError::MemberNotFound(format!("{}.{}", ty.full_name(), field))
            })?;
        let field_ty = self.link(&declared.ty);
        let value = match attribute.values.get(field) {
            Some(json) => json_to_value(json, &field_ty)?,
            None => match &declared.default {
                Some(json) => json_to_value(json, &field_ty)?,
                None => zero_value(&field_ty),
            },
        };
        Ok((TypeRef::new(field_ty), value))
    }

    // ------------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------------

    fn construct(
        &self,
        ty: &TypeRef,
        ctor: &MethodRef,
        args: Vec<Value>,
    ) -> ProviderResult<ObjectRef> {
        let ty = ty.downcast::<TypeInfo>()?;
        let ctor = ctor.downcast::<MethodInfo>()?;
        if !matches!(ty.kind(), TypeKind::Class | TypeKind::Struct) {
            return Err(ProviderError::InvocationFailed(format!(
                "Cannot instantiate {}",
                ty.full_name()
            )));
        }
        let declared_here = ctor
            .declaring
            .upgrade()
            .is_some_and(|declaring| Arc::ptr_eq(&declaring, &ty));
        if !ctor.is_constructor || !declared_here {
            return Err(ProviderError::MemberNotFound(format!(
                "{}::{}",
                ty.full_name(),
                self.signature(&ctor)
            )));
        }
        self.check_args(&ctor, &args)?;

        // Base fields first so a derived field shadows an inherited one
        let mut fields = FxHashMap::default();
        for field in ty.instance_fields().iter().rev() {
            let field_ty = self.link(&field.ty);
            let value = match &field.default {
                Some(json) => json_to_value(json, &field_ty)?,
                None => zero_value(&field_ty),
            };
            fields.insert(field.name.clone(), value);
        }

        let object = Arc::new(ManagedObject::new(Arc::clone(&ty), fields));
        if let Some(symbol) = &ctor.native {
            self.natives.call(&NativeCall {
                symbol,
                this: Some(&*object),
                args,
                returns: None,
            })?;
        }
        tracing::trace!(type_name = ty.full_name(), "Constructed object");
        Ok(ObjectRef::new(object))
    }

    fn invoke(
        &self,
        method: &MethodRef,
        target: Option<&ObjectRef>,
        args: Vec<Value>,
    ) -> ProviderResult<Value> {
        let method = method.downcast::<MethodInfo>()?;
        if method.is_constructor {
            return Err(ProviderError::InvocationFailed(
                "Constructors run through construct".to_string(),
            ));
        }

        let this = match (method.is_static, target) {
            (true, _) => None,
            (false, None) => {
                return Err(ProviderError::InvocationFailed(format!(
                    "{} requires a target",
                    self.signature(&method)
                )))
            }
            (false, Some(target)) => {
                let object = self.object(target)?;
                let declaring = self.link(&method.declaring);
                if !object.type_info().is_subtype_of(&declaring) {
                    return Err(ProviderError::TypeMismatch {
                        expected: declaring.full_name().to_string(),
                        got: object.type_name().to_string(),
                    });
                }
                Some(object)
            }
        };
        self.check_args(&method, &args)?;

        let symbol = method.native.as_deref().ok_or_else(|| {
            ProviderError::InvocationFailed(format!("{} has no body", self.signature(&method)))
        })?;
        let returns = self.return_tag(&method);
        let result = self.natives.call(&NativeCall {
            symbol,
            this: this.as_deref(),
            args,
            returns,
        })?;

        if returns.is_none() {
            return Ok(Value::Void);
        }
        check_value(&result, &self.link(&method.returns))?;
        Ok(result)
    }

    fn object_type(&self, object: &ObjectRef) -> ProviderResult<TypeRef> {
        Ok(TypeRef::new(Arc::clone(self.object(object)?.type_info())))
    }

    fn get_field(&self, object: &ObjectRef, field: &FieldRef) -> ProviderResult<Value> {
        let object = self.object(object)?;
        let field = field.downcast::<FieldInfo>()?;
        Self::declared_on(&object, &field, &field.name, |m| m.fields.as_slice())?;
        object.get(&field.name)
    }

    fn set_field(&self, object: &ObjectRef, field: &FieldRef, value: Value) -> ProviderResult<()> {
        let object = self.object(object)?;
        let field = field.downcast::<FieldInfo>()?;
        Self::declared_on(&object, &field, &field.name, |m| m.fields.as_slice())?;
        check_value(&value, &self.link(&field.ty))?;
        object.set(&field.name, value)
    }

    fn get_property(&self, object: &ObjectRef, property: &PropertyRef) -> ProviderResult<Value> {
        let object = self.object(object)?;
        let property = property.downcast::<PropertyInfo>()?;
        Self::declared_on(&object, &property, &property.name, |m| m.properties.as_slice())?;

        let ty = self.link(&property.ty);
        let value = match &property.body {
            PropertyBody::Backing(field) => object.get(field)?,
            PropertyBody::Accessors {
                getter: Some(symbol),
                ..
            } => self.natives.call(&NativeCall {
                symbol,
                this: Some(&*object),
                args: Vec::new(),
                returns: Some(ty.kind().managed_type()),
            })?,
            PropertyBody::Accessors { getter: None, .. } => {
                return Err(ProviderError::MemberNotFound(format!(
                    "{}.{} has no getter",
                    object.type_name(),
                    property.name
                )))
            }
        };
        check_value(&value, &ty)?;
        Ok(value)
    }

    fn set_property(
        &self,
        object: &ObjectRef,
        property: &PropertyRef,
        value: Value,
    ) -> ProviderResult<()> {
        let object = self.object(object)?;
        let property = property.downcast::<PropertyInfo>()?;
        Self::declared_on(&object, &property, &property.name, |m| m.properties.as_slice())?;
        check_value(&value, &self.link(&property.ty))?;

        match &property.body {
            PropertyBody::Backing(field) => object.set(field, value),
            PropertyBody::Accessors {
                setter: Some(symbol),
                ..
            } => self
                .natives
                .call(&NativeCall {
                    symbol,
                    this: Some(&*object),
                    args: vec![value],
                    returns: None,
                })
                .map(|_| ()),
            PropertyBody::Accessors { setter: None, .. } => Err(ProviderError::MemberNotFound(
                format!("{}.{} has no setter", object.type_name(), property.name),
            )),
        }
    }

    // ------------------------------------------------------------------------
    // Runtime services
    // ------------------------------------------------------------------------

    fn register_internal_call(&mut self, name: &str, call: InternalCall) -> ProviderResult<()> {
        self.natives.register_internal(name, call);
        tracing::debug!(symbol = name, "Registered internal call");
        Ok(())
    }

    fn collect_garbage(&mut self) {
        // Objects are reference counted and go away with their last handle
        tracing::trace!("Collect requested");
    }

    fn wait_for_pending_finalizers(&mut self) {
        tracing::trace!("No finalizers pending");
    }
}
