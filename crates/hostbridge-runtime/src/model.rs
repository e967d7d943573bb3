//! Runtime type model
//!
//! Contexts own modules, modules own their types, types own their members.
//! Links between types (base, element, member and parameter types) are
//! weak so that self-referential and mutually-referential types do not
//! form reference cycles; a type stays alive exactly as long as the module
//! that defines it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use hostbridge_sdk::{Accessibility, TypeKind};
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value as JsonValue};

/// An isolated load context
#[derive(Debug)]
pub struct ContextInfo {
    pub(crate) name: String,
    pub(crate) collectible: bool,
    pub(crate) modules: Mutex<Vec<Arc<ModuleInfo>>>,
    unloaded: AtomicBool,
}

impl ContextInfo {
    pub(crate) fn new(name: &str, collectible: bool) -> Self {
        Self {
            name: name.to_string(),
            collectible,
            modules: Mutex::new(Vec::new()),
            unloaded: AtomicBool::new(false),
        }
    }

    /// Context name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the context has been unloaded
    pub fn is_unloaded(&self) -> bool {
        self.unloaded.load(Ordering::Acquire)
    }

    pub(crate) fn mark_unloaded(&self) {
        self.unloaded.store(true, Ordering::Release);
    }

    pub(crate) fn find_module(&self, name: &str) -> Option<Arc<ModuleInfo>> {
        self.modules.lock().iter().find(|m| m.name == name).cloned()
    }
}

/// A loaded module
#[derive(Debug)]
pub struct ModuleInfo {
    pub(crate) name: String,
    pub(crate) version: Option<String>,
    pub(crate) references: Vec<Weak<ModuleInfo>>,
    pub(crate) types: OnceCell<Vec<Arc<TypeInfo>>>,
    /// Array and pointer types over this module's types, created on demand
    pub(crate) derived: Mutex<FxHashMap<String, Arc<TypeInfo>>>,
}

impl ModuleInfo {
    pub(crate) fn new(name: &str, version: Option<String>, references: Vec<Weak<ModuleInfo>>) -> Self {
        Self {
            name: name.to_string(),
            version,
            references,
            types: OnceCell::new(),
            derived: Mutex::new(FxHashMap::default()),
        }
    }

    /// Module name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared version, if any
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Types defined by the module, in declaration order
    pub fn types(&self) -> &[Arc<TypeInfo>] {
        self.types.get().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Find a defined type by full name
    pub fn find_type(&self, full_name: &str) -> Option<Arc<TypeInfo>> {
        self.types().iter().find(|t| t.full_name == full_name).cloned()
    }

    /// Referenced modules that are still alive
    pub fn references(&self) -> Vec<Arc<ModuleInfo>> {
        self.references.iter().filter_map(Weak::upgrade).collect()
    }
}

/// Members declared directly on a type
#[derive(Debug, Default)]
pub struct Members {
    pub(crate) fields: Vec<Arc<FieldInfo>>,
    pub(crate) properties: Vec<Arc<PropertyInfo>>,
    pub(crate) constructors: Vec<Arc<MethodInfo>>,
    pub(crate) methods: Vec<Arc<MethodInfo>>,
    pub(crate) attributes: Vec<Arc<AttributeInfo>>,
}

static NO_MEMBERS: Lazy<Members> = Lazy::new(Members::default);

/// A type
#[derive(Debug)]
pub struct TypeInfo {
    pub(crate) full_name: String,
    pub(crate) kind: TypeKind,
    pub(crate) is_core: bool,
    pub(crate) module: Weak<ModuleInfo>,
    pub(crate) base: OnceCell<Option<Weak<TypeInfo>>>,
    pub(crate) element: Option<Weak<TypeInfo>>,
    pub(crate) members: OnceCell<Members>,
}

impl TypeInfo {
    pub(crate) fn new(full_name: &str, kind: TypeKind, is_core: bool, module: Weak<ModuleInfo>) -> Self {
        Self {
            full_name: full_name.to_string(),
            kind,
            is_core,
            module,
            base: OnceCell::new(),
            element: None,
            members: OnceCell::new(),
        }
    }

    /// Namespace-qualified name
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Name used when rendering signatures: core types drop their namespace
    pub fn short_name(&self) -> &str {
        if !self.is_core {
            return &self.full_name;
        }
        let name = self.full_name.as_str();
        let element_end = name.find(['[', '*']).unwrap_or(name.len());
        let start = name[..element_end].rfind('.').map_or(0, |i| i + 1);
        &name[start..]
    }

    /// Shape of the type
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Defining module, if still loaded
    pub fn module(&self) -> Option<Arc<ModuleInfo>> {
        self.module.upgrade()
    }

    /// Direct base type, if any
    pub fn base(&self) -> Option<Arc<TypeInfo>> {
        self.base.get().and_then(|b| b.as_ref()).and_then(Weak::upgrade)
    }

    /// Element type of an array or pointer type
    pub fn element(&self) -> Option<Arc<TypeInfo>> {
        self.element.as_ref().and_then(Weak::upgrade)
    }

    /// Members declared directly on the type
    pub fn members(&self) -> &Members {
        self.members.get().unwrap_or(&NO_MEMBERS)
    }

    /// The type followed by its ancestors
    pub fn chain(self: &Arc<Self>) -> Vec<Arc<TypeInfo>> {
        let mut chain = vec![Arc::clone(self)];
        while let Some(base) = chain.last().and_then(|t| t.base()) {
            chain.push(base);
        }
        chain
    }

    /// Instance fields of the type and its ancestors, most-derived first
    pub fn instance_fields(self: &Arc<Self>) -> Vec<Arc<FieldInfo>> {
        self.chain()
            .iter()
            .flat_map(|t| t.members().fields.iter().cloned())
            .collect()
    }

    /// Whether `self` is `other` or derives from it
    pub fn is_subtype_of(self: &Arc<Self>, other: &Arc<TypeInfo>) -> bool {
        self.chain().iter().any(|t| Arc::ptr_eq(t, other))
    }
}

/// A field
#[derive(Debug)]
pub struct FieldInfo {
    pub(crate) name: String,
    pub(crate) ty: Weak<TypeInfo>,
    pub(crate) access: Accessibility,
    pub(crate) default: Option<JsonValue>,
    pub(crate) attributes: Vec<Arc<AttributeInfo>>,
}

/// How a property reaches its value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyBody {
    /// Reads and writes a field directly
    Backing(String),
    /// Calls native accessors
    Accessors {
        /// Getter symbol
        getter: Option<String>,
        /// Setter symbol
        setter: Option<String>,
    },
}

/// A property
#[derive(Debug)]
pub struct PropertyInfo {
    pub(crate) name: String,
    pub(crate) ty: Weak<TypeInfo>,
    pub(crate) access: Accessibility,
    pub(crate) body: PropertyBody,
    pub(crate) attributes: Vec<Arc<AttributeInfo>>,
}

/// A method or constructor
#[derive(Debug)]
pub struct MethodInfo {
    pub(crate) name: String,
    pub(crate) declaring: Weak<TypeInfo>,
    pub(crate) params: Vec<Weak<TypeInfo>>,
    pub(crate) returns: Weak<TypeInfo>,
    pub(crate) is_static: bool,
    pub(crate) is_constructor: bool,
    pub(crate) access: Accessibility,
    pub(crate) native: Option<String>,
    pub(crate) attributes: Vec<Arc<AttributeInfo>>,
}

/// An attribute applied to a type or member
#[derive(Debug)]
pub struct AttributeInfo {
    pub(crate) ty: Weak<TypeInfo>,
    pub(crate) values: Map<String, JsonValue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostbridge_sdk::ManagedType;

    #[test]
    fn test_short_name() {
        let core = TypeInfo::new(
            "System.Int32",
            TypeKind::Primitive(ManagedType::Int),
            true,
            Weak::new(),
        );
        assert_eq!(core.short_name(), "Int32");

        let array = TypeInfo::new("System.Int32[]", TypeKind::Array, true, Weak::new());
        assert_eq!(array.short_name(), "Int32[]");

        let user = TypeInfo::new("Sample.Widget", TypeKind::Class, false, Weak::new());
        assert_eq!(user.short_name(), "Sample.Widget");
    }

    #[test]
    fn test_chain_and_subtype() {
        let base = Arc::new(TypeInfo::new("A.Base", TypeKind::Class, false, Weak::new()));
        let derived = Arc::new(TypeInfo::new("A.Derived", TypeKind::Class, false, Weak::new()));
        derived.base.set(Some(Arc::downgrade(&base))).unwrap();

        let chain = derived.chain();
        assert_eq!(chain.len(), 2);
        assert!(derived.is_subtype_of(&base));
        assert!(!base.is_subtype_of(&derived));
    }

    #[test]
    fn test_members_default_empty() {
        let ty = TypeInfo::new("A.T", TypeKind::Struct, false, Weak::new());
        assert!(ty.members().fields.is_empty());
        assert!(ty.base().is_none());
    }

    #[test]
    fn test_context_unload_flag() {
        let ctx = ContextInfo::new("Plugins", true);
        assert!(!ctx.is_unloaded());
        ctx.mark_unloaded();
        assert!(ctx.is_unloaded());
    }
}
