//! The built-in core module
//!
//! Every provider carries one core module defining the `System.*` scalar
//! types plus `Object`, `String`, `Array` and `Attribute`. Manifests may
//! refer to core types by full name or by their C#-style keyword
//! (`int`, `bool`, `nint`, ...).

use std::sync::Arc;

use hostbridge_sdk::{ManagedType, TypeKind};

use crate::model::{ModuleInfo, TypeInfo};

/// Name of the core module
pub const CORE_MODULE_NAME: &str = "System.Runtime";

const SCALARS: &[(&str, TypeKind)] = &[
    ("System.Boolean", TypeKind::Primitive(ManagedType::Bool)),
    ("System.SByte", TypeKind::Primitive(ManagedType::SByte)),
    ("System.Byte", TypeKind::Primitive(ManagedType::Byte)),
    ("System.Int16", TypeKind::Primitive(ManagedType::Short)),
    ("System.UInt16", TypeKind::Primitive(ManagedType::UShort)),
    ("System.Int32", TypeKind::Primitive(ManagedType::Int)),
    ("System.UInt32", TypeKind::Primitive(ManagedType::UInt)),
    ("System.Int64", TypeKind::Primitive(ManagedType::Long)),
    ("System.UInt64", TypeKind::Primitive(ManagedType::ULong)),
    ("System.Single", TypeKind::Primitive(ManagedType::Float)),
    ("System.Double", TypeKind::Primitive(ManagedType::Double)),
    ("System.IntPtr", TypeKind::Handle),
    ("System.UIntPtr", TypeKind::Handle),
];

const KEYWORDS: &[(&str, &str)] = &[
    ("void", "System.Void"),
    ("bool", "System.Boolean"),
    ("sbyte", "System.SByte"),
    ("byte", "System.Byte"),
    ("short", "System.Int16"),
    ("ushort", "System.UInt16"),
    ("int", "System.Int32"),
    ("uint", "System.UInt32"),
    ("long", "System.Int64"),
    ("ulong", "System.UInt64"),
    ("float", "System.Single"),
    ("double", "System.Double"),
    ("nint", "System.IntPtr"),
    ("nuint", "System.UIntPtr"),
    ("object", "System.Object"),
    ("string", "System.String"),
];

/// Split an array (`T[]`) or pointer (`T*`) type name into its element
/// name and kind
pub(crate) fn split_derived(name: &str) -> Option<(&str, TypeKind)> {
    if let Some(element) = name.strip_suffix("[]") {
        Some((element, TypeKind::Array))
    } else {
        name.strip_suffix('*')
            .map(|element| (element, TypeKind::Pointer))
    }
}

/// The core module and the types the provider needs direct access to
#[derive(Debug)]
pub(crate) struct CoreTypes {
    pub(crate) module: Arc<ModuleInfo>,
    pub(crate) object: Arc<TypeInfo>,
    pub(crate) void: Arc<TypeInfo>,
    pub(crate) array: Arc<TypeInfo>,
    pub(crate) attribute: Arc<TypeInfo>,
}

impl CoreTypes {
    pub(crate) fn new() -> Self {
        let module = Arc::new(ModuleInfo::new(CORE_MODULE_NAME, None, Vec::new()));
        let make = |name: &str, kind: TypeKind| {
            Arc::new(TypeInfo::new(name, kind, true, Arc::downgrade(&module)))
        };

        let object = make("System.Object", TypeKind::Class);
        let void = make("System.Void", TypeKind::Void);
        let string = make("System.String", TypeKind::Class);
        let array = make("System.Array", TypeKind::Class);
        let attribute = make("System.Attribute", TypeKind::Class);
        for derived in [&string, &array, &attribute] {
            let _ = derived.base.set(Some(Arc::downgrade(&object)));
        }

        let mut types = vec![
            Arc::clone(&void),
            Arc::clone(&object),
            string,
            Arc::clone(&array),
            Arc::clone(&attribute),
        ];
        types.extend(SCALARS.iter().map(|&(name, kind)| make(name, kind)));
        let _ = module.types.set(types);

        Self {
            module,
            object,
            void,
            array,
            attribute,
        }
    }

    /// Every core type, in a stable order
    pub(crate) fn types(&self) -> &[Arc<TypeInfo>] {
        self.module.types()
    }

    /// Find a core type by full name or keyword, including derived names
    pub(crate) fn find(&self, name: &str) -> Option<Arc<TypeInfo>> {
        if let Some((element, kind)) = split_derived(name) {
            let element = self.find(element)?;
            return Some(self.derived(&element, kind));
        }
        let full_name = KEYWORDS
            .iter()
            .find(|(keyword, _)| *keyword == name)
            .map_or(name, |(_, full)| *full);
        self.module.find_type(full_name)
    }

    /// The array (`kind == Array`) or pointer type over `element`.
    ///
    /// Derived types are cached on the element's module so repeated
    /// requests return the same type object.
    pub(crate) fn derived(&self, element: &Arc<TypeInfo>, kind: TypeKind) -> Arc<TypeInfo> {
        let suffix = if kind == TypeKind::Array { "[]" } else { "*" };
        let full_name = format!("{}{}", element.full_name(), suffix);
        let owner = element.module().unwrap_or_else(|| Arc::clone(&self.module));

        let mut derived = owner.derived.lock();
        if let Some(existing) = derived.get(&full_name) {
            return Arc::clone(existing);
        }

        let mut ty = TypeInfo::new(&full_name, kind, element.is_core, Arc::downgrade(&owner));
        ty.element = Some(Arc::downgrade(element));
        if kind == TypeKind::Array {
            let _ = ty.base.set(Some(Arc::downgrade(&self.array)));
        }
        let ty = Arc::new(ty);
        derived.insert(full_name, Arc::clone(&ty));
        ty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_lookup() {
        let core = CoreTypes::new();
        let int = core.find("int").unwrap();
        assert_eq!(int.full_name(), "System.Int32");
        assert!(Arc::ptr_eq(&int, &core.find("System.Int32").unwrap()));
        assert!(core.find("System.Decimal").is_none());
    }

    #[test]
    fn test_derived_types_are_cached() {
        let core = CoreTypes::new();
        let a = core.find("int[]").unwrap();
        let b = core.find("System.Int32[]").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.kind(), TypeKind::Array);
        assert_eq!(a.short_name(), "Int32[]");
        assert!(Arc::ptr_eq(&a.base().unwrap(), &core.array));
        assert_eq!(a.element().unwrap().full_name(), "System.Int32");

        let ptr = core.find("byte*").unwrap();
        assert_eq!(ptr.kind(), TypeKind::Pointer);
        assert!(ptr.base().is_none());
    }

    #[test]
    fn test_split_derived() {
        assert_eq!(split_derived("A.B[]"), Some(("A.B", TypeKind::Array)));
        assert_eq!(split_derived("int*"), Some(("int", TypeKind::Pointer)));
        assert_eq!(split_derived("int"), None);
    }

    #[test]
    fn test_core_bases() {
        let core = CoreTypes::new();
        let string = core.find("string").unwrap();
        assert!(Arc::ptr_eq(&string.base().unwrap(), &core.object));
        assert!(core.object.base().is_none());
        assert_eq!(core.types().len(), 5 + SCALARS.len());
    }
}
