//! Opaque descriptors for type-system entities
//!
//! A descriptor is a reference-counted handle to an object owned by the
//! provider. The broker never looks inside a descriptor; it only compares
//! identities (the address of the shared allocation) and hands descriptors
//! back to the provider that created them.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::{ProviderError, ProviderResult};

/// Shared, type-erased reference to a provider object
#[derive(Clone)]
pub struct Descriptor(Arc<dyn Any + Send + Sync>);

impl Descriptor {
    /// Wrap a fresh value in a new descriptor
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Descriptor(Arc::new(value))
    }

    /// Wrap an existing shared allocation without copying it
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Descriptor(value)
    }

    /// Address of the shared allocation.
    ///
    /// Two descriptors have the same identity exactly when they point at
    /// the same provider object.
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Borrow the underlying object as `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Clone out the underlying allocation as `Arc<T>`
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0).downcast::<T>().ok()
    }

    /// Create a non-owning reference to the same object
    pub fn downgrade(&self) -> WeakDescriptor {
        WeakDescriptor(Arc::downgrade(&self.0))
    }

    /// Whether both descriptors refer to the same object
    pub fn ptr_eq(&self, other: &Descriptor) -> bool {
        self.identity() == other.identity()
    }

    /// Number of strong references currently held to the object
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Descriptor({:#x})", self.identity())
    }
}

/// Non-owning counterpart of [`Descriptor`]
#[derive(Clone)]
pub struct WeakDescriptor(Weak<dyn Any + Send + Sync>);

impl WeakDescriptor {
    /// Recover a strong descriptor if the object is still alive
    pub fn upgrade(&self) -> Option<Descriptor> {
        self.0.upgrade().map(Descriptor)
    }
}

impl fmt::Debug for WeakDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakDescriptor")
    }
}

/// An entity kind that can be stored in an id cache.
///
/// Equality for cache purposes is reference identity, not structural
/// equality.
pub trait Entity: Clone {
    /// Human-readable kind name used in diagnostics
    const KIND: &'static str;

    /// Reference identity of the underlying provider object
    fn identity(&self) -> usize;
}

macro_rules! descriptor_ref {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name(Descriptor);

        impl $name {
            /// Wrap a provider object
            pub fn new<T: Any + Send + Sync>(value: Arc<T>) -> Self {
                $name(Descriptor::from_arc(value))
            }

            /// The type-erased descriptor
            pub fn descriptor(&self) -> &Descriptor {
                &self.0
            }

            /// Reference identity of the provider object
            pub fn identity(&self) -> usize {
                self.0.identity()
            }

            /// Recover the provider's concrete object.
            ///
            /// Fails with [`ProviderError::ForeignDescriptor`] when the
            /// descriptor was created by a different provider.
            pub fn downcast<T: Any + Send + Sync>(&self) -> ProviderResult<Arc<T>> {
                self.0
                    .downcast::<T>()
                    .ok_or(ProviderError::ForeignDescriptor($kind))
            }
        }

        impl From<Descriptor> for $name {
            fn from(descriptor: Descriptor) -> Self {
                $name(descriptor)
            }
        }

        impl Entity for $name {
            const KIND: &'static str = $kind;

            fn identity(&self) -> usize {
                self.0.identity()
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.0.ptr_eq(&other.0)
            }
        }

        impl Eq for $name {}

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.identity())
            }
        }
    };
}

descriptor_ref!(
    /// A type known to the provider
    TypeRef,
    "type"
);
descriptor_ref!(
    /// A method or constructor
    MethodRef,
    "method"
);
descriptor_ref!(
    /// A field
    FieldRef,
    "field"
);
descriptor_ref!(
    /// A property
    PropertyRef,
    "property"
);
descriptor_ref!(
    /// An attribute instance attached to a type or member
    AttributeRef,
    "attribute"
);
descriptor_ref!(
    /// A loaded module
    ModuleRef,
    "module"
);
descriptor_ref!(
    /// An isolated load context
    ContextRef,
    "context"
);
descriptor_ref!(
    /// A constructed managed object
    ObjectRef,
    "object"
);

impl ObjectRef {
    /// Create a reference that does not keep the object alive
    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef(self.0.downgrade())
    }
}

/// Non-owning reference to a managed object
#[derive(Debug, Clone)]
pub struct WeakObjectRef(WeakDescriptor);

impl WeakObjectRef {
    /// Recover the object if it has not been collected
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.0.upgrade().map(ObjectRef)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget(u32);

    #[test]
    fn test_identity_is_shared_by_clones() {
        let a = TypeRef::new(Arc::new(Widget(1)));
        let b = a.clone();
        assert_eq!(a.identity(), b.identity());
        assert_eq!(a, b);
    }

    #[test]
    fn test_identity_differs_for_equal_values() {
        let a = TypeRef::new(Arc::new(Widget(1)));
        let b = TypeRef::new(Arc::new(Widget(1)));
        assert_ne!(a.identity(), b.identity());
        assert_ne!(a, b);
    }

    #[test]
    fn test_downcast() {
        let m = MethodRef::new(Arc::new(Widget(7)));
        assert_eq!(m.downcast::<Widget>().unwrap().0, 7);
        assert_eq!(
            m.downcast::<String>().unwrap_err(),
            ProviderError::ForeignDescriptor("method")
        );
    }

    #[test]
    fn test_weak_object_goes_stale() {
        let obj = ObjectRef::new(Arc::new(Widget(3)));
        let weak = obj.downgrade();
        assert!(weak.upgrade().is_some());
        drop(obj);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_entity_kind() {
        assert_eq!(<FieldRef as Entity>::KIND, "field");
        assert_eq!(<AttributeRef as Entity>::KIND, "attribute");
    }
}
