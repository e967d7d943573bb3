//! Instance handles
//!
//! An instance handle is the native side's ownership token over a
//! constructed object. A strong handle keeps its object alive until it is
//! released; a weak handle only allows lookups and goes stale once nothing
//! else holds the object.

use std::fmt;
use std::num::NonZeroU64;

use hostbridge_sdk::{ObjectRef, WeakObjectRef};
use rustc_hash::FxHashMap;

use crate::context::ModuleId;
use crate::error::{BrokerError, BrokerResult};

/// Opaque, non-zero instance handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceHandle(NonZeroU64);

impl InstanceHandle {
    /// Interpret a raw handle from native code; `None` for zero
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(InstanceHandle)
    }

    /// Get the raw handle value
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

enum Ownership {
    Strong(ObjectRef),
    Weak(WeakObjectRef),
}

struct HandleEntry {
    ownership: Ownership,
    owner: Option<ModuleId>,
}

/// Table of live instance handles
pub struct HandleTable {
    next_id: NonZeroU64,
    handles: FxHashMap<u64, HandleEntry>,
}

impl HandleTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            next_id: NonZeroU64::MIN,
            handles: FxHashMap::default(),
        }
    }

    /// Allocate a handle over `object`, recording the module that owns it
    pub fn allocate(
        &mut self,
        object: &ObjectRef,
        weak: bool,
        owner: Option<ModuleId>,
    ) -> InstanceHandle {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        let ownership = if weak {
            Ownership::Weak(object.downgrade())
        } else {
            Ownership::Strong(object.clone())
        };
        self.handles.insert(id.get(), HandleEntry { ownership, owner });
        InstanceHandle(id)
    }

    /// Dereference a handle
    pub fn target(&self, handle: InstanceHandle) -> BrokerResult<ObjectRef> {
        let entry = self
            .handles
            .get(&handle.get())
            .ok_or(BrokerError::HandleNotFound(handle.get()))?;
        match &entry.ownership {
            Ownership::Strong(object) => Ok(object.clone()),
            Ownership::Weak(weak) => weak
                .upgrade()
                .ok_or(BrokerError::TargetCollected(handle.get())),
        }
    }

    /// Module recorded as the handle's owner
    pub fn owner(&self, handle: InstanceHandle) -> Option<ModuleId> {
        self.handles.get(&handle.get()).and_then(|entry| entry.owner)
    }

    /// Whether the handle is weak
    pub fn is_weak(&self, handle: InstanceHandle) -> bool {
        matches!(
            self.handles.get(&handle.get()),
            Some(HandleEntry {
                ownership: Ownership::Weak(_),
                ..
            })
        )
    }

    /// Release a handle. Returns `false` if it was not live.
    pub fn release(&mut self, handle: InstanceHandle) -> bool {
        self.handles.remove(&handle.get()).is_some()
    }

    /// Get the number of live handles
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no handles are live
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Widget;

    fn object() -> ObjectRef {
        ObjectRef::new(Arc::new(Widget))
    }

    #[test]
    fn test_allocate_sequential() {
        let mut table = HandleTable::new();
        let obj = object();
        let a = table.allocate(&obj, false, None);
        let b = table.allocate(&obj, false, None);
        assert_eq!(a.get(), 1);
        assert_eq!(b.get(), 2);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_strong_handle_keeps_object_alive() {
        let mut table = HandleTable::new();
        let handle = table.allocate(&object(), false, Some(ModuleId::from_raw(9)));
        assert!(table.target(handle).is_ok());
        assert_eq!(table.owner(handle), Some(ModuleId::from_raw(9)));
        assert!(!table.is_weak(handle));
    }

    #[test]
    fn test_weak_handle_goes_stale() {
        let mut table = HandleTable::new();
        let obj = object();
        let handle = table.allocate(&obj, true, None);
        assert!(table.is_weak(handle));
        assert!(table.target(handle).is_ok());

        drop(obj);
        assert!(matches!(
            table.target(handle),
            Err(BrokerError::TargetCollected(1))
        ));
    }

    #[test]
    fn test_release() {
        let mut table = HandleTable::new();
        let handle = table.allocate(&object(), false, None);

        assert!(table.release(handle));
        assert!(!table.release(handle));
        assert!(table.is_empty());
        assert!(matches!(
            table.target(handle),
            Err(BrokerError::HandleNotFound(1))
        ));
    }

    #[test]
    fn test_from_raw() {
        assert!(InstanceHandle::from_raw(0).is_none());
        assert_eq!(InstanceHandle::from_raw(7).unwrap().get(), 7);
    }
}
