//! Identity-keyed id caches
//!
//! Every introspectable entity (type, method, field, property, attribute)
//! gets a stable positive id the first time the broker hands it to native
//! code. Entries live in an append-only arena; a side map from descriptor
//! identity to id makes repeated registration of the same object return
//! the same id. Id 0 is never issued.

use std::fmt;

use hostbridge_sdk::{AttributeRef, Entity, FieldRef, MethodRef, PropertyRef, TypeRef};
use rustc_hash::FxHashMap;

use crate::error::{BrokerError, BrokerResult};

/// Positive id of a cached entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(i32);

impl EntityId {
    /// The reserved "absent" id seen by native callers
    pub const NONE: i32 = 0;

    /// Interpret a raw native id; `None` for zero and negative values
    pub fn from_raw(raw: i32) -> Option<Self> {
        (raw > 0).then_some(EntityId(raw))
    }

    /// Get the raw id value
    pub fn get(self) -> i32 {
        self.0
    }

    fn index(self) -> usize {
        (self.0 - 1) as usize
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Arena of entities of one kind, deduplicated by reference identity
pub struct IdCache<T: Entity> {
    entries: Vec<T>,
    index: FxHashMap<usize, EntityId>,
}

impl<T: Entity> IdCache<T> {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    /// Register `entity`, returning its existing id if it is already cached
    pub fn add(&mut self, entity: T) -> BrokerResult<EntityId> {
        let identity = entity.identity();
        if let Some(&id) = self.index.get(&identity) {
            return Ok(id);
        }

        let raw = i32::try_from(self.entries.len() + 1)
            .map_err(|_| BrokerError::CacheExhausted(T::KIND))?;
        let id = EntityId(raw);
        self.entries.push(entity);
        self.index.insert(identity, id);
        Ok(id)
    }

    /// Register every entity in order
    pub fn add_all(&mut self, entities: impl IntoIterator<Item = T>) -> BrokerResult<Vec<EntityId>> {
        entities.into_iter().map(|entity| self.add(entity)).collect()
    }

    /// Look up an entity by id
    pub fn try_get(&self, id: EntityId) -> Option<&T> {
        self.entries.get(id.index())
    }

    /// Look up an entity by id, failing with [`BrokerError::EntityNotFound`]
    pub fn get(&self, id: EntityId) -> BrokerResult<&T> {
        self.try_get(id).ok_or(BrokerError::EntityNotFound {
            kind: T::KIND,
            id,
        })
    }

    /// Drop every entry; ids restart from 1
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Number of cached entities
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Entity> Default for IdCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One id cache per entity kind
#[derive(Default)]
pub struct EntityCaches {
    /// Types
    pub types: IdCache<TypeRef>,
    /// Methods and constructors
    pub methods: IdCache<MethodRef>,
    /// Fields
    pub fields: IdCache<FieldRef>,
    /// Properties
    pub properties: IdCache<PropertyRef>,
    /// Attribute instances
    pub attributes: IdCache<AttributeRef>,
}

impl EntityCaches {
    /// Create empty caches
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear every cache at once
    pub fn clear_all(&mut self) {
        self.types.clear();
        self.methods.clear();
        self.fields.clear();
        self.properties.clear();
        self.attributes.clear();
    }

    /// Total number of cached entities
    pub fn total(&self) -> usize {
        self.types.len()
            + self.methods.len()
            + self.fields.len()
            + self.properties.len()
            + self.attributes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Dummy;

    fn ty() -> TypeRef {
        TypeRef::new(Arc::new(Dummy))
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut cache = IdCache::new();
        let t = ty();

        let first = cache.add(t.clone()).unwrap();
        let second = cache.add(t.clone()).unwrap();
        assert_eq!(first, second);
        assert_ne!(first.get(), EntityId::NONE);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_references_get_distinct_ids() {
        let mut cache = IdCache::new();
        let a = cache.add(ty()).unwrap();
        let b = cache.add(ty()).unwrap();
        assert_eq!(a.get(), 1);
        assert_eq!(b.get(), 2);
    }

    #[test]
    fn test_try_get() {
        let mut cache = IdCache::new();
        let t = ty();
        let id = cache.add(t.clone()).unwrap();

        assert_eq!(cache.try_get(id), Some(&t));
        assert!(cache.try_get(EntityId::from_raw(99).unwrap()).is_none());
    }

    #[test]
    fn test_clear_resets_ids() {
        let mut cache = IdCache::new();
        let id = cache.add(ty()).unwrap();
        cache.clear();

        assert!(cache.is_empty());
        assert!(cache.try_get(id).is_none());
        assert!(matches!(
            cache.get(id),
            Err(BrokerError::EntityNotFound { kind: "type", .. })
        ));
        assert_eq!(cache.add(ty()).unwrap().get(), 1);
    }

    #[test]
    fn test_from_raw_rejects_reserved() {
        assert!(EntityId::from_raw(0).is_none());
        assert!(EntityId::from_raw(-4).is_none());
        assert_eq!(EntityId::from_raw(3).unwrap().get(), 3);
    }

    #[test]
    fn test_clear_all() {
        let mut caches = EntityCaches::new();
        caches.types.add(ty()).unwrap();
        caches
            .methods
            .add(MethodRef::new(Arc::new(Dummy)))
            .unwrap();
        assert_eq!(caches.total(), 2);

        caches.clear_all();
        assert_eq!(caches.total(), 0);
    }
}
