//! Load contexts and the global module index
//!
//! A load context is an isolated, independently unloadable set of modules.
//! Context and module ids are derived from their names, so the same name
//! always yields the same id. A name whose id is already taken is rejected
//! rather than silently aliased.
//!
//! Every loaded module is also registered in one global index shared by all
//! contexts. The index is what providers consult, through
//! [`ModuleResolver`], when a module references another module they cannot
//! find on their own.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;

use hostbridge_sdk::{ContextRef, ModuleRef, ModuleResolver};
use rustc_hash::{FxHashMap, FxHasher};
use tracing::{debug, trace, warn};

use crate::error::{BrokerError, BrokerResult, LoadStatus};
use crate::handles::InstanceHandle;

/// Sentinel returned to native callers for a failed context or module call
pub const INVALID_ID: i32 = -1;

fn name_hash(name: &str) -> i32 {
    let mut hasher = FxHasher::default();
    name.hash(&mut hasher);
    let folded = (hasher.finish() as u32 & 0x7fff_ffff) as i32;
    folded.max(1)
}

/// Id of a load context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(i32);

impl ContextId {
    /// Derive the id for a context name
    pub fn from_name(name: &str) -> Self {
        ContextId(name_hash(name))
    }

    /// Wrap a raw id received from native code
    pub fn from_raw(raw: i32) -> Self {
        ContextId(raw)
    }

    /// Get the raw id value
    pub fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Id of a loaded module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(i32);

impl ModuleId {
    /// Derive the id for a module name
    pub fn from_name(name: &str) -> Self {
        ModuleId(name_hash(name))
    }

    /// Wrap a raw id received from native code
    pub fn from_raw(raw: i32) -> Self {
        ModuleId(raw)
    }

    /// Get the raw id value
    pub fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A module owned by a context
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    /// Derived id
    pub id: ModuleId,
    /// Simple module name
    pub name: String,
    /// Provider descriptor
    pub module: ModuleRef,
}

/// An isolated collection of modules
#[derive(Debug)]
pub struct LoadContext {
    /// Derived id
    pub id: ContextId,
    /// Human name
    pub name: String,
    /// Provider descriptor
    pub context: ContextRef,
    /// Owned modules, in load order
    pub modules: Vec<ModuleRecord>,
    /// Whether the context may be unloaded
    pub unloadable: bool,
}

impl LoadContext {
    fn find(&self, name: &str) -> Option<&ModuleRecord> {
        self.modules.iter().find(|record| record.name == name)
    }
}

/// What an unload hands back to the broker for teardown
#[derive(Debug)]
pub struct UnloadedContext {
    /// The removed context
    pub context: LoadContext,
    /// Every ownership handle registered against its modules
    pub handles: Vec<InstanceHandle>,
}

/// Owner of every load context, the global module index and the
/// last-status register
pub struct ContextManager {
    contexts: FxHashMap<ContextId, LoadContext>,
    index: FxHashMap<ModuleId, (String, ModuleRef)>,
    ownership: FxHashMap<ModuleId, Vec<InstanceHandle>>,
    default_context: ContextId,
    last_status: LoadStatus,
}

impl ContextManager {
    /// Create a manager holding only the default context, pre-populated
    /// with the modules the host process already has.
    pub fn new(
        default_name: &str,
        context: ContextRef,
        modules: impl IntoIterator<Item = (String, ModuleRef)>,
    ) -> Self {
        let id = ContextId::from_name(default_name);
        let mut default_context = LoadContext {
            id,
            name: default_name.to_string(),
            context,
            modules: Vec::new(),
            unloadable: false,
        };
        for (name, module) in modules {
            if default_context.find(&name).is_some() {
                warn!(module = %name, "duplicate module in default context, skipping");
                continue;
            }
            default_context.modules.push(ModuleRecord {
                id: ModuleId::from_name(&name),
                name,
                module,
            });
        }

        let mut contexts = FxHashMap::default();
        contexts.insert(id, default_context);
        Self {
            contexts,
            index: FxHashMap::default(),
            ownership: FxHashMap::default(),
            default_context: id,
            last_status: LoadStatus::Success,
        }
    }

    /// Id of the default context
    pub fn default_context(&self) -> ContextId {
        self.default_context
    }

    /// Derive and reserve-check the id for a new context
    pub fn context_id_for(&self, name: &str) -> BrokerResult<ContextId> {
        if name.is_empty() {
            return Err(BrokerError::EmptyContextName);
        }
        let id = ContextId::from_name(name);
        if self.contexts.contains_key(&id) {
            return Err(BrokerError::ContextExists {
                name: name.to_string(),
                id,
            });
        }
        Ok(id)
    }

    /// Register a freshly created, empty context
    pub fn insert_context(&mut self, id: ContextId, name: &str, context: ContextRef) {
        debug!(context = %name, id = id.get(), "registered load context");
        self.contexts.insert(
            id,
            LoadContext {
                id,
                name: name.to_string(),
                context,
                modules: Vec::new(),
                unloadable: true,
            },
        );
    }

    /// Look up a context
    pub fn context(&self, id: ContextId) -> BrokerResult<&LoadContext> {
        self.contexts.get(&id).ok_or(BrokerError::ContextNotFound(id))
    }

    /// Ids of every live context, sorted
    pub fn context_ids(&self) -> Vec<ContextId> {
        let mut ids: Vec<_> = self.contexts.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Number of live contexts
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether there are no contexts (never true after construction)
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Record a loaded module in its context and in the global index.
    ///
    /// Nothing is registered if the derived id is already taken.
    pub fn register_module(
        &mut self,
        context_id: ContextId,
        name: &str,
        module: ModuleRef,
    ) -> BrokerResult<ModuleId> {
        let id = ModuleId::from_name(name);
        if self.index.contains_key(&id) || self.find_record(id).is_some() {
            return Err(BrokerError::ModuleExists {
                name: name.to_string(),
                id,
            });
        }

        let context = self
            .contexts
            .get_mut(&context_id)
            .ok_or(BrokerError::ContextNotFound(context_id))?;
        context.modules.push(ModuleRecord {
            id,
            name: name.to_string(),
            module: module.clone(),
        });
        self.index.insert(id, (name.to_string(), module));
        Ok(id)
    }

    fn find_record(&self, id: ModuleId) -> Option<(&LoadContext, &ModuleRecord)> {
        self.contexts.values().find_map(|context| {
            context
                .modules
                .iter()
                .find(|record| record.id == id)
                .map(|record| (context, record))
        })
    }

    /// Look up a module by id in any context
    pub fn module(&self, id: ModuleId) -> BrokerResult<&ModuleRecord> {
        self.find_record(id)
            .map(|(_, record)| record)
            .ok_or(BrokerError::ModuleNotFound(id))
    }

    /// Find the registered id of a module descriptor
    pub fn module_id_of(&self, module: &ModuleRef) -> Option<ModuleId> {
        self.contexts.values().find_map(|context| {
            context
                .modules
                .iter()
                .find(|record| record.module == *module)
                .map(|record| record.id)
        })
    }

    /// Whether the global index currently holds `name`
    pub fn is_indexed(&self, name: &str) -> bool {
        self.index
            .get(&ModuleId::from_name(name))
            .is_some_and(|(indexed, _)| indexed == name)
    }

    /// Resolve a module by name: the global index first, then every live
    /// context's module set. A hit from the scan is added to the index.
    pub fn resolve(&mut self, name: &str) -> Option<ModuleRef> {
        let id = ModuleId::from_name(name);
        if let Some((indexed, module)) = self.index.get(&id) {
            if indexed == name {
                trace!(module = %name, "resolved module from index");
                return Some(module.clone());
            }
        }

        let module = self
            .context_ids()
            .into_iter()
            .filter_map(|ctx| self.contexts.get(&ctx))
            .find_map(|context| context.find(name))
            .map(|record| record.module.clone())?;

        debug!(module = %name, "resolved module by scanning contexts");
        self.index.insert(id, (name.to_string(), module.clone()));
        Some(module)
    }

    /// Record an ownership handle against the module that owns its object
    pub fn track_handle(&mut self, module: ModuleId, handle: InstanceHandle) {
        self.ownership.entry(module).or_default().push(handle);
    }

    /// Remove a context and collect what must be released with it.
    ///
    /// Returns `Ok(None)` for an unknown id.
    pub fn unload(&mut self, id: ContextId) -> BrokerResult<Option<UnloadedContext>> {
        match self.contexts.get(&id) {
            None => return Ok(None),
            Some(context) if !context.unloadable => {
                return Err(BrokerError::ContextNotUnloadable(id))
            }
            Some(_) => {}
        }

        let Some(context) = self.contexts.remove(&id) else {
            return Ok(None);
        };
        let mut handles = Vec::new();
        for record in &context.modules {
            if let Some(owned) = self.ownership.remove(&record.id) {
                handles.extend(owned);
            }
            self.index.remove(&record.id);
        }
        Ok(Some(UnloadedContext { context, handles }))
    }

    /// Status of the most recent module load
    pub fn last_status(&self) -> LoadStatus {
        self.last_status
    }

    /// Set the last-status register
    pub fn set_status(&mut self, status: LoadStatus) {
        self.last_status = status;
    }
}

impl ModuleResolver for ContextManager {
    fn resolve_module(&mut self, name: &str) -> Option<ModuleRef> {
        self.resolve(name)
    }
}

/// Validate a module path and read its image.
///
/// An empty path fails with [`BrokerError::InvalidPath`], a missing file
/// with [`BrokerError::FileNotFound`].
pub fn read_module_image(path: &str, limit: Option<u64>) -> BrokerResult<Vec<u8>> {
    if path.trim().is_empty() {
        return Err(BrokerError::InvalidPath(path.to_string()));
    }
    let path = Path::new(path);
    if !path.exists() {
        return Err(BrokerError::FileNotFound(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(BrokerError::InvalidPath(path.display().to_string()));
    }

    let io_err = |source| BrokerError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(limit) = limit {
        let size = std::fs::metadata(path).map_err(io_err)?.len();
        if size > limit {
            return Err(BrokerError::ImageTooLarge { size, limit });
        }
    }
    std::fs::read(path).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Dummy;

    fn ctx_ref() -> ContextRef {
        ContextRef::new(Arc::new(Dummy))
    }

    fn module_ref() -> ModuleRef {
        ModuleRef::new(Arc::new(Dummy))
    }

    fn manager() -> ContextManager {
        ContextManager::new("Default", ctx_ref(), vec![("Core".to_string(), module_ref())])
    }

    #[test]
    fn test_ids_are_deterministic_and_positive() {
        assert_eq!(ContextId::from_name("Plugins"), ContextId::from_name("Plugins"));
        assert_ne!(ContextId::from_name("Plugins"), ContextId::from_name("Other"));
        assert!(ContextId::from_name("").get() > 0);
        assert!(ModuleId::from_name("Sample").get() > 0);
    }

    #[test]
    fn test_default_context() {
        let manager = manager();
        let default = manager.context(manager.default_context()).unwrap();
        assert_eq!(default.name, "Default");
        assert!(!default.unloadable);
        assert_eq!(default.modules.len(), 1);
    }

    #[test]
    fn test_create_context_rejects_empty_and_duplicate() {
        let mut manager = manager();
        assert!(matches!(
            manager.context_id_for(""),
            Err(BrokerError::EmptyContextName)
        ));

        let id = manager.context_id_for("Plugins").unwrap();
        manager.insert_context(id, "Plugins", ctx_ref());
        assert!(matches!(
            manager.context_id_for("Plugins"),
            Err(BrokerError::ContextExists { .. })
        ));
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_register_module_and_lookup() {
        let mut manager = manager();
        let ctx = manager.context_id_for("Plugins").unwrap();
        manager.insert_context(ctx, "Plugins", ctx_ref());

        let module = module_ref();
        let id = manager.register_module(ctx, "Sample", module.clone()).unwrap();
        assert_eq!(id, ModuleId::from_name("Sample"));
        assert_eq!(manager.module(id).unwrap().name, "Sample");
        assert_eq!(manager.module_id_of(&module), Some(id));
        assert!(manager.is_indexed("Sample"));

        let err = manager.register_module(ctx, "Sample", module_ref()).unwrap_err();
        assert!(matches!(err, BrokerError::ModuleExists { .. }));
        assert_eq!(manager.context(ctx).unwrap().modules.len(), 1);
    }

    #[test]
    fn test_register_into_unknown_context() {
        let mut manager = manager();
        let err = manager
            .register_module(ContextId::from_raw(12345), "Sample", module_ref())
            .unwrap_err();
        assert!(matches!(err, BrokerError::ContextNotFound(_)));
        assert!(!manager.is_indexed("Sample"));
    }

    #[test]
    fn test_resolve_scans_contexts_and_indexes() {
        let mut manager = manager();
        assert!(!manager.is_indexed("Core"));

        let core = manager.resolve_module("Core").unwrap();
        assert!(manager.is_indexed("Core"));
        assert_eq!(manager.resolve_module("Core"), Some(core));
        assert!(manager.resolve_module("Missing").is_none());
    }

    #[test]
    fn test_unload() {
        let mut manager = manager();
        let ctx = manager.context_id_for("Plugins").unwrap();
        manager.insert_context(ctx, "Plugins", ctx_ref());
        let module = manager.register_module(ctx, "Sample", module_ref()).unwrap();
        let handle = InstanceHandle::from_raw(5).unwrap();
        manager.track_handle(module, handle);

        let unloaded = manager.unload(ctx).unwrap().unwrap();
        assert_eq!(unloaded.context.name, "Plugins");
        assert_eq!(unloaded.handles, vec![handle]);
        assert!(!manager.is_indexed("Sample"));
        assert!(manager.context(ctx).is_err());
        assert!(manager.resolve("Sample").is_none());
    }

    #[test]
    fn test_unload_unknown_and_default() {
        let mut manager = manager();
        assert!(manager.unload(ContextId::from_raw(42)).unwrap().is_none());

        let default = manager.default_context();
        assert!(matches!(
            manager.unload(default),
            Err(BrokerError::ContextNotUnloadable(_))
        ));
    }

    #[test]
    fn test_read_module_image() {
        assert!(matches!(
            read_module_image("", None),
            Err(BrokerError::InvalidPath(_))
        ));
        assert!(matches!(
            read_module_image("/does/not/exist", None),
            Err(BrokerError::FileNotFound(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.bin");
        std::fs::write(&path, b"0123456789").unwrap();
        let path = path.to_str().unwrap();

        assert_eq!(read_module_image(path, None).unwrap().len(), 10);
        assert!(matches!(
            read_module_image(path, Some(4)),
            Err(BrokerError::ImageTooLarge { size: 10, limit: 4 })
        ));
    }
}
