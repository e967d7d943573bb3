//! The broker state object
//!
//! [`Broker`] owns everything the native boundary needs between calls:
//! the entity caches, load contexts, the module index, the resolution
//! memo, the instance handle table and the last-status register. It is
//! not internally synchronized; callers that share one broker across
//! threads must serialize every operation.

mod instance;
mod query;

pub use instance::TypedValue;
pub use query::MemberKind;

use hostbridge_sdk::{InternalCall, TypeSystemProvider};
use tracing::{debug, error, info, warn};

use crate::cache::EntityCaches;
use crate::context::{read_module_image, ContextId, ContextManager, ModuleId};
use crate::error::{BrokerError, BrokerResult, LoadStatus};
use crate::handles::HandleTable;
use crate::options::BrokerOptions;
use crate::resolver::MemberResolver;

/// Native-to-managed interop broker
pub struct Broker {
    provider: Box<dyn TypeSystemProvider>,
    caches: EntityCaches,
    contexts: ContextManager,
    resolver: MemberResolver,
    handles: HandleTable,
    options: BrokerOptions,
}

impl Broker {
    /// Create a broker over `provider` with default options
    pub fn new(provider: Box<dyn TypeSystemProvider>) -> Self {
        Self::with_options(provider, BrokerOptions::default())
    }

    /// Create a broker with custom options.
    ///
    /// The default context is registered immediately with whatever modules
    /// the provider reports as already present.
    pub fn with_options(provider: Box<dyn TypeSystemProvider>, options: BrokerOptions) -> Self {
        let modules: Vec<_> = provider
            .default_modules()
            .into_iter()
            .map(|module| (provider.module_name(&module), module))
            .collect();
        debug!(count = modules.len(), "registering default modules");
        let contexts =
            ContextManager::new(&options.default_context_name, provider.default_context(), modules);

        Self {
            provider,
            caches: EntityCaches::new(),
            contexts,
            resolver: MemberResolver::new(options.memoize_resolutions),
            handles: HandleTable::new(),
            options,
        }
    }

    /// Options the broker was created with
    pub fn options(&self) -> &BrokerOptions {
        &self.options
    }

    /// The underlying type-system provider
    pub fn provider(&self) -> &dyn TypeSystemProvider {
        &*self.provider
    }

    /// Entity caches, for inspection
    pub fn caches(&self) -> &EntityCaches {
        &self.caches
    }

    /// Load contexts and module index, for inspection
    pub fn contexts(&self) -> &ContextManager {
        &self.contexts
    }

    /// Instance handle table, for inspection
    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    /// Member resolver, for inspection
    pub fn resolver(&self) -> &MemberResolver {
        &self.resolver
    }

    // ========================================================================
    // Contexts and modules
    // ========================================================================

    /// Create an empty, unloadable context named `name`
    pub fn create_context(&mut self, name: &str) -> BrokerResult<ContextId> {
        let id = self.contexts.context_id_for(name)?;
        let context = self.provider.create_context(name)?;
        self.contexts.insert_context(id, name, context);
        info!(context = %name, id = id.get(), "created load context");
        Ok(id)
    }

    /// Load the module at `path` into a context.
    ///
    /// The outcome is always recorded in the last-status register.
    pub fn load_module(&mut self, context_id: ContextId, path: &str) -> BrokerResult<ModuleId> {
        let result = self.try_load_module(context_id, path);
        match &result {
            Ok(id) => {
                self.contexts.set_status(LoadStatus::Success);
                info!(path = %path, module = id.get(), context = context_id.get(), "loaded module");
            }
            Err(err) => {
                let status = err.load_status();
                self.contexts.set_status(status);
                error!(path = %path, context = context_id.get(), ?status, "failed to load module: {}", err);
            }
        }
        result
    }

    fn try_load_module(&mut self, context_id: ContextId, path: &str) -> BrokerResult<ModuleId> {
        let image = read_module_image(path, self.options.max_image_bytes)?;
        let context = self.contexts.context(context_id)?.context.clone();
        let module = self
            .provider
            .load_module(&context, &image, &mut self.contexts)?;
        let name = self.provider.module_name(&module);
        match self.contexts.register_module(context_id, &name, module.clone()) {
            Ok(id) => Ok(id),
            Err(err) => {
                self.provider.discard_module(&context, &module);
                Err(err)
            }
        }
    }

    /// Status of the most recent [`load_module`](Self::load_module) call
    pub fn last_status(&self) -> LoadStatus {
        self.contexts.last_status()
    }

    /// Overwrite the last-status register.
    ///
    /// Used by the native boundary when a load call faults outright.
    pub fn set_last_status(&mut self, status: LoadStatus) {
        self.contexts.set_status(status);
    }

    /// Name of a loaded module
    pub fn module_name(&self, id: ModuleId) -> BrokerResult<String> {
        Ok(self.contexts.module(id)?.name.clone())
    }

    /// Modules owned by a context, in load order
    pub fn context_modules(&self, id: ContextId) -> BrokerResult<Vec<ModuleId>> {
        Ok(self
            .contexts
            .context(id)?
            .modules
            .iter()
            .map(|record| record.id)
            .collect())
    }

    /// Unload a context.
    ///
    /// Releases every instance handle registered against the context's
    /// modules, then clears every entity cache in the broker. All entity
    /// ids issued before this call are invalid afterwards, including ids
    /// of entities from contexts that stay loaded.
    ///
    /// The provider unloads first; if it refuses, nothing in the broker
    /// changes. Returns `Ok(false)` for an unknown id.
    pub fn unload_context(&mut self, id: ContextId) -> BrokerResult<bool> {
        let runtime = match self.contexts.context(id) {
            Ok(context) if !context.unloadable => {
                return Err(BrokerError::ContextNotUnloadable(id))
            }
            Ok(context) => context.context.clone(),
            Err(_) => {
                warn!(context = id.get(), "unload requested for unknown context");
                return Ok(false);
            }
        };
        // A provider refusal leaves the context, its handles and every cache
        // as they were.
        self.provider.unload_context(&runtime)?;

        let Some(unloaded) = self.contexts.unload(id)? else {
            return Ok(false);
        };

        let released = unloaded
            .handles
            .iter()
            .filter(|&&handle| self.handles.release(handle))
            .count();
        self.caches.clear_all();
        self.resolver.invalidate();

        info!(
            context = %unloaded.context.name,
            modules = unloaded.context.modules.len(),
            released,
            "unloaded load context"
        );
        Ok(true)
    }

    // ========================================================================
    // Runtime services
    // ========================================================================

    /// Bind a host function to members that name `name` as their body
    pub fn register_internal_call(&mut self, name: &str, call: InternalCall) -> BrokerResult<()> {
        if name.is_empty() {
            return Err(BrokerError::InvalidArgument(
                "internal call name cannot be empty".to_string(),
            ));
        }
        self.provider.register_internal_call(name, call)?;
        debug!(name = %name, "registered internal call");
        Ok(())
    }

    /// Ask the provider to reclaim unreachable objects
    pub fn collect_garbage(&mut self) {
        self.provider.collect_garbage();
    }

    /// Block until the provider's pending finalizers have run
    pub fn wait_for_pending_finalizers(&mut self) {
        self.provider.wait_for_pending_finalizers();
    }
}
