//! Context and module operations

use std::os::raw::{c_char, c_int};

use hostbridge_engine::{ContextId, LoadStatus, ModuleId, INVALID_ID};

use crate::{c_str, rust_to_c_string, with_broker};

// ============================================================================
// Contexts
// ============================================================================

/// Create an isolated load context
///
/// # Arguments
/// * `name` - Context name; the id is derived from it
///
/// # Returns
/// * Context id, or -1 if the name is NULL, empty or already taken
///
/// # Safety
/// `name` must be NULL or a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_create_context(name: *const c_char) -> c_int {
    with_broker("create_context", INVALID_ID, |broker| {
        let name = c_str(name, "name")?;
        Ok(broker.create_context(name)?.get())
    })
}

/// Unload a context and everything loaded into it
///
/// Releases every instance handle owned by the context's modules and clears
/// every entity cache. All entity ids issued so far become invalid, including
/// ids of entities from other contexts.
///
/// # Returns
/// * `true` if the context was unloaded, `false` if it is unknown or cannot
///   be unloaded
#[no_mangle]
pub extern "C" fn hostbridge_unload_context(context_id: c_int) -> bool {
    with_broker("unload_context", false, |broker| {
        Ok(broker.unload_context(ContextId::from_raw(context_id))?)
    })
}

/// Id of the context the process started with
#[no_mangle]
pub extern "C" fn hostbridge_get_default_context() -> c_int {
    with_broker("get_default_context", INVALID_ID, |broker| {
        Ok(broker.contexts().default_context().get())
    })
}

/// Modules owned by a context (two-phase)
///
/// # Safety
/// `out` must be NULL or point to at least as many elements as the count
/// returned by a previous NULL call.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_get_context_modules(context_id: c_int, out: *mut c_int) -> c_int {
    with_broker("get_context_modules", -1, |broker| {
        let modules = broker.context_modules(ContextId::from_raw(context_id))?;
        if !out.is_null() {
            for (i, module) in modules.iter().enumerate() {
                *out.add(i) = module.get();
            }
        }
        Ok(modules.len() as c_int)
    })
}

// ============================================================================
// Modules
// ============================================================================

/// Load a module image into a context
///
/// The outcome is recorded in the last-status register, which
/// `hostbridge_get_last_status` reads.
///
/// # Returns
/// * Module id, or -1 on failure
///
/// # Safety
/// `path` must be NULL or a valid null-terminated string.
///
/// # Example (C)
/// ```c
/// int32_t module = hostbridge_load_module(ctx, "Plugins/Sample.json");
/// if (module == -1) {
///     fprintf(stderr, "load failed: %d\n", hostbridge_get_last_status());
/// }
/// ```
#[no_mangle]
pub unsafe extern "C" fn hostbridge_load_module(context_id: c_int, path: *const c_char) -> c_int {
    with_broker("load_module", INVALID_ID, |broker| {
        // Stays set if the load faults before recording its own outcome.
        broker.set_last_status(LoadStatus::UnknownError);
        let path = match c_str(path, "path") {
            Ok(path) => path,
            Err(err) => {
                broker.set_last_status(LoadStatus::InvalidPath);
                return Err(err);
            }
        };
        Ok(broker.load_module(ContextId::from_raw(context_id), path)?.get())
    })
}

/// Status of the most recent `hostbridge_load_module` call
///
/// # Returns
/// * 0 Success, 1 NotFound, 2 Failed, 3 InvalidPath, 4 InvalidModule,
///   5 CorruptContext, 6 UnknownError
#[no_mangle]
pub extern "C" fn hostbridge_get_last_status() -> c_int {
    with_broker("get_last_status", LoadStatus::UnknownError as c_int, |broker| {
        Ok(broker.last_status() as c_int)
    })
}

/// Name of a loaded module
///
/// # Returns
/// * Name (free with `hostbridge_string_free`), or NULL for an unknown id
#[no_mangle]
pub extern "C" fn hostbridge_get_module_name(module_id: c_int) -> *mut c_char {
    with_broker("get_module_name", std::ptr::null_mut(), |broker| {
        let name = broker.module_name(ModuleId::from_raw(module_id))?;
        Ok(rust_to_c_string(&name))
    })
}
