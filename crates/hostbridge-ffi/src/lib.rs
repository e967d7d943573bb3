//! C FFI bindings for the hostbridge broker
//!
//! This crate is the fixed operation table an unmanaged host calls into.
//! The API follows these principles:
//! - ABI-stable (uses only C-compatible types)
//! - One process-wide broker behind one lock; operations are serialized
//! - No fault crosses the boundary: errors and panics become sentinels
//! - Strings returned to the host are freed with `hostbridge_string_free`
//!
//! # Sentinels
//!
//! | result kind | failure value |
//! |---|---|
//! | context / module id | `-1` |
//! | entity id, instance handle | `0` |
//! | predicate | `false` |
//! | string | `NULL` |
//! | size, count, enum | `-1` |
//!
//! The reason for a failure is reported through `tracing` (and the host log
//! callback, if one is set), never through the return value.
//!
//! # Two-phase queries
//!
//! List queries take an `int32_t*` destination. With `NULL` they only
//! return the count; the host then allocates that many elements and calls
//! again to fill them.

#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod instance;
pub mod logging;
pub mod member;
pub mod query;
pub mod services;
pub mod table;

use std::cell::Cell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::ptr;

use hostbridge_engine::marshal::ARG_SLOT_SIZE;
use hostbridge_engine::{Broker, BrokerError, BrokerOptions, EntityId, InstanceHandle};
use hostbridge_runtime::ManifestProvider;
use hostbridge_sdk::ManagedType;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

pub use error::{BoundaryError, BoundaryResult};
pub use table::{hostbridge_bind, FunctionTable};

// ============================================================================
// Global State
// ============================================================================

static BROKER: Lazy<Mutex<Option<Broker>>> = Lazy::new(|| Mutex::new(None));

thread_local! {
    static IN_CALL: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside a broker operation
struct CallGuard;

impl CallGuard {
    fn enter() -> Option<Self> {
        if IN_CALL.with(|flag| flag.replace(true)) {
            return None;
        }
        Some(CallGuard)
    }
}

fn in_call() -> bool {
    IN_CALL.with(Cell::get)
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        IN_CALL.with(|flag| flag.set(false));
    }
}

/// Install `broker` as the process-wide broker, returning the previous one.
///
/// Rust hosts use this to hand over a broker whose provider they have
/// already configured (for example with native bodies registered).
pub fn install_broker(broker: Broker) -> Option<Broker> {
    BROKER.lock().replace(broker)
}

/// Remove and return the process-wide broker
pub fn take_broker() -> Option<Broker> {
    BROKER.lock().take()
}

/// Whether a broker is installed
pub fn is_initialized() -> bool {
    BROKER.lock().is_some()
}

/// Run `f` against the broker, turning every failure into `fallback`.
///
/// Panics are caught here. Calls made from inside a running operation (an
/// internal call or log callback re-entering the table) are rejected
/// instead of deadlocking on the broker lock.
pub(crate) fn with_broker<T>(
    op: &'static str,
    fallback: T,
    f: impl FnOnce(&mut Broker) -> BoundaryResult<T>,
) -> T {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let _guard = CallGuard::enter().ok_or(BoundaryError::Reentrant)?;
        let mut slot = BROKER.lock();
        let broker = slot.as_mut().ok_or(BoundaryError::NotInitialized)?;
        f(broker)
    }));

    match outcome {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => {
            warn!(op, "{}", err);
            fallback
        }
        Err(payload) => {
            error!(op, panic = %panic_message(payload.as_ref()), "operation panicked");
            fallback
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert Rust string to C string (caller must free)
pub(crate) fn rust_to_c_string(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(c_str) => c_str.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Borrow a C string argument as UTF-8
pub(crate) unsafe fn c_str<'a>(s: *const c_char, name: &'static str) -> BoundaryResult<&'a str> {
    if s.is_null() {
        return Err(BoundaryError::NullPointer(name));
    }
    CStr::from_ptr(s)
        .to_str()
        .map_err(|_| BoundaryError::InvalidUtf8(name))
}

pub(crate) fn entity(raw: c_int) -> BoundaryResult<EntityId> {
    EntityId::from_raw(raw).ok_or(BoundaryError::InvalidValue {
        name: "entity id",
        value: raw as i64,
    })
}

pub(crate) fn handle(raw: u64) -> BoundaryResult<InstanceHandle> {
    InstanceHandle::from_raw(raw).ok_or(BoundaryError::InvalidValue {
        name: "instance handle",
        value: 0,
    })
}

/// View the argument buffer and tag list of an invocation.
///
/// A zero count is the parameterless call; both pointers may be null then.
pub(crate) unsafe fn arguments<'a>(
    args: *const u8,
    tags: *const c_int,
    count: c_int,
) -> BoundaryResult<(Option<&'a [u8]>, Vec<ManagedType>)> {
    let count = usize::try_from(count).map_err(|_| BoundaryError::InvalidValue {
        name: "argument count",
        value: count as i64,
    })?;
    if count == 0 {
        return Ok((None, Vec::new()));
    }
    if tags.is_null() {
        return Err(BoundaryError::NullPointer("argument tags"));
    }
    let tags = std::slice::from_raw_parts(tags, count)
        .iter()
        .map(|&raw| {
            ManagedType::from_raw(raw).ok_or(BoundaryError::InvalidValue {
                name: "argument tag",
                value: raw as i64,
            })
        })
        .collect::<BoundaryResult<Vec<_>>>()?;
    let buffer = (!args.is_null()).then(|| std::slice::from_raw_parts(args, count * ARG_SLOT_SIZE));
    Ok((buffer, tags))
}

/// View a single-slot input value
pub(crate) unsafe fn single_slot<'a>(value: *const u8) -> Option<&'a [u8]> {
    (!value.is_null()).then(|| std::slice::from_raw_parts(value, ARG_SLOT_SIZE))
}

/// Write ids into a two-phase destination, returning the count
pub(crate) unsafe fn fill_ids(ids: &[EntityId], out: *mut c_int) -> c_int {
    if !out.is_null() {
        for (i, id) in ids.iter().enumerate() {
            *out.add(i) = id.get();
        }
    }
    ids.len() as c_int
}

pub(crate) fn marshal_error(err: hostbridge_engine::marshal::MarshalError) -> BoundaryError {
    BoundaryError::Broker(BrokerError::Marshal(err))
}

// ============================================================================
// Lifecycle Functions
// ============================================================================

/// Create the process-wide broker
///
/// # Arguments
/// * `config_path` - Optional path to a TOML options file (may be NULL)
///
/// # Returns
/// * `true` if a broker is ready (including when one already was)
/// * `false` if the options could not be read
///
/// # Safety
/// `config_path` must be NULL or a valid null-terminated string.
///
/// # Example (C)
/// ```c
/// if (!hostbridge_initialize(NULL)) {
///     return 1;
/// }
/// int32_t ctx = hostbridge_create_context("Plugins");
/// // ...
/// hostbridge_shutdown();
/// ```
#[no_mangle]
pub unsafe extern "C" fn hostbridge_initialize(config_path: *const c_char) -> bool {
    if in_call() {
        error!("hostbridge_initialize called from inside an operation");
        return false;
    }
    let options = if config_path.is_null() {
        BrokerOptions::default()
    } else {
        let loaded = c_str(config_path, "config_path")
            .map_err(|e| e.to_string())
            .and_then(|path| BrokerOptions::from_file(Path::new(path)).map_err(|e| e.to_string()));
        match loaded {
            Ok(options) => options,
            Err(err) => {
                logging::init(&BrokerOptions::default().log_filter);
                error!("failed to read broker options: {}", err);
                return false;
            }
        }
    };
    logging::init(&options.log_filter);

    let mut slot = BROKER.lock();
    if slot.is_some() {
        debug!("broker already initialized");
        return true;
    }
    let provider = ManifestProvider::new();
    *slot = Some(Broker::with_options(Box::new(provider), options));
    info!(version = env!("CARGO_PKG_VERSION"), "hostbridge initialized");
    true
}

/// Tear down the process-wide broker
///
/// Every context, module, entity id and instance handle becomes invalid.
/// Calling this without a broker is a no-op.
#[no_mangle]
pub extern "C" fn hostbridge_shutdown() {
    if in_call() {
        error!("hostbridge_shutdown called from inside an operation");
        return;
    }
    if take_broker().is_some() {
        info!("hostbridge shut down");
    }
}

/// Free a string returned by a hostbridge function
///
/// # Safety
/// `s` must be NULL or a string returned by this library, freed only once.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// Get the library version string
///
/// # Returns
/// * Static string, must not be freed
#[no_mangle]
pub extern "C" fn hostbridge_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr() as *const c_char
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let version = unsafe { CStr::from_ptr(hostbridge_version()) };
        assert_eq!(version.to_str().unwrap(), env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_string_roundtrip() {
        unsafe {
            let s = rust_to_c_string("Sample.Widget");
            assert!(!s.is_null());
            assert_eq!(c_str(s, "s").unwrap(), "Sample.Widget");
            hostbridge_string_free(s);
            hostbridge_string_free(ptr::null_mut());
        }
    }

    #[test]
    fn test_interior_nul_gives_null() {
        assert!(rust_to_c_string("a\0b").is_null());
    }

    #[test]
    fn test_null_string_argument() {
        let err = unsafe { c_str(ptr::null(), "name") }.unwrap_err();
        assert!(matches!(err, BoundaryError::NullPointer("name")));
    }

    #[test]
    fn test_parameterless_arguments() {
        let (buffer, tags) = unsafe { arguments(ptr::null(), ptr::null(), 0) }.unwrap();
        assert!(buffer.is_none());
        assert!(tags.is_empty());
    }

    #[test]
    fn test_argument_views() {
        let mut slots = [0u8; 16];
        slots[..4].copy_from_slice(&7i32.to_ne_bytes());
        slots[8..].copy_from_slice(&2.5f64.to_ne_bytes());
        let tags = [ManagedType::Int as c_int, ManagedType::Double as c_int];

        let (buffer, tags) = unsafe { arguments(slots.as_ptr(), tags.as_ptr(), 2) }.unwrap();
        assert_eq!(buffer.unwrap().len(), 16);
        assert_eq!(tags, vec![ManagedType::Int, ManagedType::Double]);
    }

    #[test]
    fn test_bad_arguments() {
        let tags = [99 as c_int];
        assert!(unsafe { arguments(ptr::null(), tags.as_ptr(), 1) }.is_err());
        assert!(unsafe { arguments(ptr::null(), ptr::null(), 1) }.is_err());
        assert!(unsafe { arguments(ptr::null(), ptr::null(), -1) }.is_err());
    }

    #[test]
    fn test_fill_ids_two_phase() {
        let ids: Vec<EntityId> = [3, 1, 2].into_iter().filter_map(EntityId::from_raw).collect();
        assert_eq!(unsafe { fill_ids(&ids, ptr::null_mut()) }, 3);

        let mut out = vec![0; 3];
        assert_eq!(unsafe { fill_ids(&ids, out.as_mut_ptr()) }, 3);
        assert_eq!(out, vec![3, 1, 2]);
    }

    #[test]
    fn test_bad_entity_and_handle() {
        assert!(entity(0).is_err());
        assert!(entity(-5).is_err());
        assert_eq!(entity(4).unwrap().get(), 4);
        assert!(handle(0).is_err());
    }
}
