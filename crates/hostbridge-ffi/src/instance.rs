//! Instance operations
//!
//! Arguments are passed as `count` consecutive 8-byte slots plus one
//! semantic tag per slot (see `ManagedType`). Object arguments and results
//! are instance handles in pointer slots; 0 stands for null. Return buffers
//! must hold the declared type's size and are left untouched for `void`
//! members.

use std::os::raw::{c_char, c_int};

use hostbridge_engine::marshal::MarshalError;
use hostbridge_engine::TypedValue;

use crate::{
    arguments, c_str, entity, handle, marshal_error, single_slot, with_broker, BoundaryResult,
};

/// Write `result` into a caller buffer sized for its declared type
unsafe fn write_result(result: &TypedValue, out: *mut u8) -> BoundaryResult<()> {
    let Some(declared) = result.declared else {
        return Ok(());
    };
    if out.is_null() {
        return Err(marshal_error(MarshalError::MissingBuffer(1)));
    }
    let out = std::slice::from_raw_parts_mut(out, declared.size());
    result.write_to(Some(out)).map_err(marshal_error)
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Construct an instance and return an ownership handle
///
/// # Arguments
/// * `type_id` - Type to construct
/// * `weak` - Issue a weak (lookup-only) handle instead of a strong one.
///   A weak handle does not keep the object alive; unless the runtime
///   itself retains the new object, it is stale as soon as it is returned
/// * `args`, `tags`, `count` - Constructor arguments; the constructor must
///   match the tags exactly
///
/// # Returns
/// * Instance handle, or 0 on failure
///
/// # Safety
/// `args` must be NULL or hold `count` slots; `tags` must hold `count`
/// tags when `count > 0`.
///
/// # Example (C)
/// ```c
/// uint64_t widget = hostbridge_create_instance(widget_type, false, NULL, NULL, 0);
/// int64_t arg = 21;
/// int32_t tag = HB_INT;
/// int32_t result = 0;
/// hostbridge_invoke_instance_method_ret(widget, "Compute", (uint8_t*)&arg, &tag, 1, (uint8_t*)&result);
/// hostbridge_destroy_instance(widget);
/// ```
#[no_mangle]
pub unsafe extern "C" fn hostbridge_create_instance(
    type_id: c_int,
    weak: bool,
    args: *const u8,
    tags: *const c_int,
    count: c_int,
) -> u64 {
    with_broker("create_instance", 0, |broker| {
        let (args, tags) = arguments(args, tags, count)?;
        Ok(broker.create_instance(entity(type_id)?, weak, args, &tags)?.get())
    })
}

/// Release an instance handle
///
/// # Returns
/// * `false` if the handle is not live
#[no_mangle]
pub extern "C" fn hostbridge_destroy_instance(instance: u64) -> bool {
    with_broker("destroy_instance", false, |broker| {
        broker.destroy_instance(handle(instance)?)?;
        Ok(true)
    })
}

// ============================================================================
// Invocation
// ============================================================================

/// Invoke an instance method, discarding its result
///
/// # Safety
/// `name` must be a valid null-terminated string; `args` and `tags` as for
/// `hostbridge_create_instance`.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_invoke_instance_method(
    instance: u64,
    name: *const c_char,
    args: *const u8,
    tags: *const c_int,
    count: c_int,
) -> bool {
    with_broker("invoke_instance_method", false, |broker| {
        let name = c_str(name, "name")?;
        let (args, tags) = arguments(args, tags, count)?;
        broker.invoke_instance_method(handle(instance)?, name, args, &tags)?;
        Ok(true)
    })
}

/// Invoke an instance method and write its result into `ret`
///
/// An object result is written as a new strong handle, distinct from any
/// handle the caller already holds for that object. The caller owns it and
/// must release it with `hostbridge_destroy_instance`.
///
/// # Safety
/// As `hostbridge_invoke_instance_method`; `ret` must be valid for the
/// declared return type's size unless the method returns `void`.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_invoke_instance_method_ret(
    instance: u64,
    name: *const c_char,
    args: *const u8,
    tags: *const c_int,
    count: c_int,
    ret: *mut u8,
) -> bool {
    with_broker("invoke_instance_method_ret", false, |broker| {
        let name = c_str(name, "name")?;
        let (args, tags) = arguments(args, tags, count)?;
        let result = broker.invoke_instance_method(handle(instance)?, name, args, &tags)?;
        write_result(&result, ret)?;
        Ok(true)
    })
}

/// Invoke a static method, discarding its result
///
/// # Safety
/// As `hostbridge_invoke_instance_method`.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_invoke_static_method(
    type_id: c_int,
    name: *const c_char,
    args: *const u8,
    tags: *const c_int,
    count: c_int,
) -> bool {
    with_broker("invoke_static_method", false, |broker| {
        let name = c_str(name, "name")?;
        let (args, tags) = arguments(args, tags, count)?;
        broker.invoke_static_method(entity(type_id)?, name, args, &tags)?;
        Ok(true)
    })
}

/// Invoke a static method and write its result into `ret`
///
/// Object results are new strong handles the caller must release, as for
/// `hostbridge_invoke_instance_method_ret`.
///
/// # Safety
/// As `hostbridge_invoke_instance_method_ret`.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_invoke_static_method_ret(
    type_id: c_int,
    name: *const c_char,
    args: *const u8,
    tags: *const c_int,
    count: c_int,
    ret: *mut u8,
) -> bool {
    with_broker("invoke_static_method_ret", false, |broker| {
        let name = c_str(name, "name")?;
        let (args, tags) = arguments(args, tags, count)?;
        let result = broker.invoke_static_method(entity(type_id)?, name, args, &tags)?;
        write_result(&result, ret)?;
        Ok(true)
    })
}

// ============================================================================
// Fields and Properties
// ============================================================================

/// Read a field into `out` (sized for the field's type)
///
/// Object-typed fields are read as new strong handles the caller must
/// release with `hostbridge_destroy_instance`.
///
/// # Safety
/// `name` must be a valid null-terminated string; `out` must be valid for
/// the field type's size.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_get_field(
    instance: u64,
    name: *const c_char,
    out: *mut u8,
) -> bool {
    with_broker("get_field", false, |broker| {
        let name = c_str(name, "name")?;
        let value = broker.get_field(handle(instance)?, name)?;
        write_result(&value, out)?;
        Ok(true)
    })
}

/// Write a field from one 8-byte slot
///
/// # Safety
/// `name` must be a valid null-terminated string; `value` must be valid for
/// 8 bytes of reads.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_set_field(
    instance: u64,
    name: *const c_char,
    value: *const u8,
) -> bool {
    with_broker("set_field", false, |broker| {
        let name = c_str(name, "name")?;
        broker.set_field(handle(instance)?, name, single_slot(value))?;
        Ok(true)
    })
}

/// Read a property into `out` (sized for the property's type)
///
/// Object-typed properties are read as new strong handles, as for
/// `hostbridge_get_field`.
///
/// # Safety
/// As `hostbridge_get_field`.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_get_property(
    instance: u64,
    name: *const c_char,
    out: *mut u8,
) -> bool {
    with_broker("get_property", false, |broker| {
        let name = c_str(name, "name")?;
        let value = broker.get_property(handle(instance)?, name)?;
        write_result(&value, out)?;
        Ok(true)
    })
}

/// Write a property from one 8-byte slot
///
/// # Safety
/// As `hostbridge_set_field`.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_set_property(
    instance: u64,
    name: *const c_char,
    value: *const u8,
) -> bool {
    with_broker("set_property", false, |broker| {
        let name = c_str(name, "name")?;
        broker.set_property(handle(instance)?, name, single_slot(value))?;
        Ok(true)
    })
}
