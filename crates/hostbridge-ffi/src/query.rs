//! Type queries
//!
//! Every type is addressed by its entity id. Ids stay valid until the next
//! `hostbridge_unload_context` call, whichever context it targets.

use std::os::raw::{c_char, c_int};
use std::ptr;

use hostbridge_engine::{EntityId, ModuleId};
use hostbridge_sdk::ManagedType;

use crate::{c_str, entity, fill_ids, rust_to_c_string, with_broker};

fn optional_id(id: Option<EntityId>) -> c_int {
    id.map_or(EntityId::NONE, EntityId::get)
}

// ============================================================================
// Type Listings (two-phase)
// ============================================================================

/// Types defined by a module (two-phase)
///
/// # Returns
/// * Number of types, or -1 on failure
///
/// # Safety
/// `out` must be NULL or hold at least the returned number of elements.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_get_module_types(module_id: c_int, out: *mut c_int) -> c_int {
    with_broker("get_module_types", -1, |broker| {
        let types = broker.module_types(ModuleId::from_raw(module_id))?;
        Ok(fill_ids(&types, out))
    })
}

/// Built-in core types (two-phase)
///
/// # Safety
/// `out` must be NULL or hold at least the returned number of elements.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_get_core_types(out: *mut c_int) -> c_int {
    with_broker("get_core_types", -1, |broker| {
        let types = broker.core_types()?;
        Ok(fill_ids(&types, out))
    })
}

// ============================================================================
// Lookup and Names
// ============================================================================

/// Find a type by full name (`Sample.Widget`) or module-qualified name
/// (`Sample.Widget, Sample`)
///
/// # Returns
/// * Type id, or 0 if no visible type has that name
///
/// # Safety
/// `name` must be NULL or a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_get_type_by_name(name: *const c_char) -> c_int {
    with_broker("get_type_by_name", EntityId::NONE, |broker| {
        let name = c_str(name, "name")?;
        Ok(broker.type_by_name(name)?.get())
    })
}

/// Namespace-qualified type name (free with `hostbridge_string_free`)
#[no_mangle]
pub extern "C" fn hostbridge_get_full_type_name(type_id: c_int) -> *mut c_char {
    with_broker("get_full_type_name", ptr::null_mut(), |broker| {
        Ok(rust_to_c_string(&broker.full_type_name(entity(type_id)?)?))
    })
}

/// Module-qualified type name (free with `hostbridge_string_free`)
#[no_mangle]
pub extern "C" fn hostbridge_get_qualified_type_name(type_id: c_int) -> *mut c_char {
    with_broker("get_qualified_type_name", ptr::null_mut(), |broker| {
        Ok(rust_to_c_string(&broker.qualified_type_name(entity(type_id)?)?))
    })
}

// ============================================================================
// Hierarchy and Shape
// ============================================================================

/// Direct base type, or 0 for root types
#[no_mangle]
pub extern "C" fn hostbridge_get_base_type(type_id: c_int) -> c_int {
    with_broker("get_base_type", EntityId::NONE, |broker| {
        Ok(optional_id(broker.base_type(entity(type_id)?)?))
    })
}

/// Whether `type_id` strictly derives from `base_id`
#[no_mangle]
pub extern "C" fn hostbridge_is_derived_from(type_id: c_int, base_id: c_int) -> bool {
    with_broker("is_derived_from", false, |broker| {
        Ok(broker.is_derived_from(entity(type_id)?, entity(base_id)?)?)
    })
}

/// Whether a value of `type_id` can be stored in a location of `target_id`
#[no_mangle]
pub extern "C" fn hostbridge_is_assignable_to(type_id: c_int, target_id: c_int) -> bool {
    with_broker("is_assignable_to", false, |broker| {
        Ok(broker.is_assignable_to(entity(type_id)?, entity(target_id)?)?)
    })
}

/// Whether a value of `source_id` can be stored in a location of `type_id`
#[no_mangle]
pub extern "C" fn hostbridge_is_assignable_from(type_id: c_int, source_id: c_int) -> bool {
    with_broker("is_assignable_from", false, |broker| {
        Ok(broker.is_assignable_from(entity(type_id)?, entity(source_id)?)?)
    })
}

/// Native size of a value of the type in bytes, or -1 if it has none
#[no_mangle]
pub extern "C" fn hostbridge_get_type_size(type_id: c_int) -> c_int {
    with_broker("get_type_size", -1, |broker| {
        Ok(broker.type_size(entity(type_id)?)? as c_int)
    })
}

/// Whether the type is an array type
#[no_mangle]
pub extern "C" fn hostbridge_is_array_type(type_id: c_int) -> bool {
    with_broker("is_array_type", false, |broker| {
        Ok(broker.is_array_type(entity(type_id)?)?)
    })
}

/// Element type of an array or pointer type, or 0
#[no_mangle]
pub extern "C" fn hostbridge_get_element_type(type_id: c_int) -> c_int {
    with_broker("get_element_type", EntityId::NONE, |broker| {
        Ok(optional_id(broker.element_type(entity(type_id)?)?))
    })
}

/// Semantic tag of the type (see `ManagedType`); -1 for a bad id
#[no_mangle]
pub extern "C" fn hostbridge_get_type_managed_type(type_id: c_int) -> c_int {
    with_broker("get_type_managed_type", -1, |broker| {
        let tag: ManagedType = broker.type_managed_type(entity(type_id)?)?;
        Ok(tag as c_int)
    })
}

// ============================================================================
// Members (two-phase)
// ============================================================================

/// Methods of the type and its ancestors (two-phase)
///
/// # Safety
/// `out` must be NULL or hold at least the returned number of elements.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_get_type_methods(type_id: c_int, out: *mut c_int) -> c_int {
    with_broker("get_type_methods", -1, |broker| {
        let methods = broker.type_methods(entity(type_id)?)?;
        Ok(fill_ids(&methods, out))
    })
}

/// Constructors of the type (two-phase)
///
/// # Safety
/// `out` must be NULL or hold at least the returned number of elements.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_get_type_constructors(type_id: c_int, out: *mut c_int) -> c_int {
    with_broker("get_type_constructors", -1, |broker| {
        let ctors = broker.type_constructors(entity(type_id)?)?;
        Ok(fill_ids(&ctors, out))
    })
}

/// Fields of the type and its ancestors (two-phase)
///
/// # Safety
/// `out` must be NULL or hold at least the returned number of elements.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_get_type_fields(type_id: c_int, out: *mut c_int) -> c_int {
    with_broker("get_type_fields", -1, |broker| {
        let fields = broker.type_fields(entity(type_id)?)?;
        Ok(fill_ids(&fields, out))
    })
}

/// Properties of the type and its ancestors (two-phase)
///
/// # Safety
/// `out` must be NULL or hold at least the returned number of elements.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_get_type_properties(type_id: c_int, out: *mut c_int) -> c_int {
    with_broker("get_type_properties", -1, |broker| {
        let properties = broker.type_properties(entity(type_id)?)?;
        Ok(fill_ids(&properties, out))
    })
}

// ============================================================================
// Attributes
// ============================================================================

/// Whether the type carries an attribute of `attribute_type_id`
#[no_mangle]
pub extern "C" fn hostbridge_has_attribute(type_id: c_int, attribute_type_id: c_int) -> bool {
    with_broker("has_attribute", false, |broker| {
        Ok(broker.has_attribute(entity(type_id)?, entity(attribute_type_id)?)?)
    })
}

/// Attributes applied to the type (two-phase)
///
/// The whole query fails if any single attribute cannot be read.
///
/// # Safety
/// `out` must be NULL or hold at least the returned number of elements.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_get_attributes(type_id: c_int, out: *mut c_int) -> c_int {
    with_broker("get_attributes", -1, |broker| {
        let attributes = broker.type_attributes(entity(type_id)?)?;
        Ok(fill_ids(&attributes, out))
    })
}
