//! Member and attribute queries
//!
//! Member operations take a kind selector: 0 = method (including
//! constructors), 1 = field, 2 = property.

use std::os::raw::{c_char, c_int};
use std::ptr;

use hostbridge_engine::marshal::ARG_SLOT_SIZE;
use hostbridge_engine::{EntityId, MemberKind};

use crate::{c_str, entity, fill_ids, rust_to_c_string, with_broker, BoundaryError, BoundaryResult};

fn member_kind(raw: c_int) -> BoundaryResult<MemberKind> {
    MemberKind::from_raw(raw).ok_or(BoundaryError::InvalidValue {
        name: "member kind",
        value: raw as i64,
    })
}

// ============================================================================
// Member Queries
// ============================================================================

/// Name of a member (free with `hostbridge_string_free`)
#[no_mangle]
pub extern "C" fn hostbridge_get_member_name(kind: c_int, member_id: c_int) -> *mut c_char {
    with_broker("get_member_name", ptr::null_mut(), |broker| {
        let name = broker.member_name(member_kind(kind)?, entity(member_id)?)?;
        Ok(rust_to_c_string(&name))
    })
}

/// Return type of a method, or the type of a field or property
#[no_mangle]
pub extern "C" fn hostbridge_get_member_declared_type(kind: c_int, member_id: c_int) -> c_int {
    with_broker("get_member_declared_type", EntityId::NONE, |broker| {
        Ok(broker.member_declared_type(member_kind(kind)?, entity(member_id)?)?.get())
    })
}

/// Accessibility of a member
///
/// # Returns
/// * 0 Public, 1 Private, 2 Protected, 3 Internal, 4 ProtectedPublic,
///   5 PrivateProtected, or -1 for a bad id
#[no_mangle]
pub extern "C" fn hostbridge_get_member_accessibility(kind: c_int, member_id: c_int) -> c_int {
    with_broker("get_member_accessibility", -1, |broker| {
        let access = broker.member_accessibility(member_kind(kind)?, entity(member_id)?)?;
        Ok(access as c_int)
    })
}

/// Whether a member is static
#[no_mangle]
pub extern "C" fn hostbridge_get_member_static(kind: c_int, member_id: c_int) -> bool {
    with_broker("get_member_static", false, |broker| {
        Ok(broker.member_is_static(member_kind(kind)?, entity(member_id)?)?)
    })
}

/// Attributes applied to a member (two-phase)
///
/// # Safety
/// `out` must be NULL or hold at least the returned number of elements.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_get_member_attributes(
    kind: c_int,
    member_id: c_int,
    out: *mut c_int,
) -> c_int {
    with_broker("get_member_attributes", -1, |broker| {
        let attributes = broker.member_attributes(member_kind(kind)?, entity(member_id)?)?;
        Ok(fill_ids(&attributes, out))
    })
}

/// Parameter types of a method, in declaration order (two-phase)
///
/// # Safety
/// `out` must be NULL or hold at least the returned number of elements.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_get_method_parameter_types(
    method_id: c_int,
    out: *mut c_int,
) -> c_int {
    with_broker("get_method_parameter_types", -1, |broker| {
        let params = broker.method_parameter_types(entity(method_id)?)?;
        Ok(fill_ids(&params, out))
    })
}

/// Rendered signature of a method, e.g. `Int32 Compute(Int32)`
///
/// Passing this text as the member name of an invoke call selects exactly
/// this overload.
#[no_mangle]
pub extern "C" fn hostbridge_get_method_signature(method_id: c_int) -> *mut c_char {
    with_broker("get_method_signature", ptr::null_mut(), |broker| {
        Ok(rust_to_c_string(&broker.method_signature(entity(method_id)?)?))
    })
}

// ============================================================================
// Attribute Queries
// ============================================================================

/// Type of an attribute instance
#[no_mangle]
pub extern "C" fn hostbridge_get_attribute_type(attribute_id: c_int) -> c_int {
    with_broker("get_attribute_type", EntityId::NONE, |broker| {
        Ok(broker.attribute_type(entity(attribute_id)?)?.get())
    })
}

/// Read a named field of an attribute instance
///
/// # Arguments
/// * `attribute_id` - Attribute instance id
/// * `field_name` - Field to read
/// * `out` - Buffer of at least one 8-byte slot; the value is written in
///   its declared width
///
/// # Returns
/// * `true` if the value was written
///
/// # Safety
/// `field_name` must be a valid null-terminated string and `out` must be
/// NULL or valid for 8 bytes of writes.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_get_attribute_field_value(
    attribute_id: c_int,
    field_name: *const c_char,
    out: *mut u8,
) -> bool {
    with_broker("get_attribute_field_value", false, |broker| {
        let field = c_str(field_name, "field_name")?;
        if out.is_null() {
            return Err(BoundaryError::NullPointer("out"));
        }
        let out = std::slice::from_raw_parts_mut(out, ARG_SLOT_SIZE);
        broker.attribute_field_value(entity(attribute_id)?, field, out)?;
        Ok(true)
    })
}
