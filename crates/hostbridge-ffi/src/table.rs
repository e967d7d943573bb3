//! The exported operation table
//!
//! Hosts that load the library dynamically can bind every operation in one
//! call instead of resolving each symbol:
//!
//! ```c
//! HostbridgeFunctionTable table = {0};
//! if (!hostbridge_bind(&table)) {
//!     return 1;
//! }
//! table.initialize(NULL);
//! ```

use std::os::raw::{c_char, c_int};

use crate::logging::{hostbridge_set_log_callback, HostLogFn};
use crate::services::{hostbridge_collect_garbage, hostbridge_set_internal_call, HostInternalFn};
use crate::{context::*, instance::*, member::*, query::*};
use crate::{hostbridge_initialize, hostbridge_shutdown, hostbridge_string_free, hostbridge_version};

macro_rules! function_table {
    ($($field:ident: $func:ident => fn($($arg:ty),*) $(-> $ret:ty)?;)*) => {
        /// Every boundary operation, in a C-compatible layout
        #[repr(C)]
        #[derive(Clone, Copy)]
        pub struct FunctionTable {
            $(
                #[doc = concat!("`", stringify!($func), "`")]
                pub $field: Option<unsafe extern "C" fn($($arg),*) $(-> $ret)?>,
            )*
        }

        impl FunctionTable {
            /// A table with every entry filled
            pub fn bound() -> Self {
                Self {
                    $($field: Some($func as unsafe extern "C" fn($($arg),*) $(-> $ret)?),)*
                }
            }

            /// Whether every entry is filled
            pub fn is_bound(&self) -> bool {
                $(self.$field.is_some())&&*
            }
        }

        impl Default for FunctionTable {
            fn default() -> Self {
                Self { $($field: None,)* }
            }
        }
    };
}

function_table! {
    // Lifecycle and services
    initialize: hostbridge_initialize => fn(*const c_char) -> bool;
    shutdown: hostbridge_shutdown => fn();
    version: hostbridge_version => fn() -> *const c_char;
    string_free: hostbridge_string_free => fn(*mut c_char);
    set_log_callback: hostbridge_set_log_callback => fn(Option<HostLogFn>);
    set_internal_call: hostbridge_set_internal_call => fn(*const c_char, Option<HostInternalFn>) -> bool;
    collect_garbage: hostbridge_collect_garbage => fn();

    // Contexts and modules
    create_context: hostbridge_create_context => fn(*const c_char) -> c_int;
    unload_context: hostbridge_unload_context => fn(c_int) -> bool;
    get_default_context: hostbridge_get_default_context => fn() -> c_int;
    get_context_modules: hostbridge_get_context_modules => fn(c_int, *mut c_int) -> c_int;
    load_module: hostbridge_load_module => fn(c_int, *const c_char) -> c_int;
    get_last_status: hostbridge_get_last_status => fn() -> c_int;
    get_module_name: hostbridge_get_module_name => fn(c_int) -> *mut c_char;

    // Types
    get_module_types: hostbridge_get_module_types => fn(c_int, *mut c_int) -> c_int;
    get_core_types: hostbridge_get_core_types => fn(*mut c_int) -> c_int;
    get_type_by_name: hostbridge_get_type_by_name => fn(*const c_char) -> c_int;
    get_full_type_name: hostbridge_get_full_type_name => fn(c_int) -> *mut c_char;
    get_qualified_type_name: hostbridge_get_qualified_type_name => fn(c_int) -> *mut c_char;
    get_base_type: hostbridge_get_base_type => fn(c_int) -> c_int;
    is_derived_from: hostbridge_is_derived_from => fn(c_int, c_int) -> bool;
    is_assignable_to: hostbridge_is_assignable_to => fn(c_int, c_int) -> bool;
    is_assignable_from: hostbridge_is_assignable_from => fn(c_int, c_int) -> bool;
    get_type_size: hostbridge_get_type_size => fn(c_int) -> c_int;
    is_array_type: hostbridge_is_array_type => fn(c_int) -> bool;
    get_element_type: hostbridge_get_element_type => fn(c_int) -> c_int;
    get_type_managed_type: hostbridge_get_type_managed_type => fn(c_int) -> c_int;
    get_type_methods: hostbridge_get_type_methods => fn(c_int, *mut c_int) -> c_int;
    get_type_constructors: hostbridge_get_type_constructors => fn(c_int, *mut c_int) -> c_int;
    get_type_fields: hostbridge_get_type_fields => fn(c_int, *mut c_int) -> c_int;
    get_type_properties: hostbridge_get_type_properties => fn(c_int, *mut c_int) -> c_int;
    has_attribute: hostbridge_has_attribute => fn(c_int, c_int) -> bool;
    get_attributes: hostbridge_get_attributes => fn(c_int, *mut c_int) -> c_int;

    // Members and attributes
    get_member_name: hostbridge_get_member_name => fn(c_int, c_int) -> *mut c_char;
    get_member_declared_type: hostbridge_get_member_declared_type => fn(c_int, c_int) -> c_int;
    get_member_accessibility: hostbridge_get_member_accessibility => fn(c_int, c_int) -> c_int;
    get_member_static: hostbridge_get_member_static => fn(c_int, c_int) -> bool;
    get_member_attributes: hostbridge_get_member_attributes => fn(c_int, c_int, *mut c_int) -> c_int;
    get_method_parameter_types: hostbridge_get_method_parameter_types => fn(c_int, *mut c_int) -> c_int;
    get_method_signature: hostbridge_get_method_signature => fn(c_int) -> *mut c_char;
    get_attribute_type: hostbridge_get_attribute_type => fn(c_int) -> c_int;
    get_attribute_field_value: hostbridge_get_attribute_field_value => fn(c_int, *const c_char, *mut u8) -> bool;

    // Instances
    create_instance: hostbridge_create_instance => fn(c_int, bool, *const u8, *const c_int, c_int) -> u64;
    destroy_instance: hostbridge_destroy_instance => fn(u64) -> bool;
    invoke_instance_method: hostbridge_invoke_instance_method => fn(u64, *const c_char, *const u8, *const c_int, c_int) -> bool;
    invoke_instance_method_ret: hostbridge_invoke_instance_method_ret => fn(u64, *const c_char, *const u8, *const c_int, c_int, *mut u8) -> bool;
    invoke_static_method: hostbridge_invoke_static_method => fn(c_int, *const c_char, *const u8, *const c_int, c_int) -> bool;
    invoke_static_method_ret: hostbridge_invoke_static_method_ret => fn(c_int, *const c_char, *const u8, *const c_int, c_int, *mut u8) -> bool;
    get_field: hostbridge_get_field => fn(u64, *const c_char, *mut u8) -> bool;
    set_field: hostbridge_set_field => fn(u64, *const c_char, *const u8) -> bool;
    get_property: hostbridge_get_property => fn(u64, *const c_char, *mut u8) -> bool;
    set_property: hostbridge_set_property => fn(u64, *const c_char, *const u8) -> bool;
}

/// Fill `table` with every operation
///
/// # Returns
/// * `false` if `table` is NULL
///
/// # Safety
/// `table` must be NULL or valid for writes of a `FunctionTable`.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_bind(table: *mut FunctionTable) -> bool {
    if table.is_null() {
        return false;
    }
    table.write(FunctionTable::bound());
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_fills_every_entry() {
        let mut table = FunctionTable::default();
        assert!(!table.is_bound());

        assert!(unsafe { hostbridge_bind(&mut table) });
        assert!(table.is_bound());
    }

    #[test]
    fn test_bind_null() {
        assert!(!unsafe { hostbridge_bind(std::ptr::null_mut()) });
    }

    #[test]
    fn test_partial_table_is_not_bound() {
        let mut table = FunctionTable::bound();
        table.get_field = None;
        assert!(!table.is_bound());
    }

    #[test]
    fn test_version_through_table() {
        let table = FunctionTable::bound();
        let version = unsafe { std::ffi::CStr::from_ptr((table.version.unwrap())()) };
        assert_eq!(version.to_str().unwrap(), env!("CARGO_PKG_VERSION"));
    }
}
