//! Runtime services: internal calls and garbage collection

use std::os::raw::{c_char, c_int};
use std::sync::Arc;

use hostbridge_engine::marshal::{encode_arguments, read_value, ARG_SLOT_SIZE};
use hostbridge_sdk::{InternalCall, ManagedType, ProviderError, Value};

use crate::{c_str, with_broker, BoundaryError};

/// Host function bound to managed members by name.
///
/// Receives the arguments as `count` slots with one tag each and writes
/// the result into the 8-byte `ret` slot (ignored for `void` members,
/// signalled by `ret_tag == 0`). Returns `false` to fail the invocation.
pub type HostInternalFn = unsafe extern "C" fn(
    args: *const u8,
    tags: *const c_int,
    count: c_int,
    ret_tag: c_int,
    ret: *mut u8,
) -> bool;

/// Adapt a host function to the provider's internal-call shape
pub fn internal_call(name: &str, function: HostInternalFn) -> InternalCall {
    let name = name.to_string();
    Arc::new(move |args: &[Value], returns: Option<ManagedType>| {
        let (buffer, tags) = encode_arguments(args).map_err(|err| {
            ProviderError::InvocationFailed(format!("{}: {}", name, err))
        })?;
        let tags: Vec<c_int> = tags.into_iter().map(|tag| tag as c_int).collect();
        let ret_tag = returns.map_or(ManagedType::Unknown as c_int, |tag| tag as c_int);
        let mut ret = [0u8; ARG_SLOT_SIZE];

        let ok = unsafe {
            function(
                buffer.as_ptr(),
                tags.as_ptr(),
                args.len() as c_int,
                ret_tag,
                ret.as_mut_ptr(),
            )
        };
        if !ok {
            return Err(ProviderError::InvocationFailed(format!(
                "{}: host function reported failure",
                name
            )));
        }
        match returns {
            None => Ok(Value::Void),
            Some(tag) => read_value(&ret, tag)
                .map_err(|err| ProviderError::InvocationFailed(format!("{}: {}", name, err))),
        }
    })
}

/// Bind a host function to managed members that name `name` as their body
///
/// # Returns
/// * `true` if the binding was registered
///
/// # Safety
/// `name` must be a valid null-terminated string. The function must stay
/// callable for the broker's lifetime and must not call back into
/// hostbridge.
#[no_mangle]
pub unsafe extern "C" fn hostbridge_set_internal_call(
    name: *const c_char,
    function: Option<HostInternalFn>,
) -> bool {
    with_broker("set_internal_call", false, |broker| {
        let name = c_str(name, "name")?;
        let function = function.ok_or(BoundaryError::NullPointer("function"))?;
        broker.register_internal_call(name, internal_call(name, function))?;
        Ok(true)
    })
}

/// Ask the provider to reclaim unreachable objects and wait for pending
/// finalizers
#[no_mangle]
pub extern "C" fn hostbridge_collect_garbage() {
    with_broker("collect_garbage", (), |broker| {
        broker.collect_garbage();
        broker.wait_for_pending_finalizers();
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn add(
        args: *const u8,
        tags: *const c_int,
        count: c_int,
        ret_tag: c_int,
        ret: *mut u8,
    ) -> bool {
        if count != 2 || *tags != ManagedType::Int as c_int || ret_tag != ManagedType::Long as c_int {
            return false;
        }
        let slots = std::slice::from_raw_parts(args, 16);
        let a = i32::from_ne_bytes(slots[..4].try_into().unwrap());
        let b = i32::from_ne_bytes(slots[8..12].try_into().unwrap());
        std::ptr::copy_nonoverlapping((a as i64 + b as i64).to_ne_bytes().as_ptr(), ret, 8);
        true
    }

    unsafe extern "C" fn noop(
        _args: *const u8,
        _tags: *const c_int,
        count: c_int,
        ret_tag: c_int,
        _ret: *mut u8,
    ) -> bool {
        count == 0 && ret_tag == ManagedType::Unknown as c_int
    }

    unsafe extern "C" fn refuse(
        _args: *const u8,
        _tags: *const c_int,
        _count: c_int,
        _ret_tag: c_int,
        _ret: *mut u8,
    ) -> bool {
        false
    }

    #[test]
    fn test_internal_call_roundtrip() {
        let call = internal_call("Sample.Math::Add", add);
        let result = call(&[Value::I32(40), Value::I32(2)], Some(ManagedType::Long)).unwrap();
        assert_eq!(result, Value::I64(42));
    }

    #[test]
    fn test_void_internal_call() {
        let call = internal_call("Sample.Log::Flush", noop);
        assert_eq!(call(&[], None).unwrap(), Value::Void);
    }

    #[test]
    fn test_failure_reported() {
        let call = internal_call("Sample.Math::Add", refuse);
        let err = call(&[Value::I32(1)], Some(ManagedType::Int)).unwrap_err();
        assert!(matches!(err, ProviderError::InvocationFailed(_)));
    }
}
