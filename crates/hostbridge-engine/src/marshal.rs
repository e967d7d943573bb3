//! Native buffer marshalling
//!
//! Arguments arrive as a flat native buffer plus one semantic tag per
//! argument. Each argument occupies one [`ARG_SLOT_SIZE`]-byte slot and is
//! stored in the slot's low-order bytes in native byte order. Booleans are
//! 4-byte values where any non-zero value is `true`.
//!
//! Return values go the other way: exactly `declared.size()` bytes are
//! written to the caller's buffer, and nothing at all for `void` members.

use hostbridge_sdk::{ManagedType, Value};
use thiserror::Error;

/// Width of one argument slot in bytes
pub const ARG_SLOT_SIZE: usize = 8;

/// Errors that can occur during marshalling
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarshalError {
    /// The native buffer is shorter than the values it should hold
    #[error("Buffer too small: need {needed} bytes, got {available}")]
    BufferTooSmall {
        /// Bytes required
        needed: usize,
        /// Bytes provided
        available: usize,
    },

    /// A null buffer was passed where values are required
    #[error("Missing buffer for {0} value(s)")]
    MissingBuffer(usize),

    /// Argument count differs from the member's parameter count
    #[error("Expected {expected} argument(s), got {got}")]
    ArityMismatch {
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        got: usize,
    },

    /// Caller's tag disagrees with the declared parameter
    #[error("Argument {index}: tag {got} does not match parameter type {expected}")]
    TagMismatch {
        /// Argument position
        index: usize,
        /// Declared tag
        expected: ManagedType,
        /// Supplied tag
        got: ManagedType,
    },

    /// The declared type has no native representation
    #[error("Type {0} cannot be marshalled")]
    UnsupportedType(String),

    /// A returned value does not match its declared type
    #[error("Value {value} does not fit declared type {declared}")]
    ValueMismatch {
        /// Rendered value
        value: String,
        /// Declared tag
        declared: ManagedType,
    },
}

macro_rules! read_ne {
    ($ty:ty, $bytes:expr) => {{
        let mut raw = [0u8; std::mem::size_of::<$ty>()];
        raw.copy_from_slice(&$bytes[..std::mem::size_of::<$ty>()]);
        <$ty>::from_ne_bytes(raw)
    }};
}

/// Read one value of type `tag` from the start of `bytes`
pub fn read_value(bytes: &[u8], tag: ManagedType) -> Result<Value, MarshalError> {
    let needed = tag.size();
    if needed == 0 {
        return Err(MarshalError::UnsupportedType(tag.name().to_string()));
    }
    if bytes.len() < needed {
        return Err(MarshalError::BufferTooSmall {
            needed,
            available: bytes.len(),
        });
    }

    Ok(match tag {
        ManagedType::SByte => Value::I8(read_ne!(i8, bytes)),
        ManagedType::Byte => Value::U8(read_ne!(u8, bytes)),
        ManagedType::Short => Value::I16(read_ne!(i16, bytes)),
        ManagedType::UShort => Value::U16(read_ne!(u16, bytes)),
        ManagedType::Int => Value::I32(read_ne!(i32, bytes)),
        ManagedType::UInt => Value::U32(read_ne!(u32, bytes)),
        ManagedType::Long => Value::I64(read_ne!(i64, bytes)),
        ManagedType::ULong => Value::U64(read_ne!(u64, bytes)),
        ManagedType::Float => Value::F32(read_ne!(f32, bytes)),
        ManagedType::Double => Value::F64(read_ne!(f64, bytes)),
        ManagedType::Bool => Value::Bool(read_ne!(i32, bytes) != 0),
        ManagedType::Pointer => Value::Pointer(read_ne!(usize, bytes)),
        ManagedType::Unknown => {
            return Err(MarshalError::UnsupportedType(tag.name().to_string()))
        }
    })
}

/// Read `tags.len()` tagged slots out of `buffer`, checking each tag against
/// the declared parameter tag at the same position.
///
/// A parameterless call yields `Ok(None)`; `buffer` may be `None` then.
pub fn marshal_arguments(
    buffer: Option<&[u8]>,
    tags: &[ManagedType],
    params: &[ManagedType],
) -> Result<Option<Vec<Value>>, MarshalError> {
    if tags.len() != params.len() {
        return Err(MarshalError::ArityMismatch {
            expected: params.len(),
            got: tags.len(),
        });
    }
    if tags.is_empty() {
        return Ok(None);
    }

    let buffer = buffer.ok_or(MarshalError::MissingBuffer(tags.len()))?;
    let needed = tags.len() * ARG_SLOT_SIZE;
    if buffer.len() < needed {
        return Err(MarshalError::BufferTooSmall {
            needed,
            available: buffer.len(),
        });
    }

    tags.iter()
        .zip(params)
        .zip(buffer.chunks_exact(ARG_SLOT_SIZE))
        .enumerate()
        .map(|(index, ((&got, &expected), slot))| {
            if got != expected {
                return Err(MarshalError::TagMismatch {
                    index,
                    expected,
                    got,
                });
            }
            read_value(slot, expected)
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Write `value` as `declared` into the start of `out`, returning the
/// number of bytes written.
pub fn write_value(
    value: &Value,
    declared: ManagedType,
    out: &mut [u8],
) -> Result<usize, MarshalError> {
    let size = declared.size();
    if size == 0 {
        return Err(MarshalError::UnsupportedType(declared.name().to_string()));
    }
    if out.len() < size {
        return Err(MarshalError::BufferTooSmall {
            needed: size,
            available: out.len(),
        });
    }

    let mismatch = || MarshalError::ValueMismatch {
        value: value.to_string(),
        declared,
    };
    match (declared, value) {
        (ManagedType::SByte, Value::I8(v)) => out[..size].copy_from_slice(&v.to_ne_bytes()),
        (ManagedType::Byte, Value::U8(v)) => out[..size].copy_from_slice(&v.to_ne_bytes()),
        (ManagedType::Short, Value::I16(v)) => out[..size].copy_from_slice(&v.to_ne_bytes()),
        (ManagedType::UShort, Value::U16(v)) => out[..size].copy_from_slice(&v.to_ne_bytes()),
        (ManagedType::Int, Value::I32(v)) => out[..size].copy_from_slice(&v.to_ne_bytes()),
        (ManagedType::UInt, Value::U32(v)) => out[..size].copy_from_slice(&v.to_ne_bytes()),
        (ManagedType::Long, Value::I64(v)) => out[..size].copy_from_slice(&v.to_ne_bytes()),
        (ManagedType::ULong, Value::U64(v)) => out[..size].copy_from_slice(&v.to_ne_bytes()),
        (ManagedType::Float, Value::F32(v)) => out[..size].copy_from_slice(&v.to_ne_bytes()),
        (ManagedType::Double, Value::F64(v)) => out[..size].copy_from_slice(&v.to_ne_bytes()),
        (ManagedType::Bool, Value::Bool(b)) => {
            out[..size].copy_from_slice(&(*b as i32).to_ne_bytes())
        }
        (ManagedType::Pointer, Value::Pointer(p)) => out[..size].copy_from_slice(&p.to_ne_bytes()),
        (ManagedType::Pointer, Value::Null) => out[..size].fill(0),
        _ => return Err(mismatch()),
    }
    Ok(size)
}

/// Write a member's return value into the caller's buffer.
///
/// `declared` is `None` for `void` members, in which case nothing is
/// written and `out` may be absent.
pub fn marshal_return(
    value: &Value,
    declared: Option<ManagedType>,
    out: Option<&mut [u8]>,
) -> Result<(), MarshalError> {
    let Some(declared) = declared else {
        return Ok(());
    };
    let out = out.ok_or(MarshalError::MissingBuffer(1))?;
    write_value(value, declared, out)?;
    Ok(())
}

/// Pack values into slots, producing the buffer and tag list a native
/// caller would pass.
pub fn encode_arguments(values: &[Value]) -> Result<(Vec<u8>, Vec<ManagedType>), MarshalError> {
    let mut buffer = vec![0u8; values.len() * ARG_SLOT_SIZE];
    let mut tags = Vec::with_capacity(values.len());
    for (value, slot) in values.iter().zip(buffer.chunks_exact_mut(ARG_SLOT_SIZE)) {
        let tag = value.managed_type();
        write_value(value, tag, slot)?;
        tags.push(tag);
    }
    Ok((buffer, tags))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameterless_call() {
        assert_eq!(marshal_arguments(None, &[], &[]).unwrap(), None);
    }

    #[test]
    fn test_read_int_slot() {
        let mut buffer = [0u8; 8];
        buffer[..4].copy_from_slice(&42i32.to_ne_bytes());

        let values = marshal_arguments(Some(&buffer), &[ManagedType::Int], &[ManagedType::Int])
            .unwrap()
            .unwrap();
        assert_eq!(values, vec![Value::I32(42)]);
    }

    #[test]
    fn test_mixed_slots() {
        let (buffer, tags) = encode_arguments(&[
            Value::I8(-3),
            Value::Bool(true),
            Value::F64(2.5),
            Value::Pointer(0xdead),
        ])
        .unwrap();
        assert_eq!(buffer.len(), 4 * ARG_SLOT_SIZE);
        assert_eq!(
            tags,
            vec![
                ManagedType::SByte,
                ManagedType::Bool,
                ManagedType::Double,
                ManagedType::Pointer
            ]
        );

        let values = marshal_arguments(Some(&buffer), &tags, &tags).unwrap().unwrap();
        assert_eq!(
            values,
            vec![
                Value::I8(-3),
                Value::Bool(true),
                Value::F64(2.5),
                Value::Pointer(0xdead)
            ]
        );
    }

    #[test]
    fn test_bool_is_four_bytes_nonzero() {
        let mut buffer = [0u8; 8];
        buffer[..4].copy_from_slice(&7i32.to_ne_bytes());
        assert_eq!(read_value(&buffer, ManagedType::Bool).unwrap(), Value::Bool(true));
        assert_eq!(read_value(&[0u8; 4], ManagedType::Bool).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_missing_buffer() {
        let err = marshal_arguments(None, &[ManagedType::Int], &[ManagedType::Int]).unwrap_err();
        assert_eq!(err, MarshalError::MissingBuffer(1));
    }

    #[test]
    fn test_buffer_too_small() {
        let buffer = [0u8; 8];
        let err = marshal_arguments(
            Some(&buffer),
            &[ManagedType::Int, ManagedType::Int],
            &[ManagedType::Int, ManagedType::Int],
        )
        .unwrap_err();
        assert_eq!(
            err,
            MarshalError::BufferTooSmall {
                needed: 16,
                available: 8
            }
        );
    }

    #[test]
    fn test_tag_mismatch() {
        let buffer = [0u8; 8];
        let err = marshal_arguments(Some(&buffer), &[ManagedType::Long], &[ManagedType::Int])
            .unwrap_err();
        assert_eq!(
            err,
            MarshalError::TagMismatch {
                index: 0,
                expected: ManagedType::Int,
                got: ManagedType::Long
            }
        );
    }

    #[test]
    fn test_arity_mismatch() {
        let err = marshal_arguments(None, &[], &[ManagedType::Int]).unwrap_err();
        assert_eq!(err, MarshalError::ArityMismatch { expected: 1, got: 0 });
    }

    #[test]
    fn test_marshal_return_writes_declared_size() {
        let mut out = [0xffu8; 8];
        marshal_return(&Value::I32(84), Some(ManagedType::Int), Some(&mut out)).unwrap();
        assert_eq!(i32::from_ne_bytes(out[..4].try_into().unwrap()), 84);
        assert_eq!(&out[4..], &[0xff; 4]);
    }

    #[test]
    fn test_void_return_writes_nothing() {
        let mut out = [0xabu8; 4];
        marshal_return(&Value::Void, None, Some(&mut out)).unwrap();
        assert_eq!(out, [0xab; 4]);
        marshal_return(&Value::Void, None, None).unwrap();
    }

    #[test]
    fn test_return_value_mismatch() {
        let mut out = [0u8; 8];
        let err = marshal_return(&Value::F64(1.0), Some(ManagedType::Int), Some(&mut out))
            .unwrap_err();
        assert!(matches!(err, MarshalError::ValueMismatch { .. }));
    }

    #[test]
    fn test_null_pointer_return() {
        let mut out = [0xffu8; 8];
        write_value(&Value::Null, ManagedType::Pointer, &mut out).unwrap();
        assert_eq!(usize::from_ne_bytes(out[..std::mem::size_of::<usize>()].try_into().unwrap()), 0);
    }

    #[test]
    fn test_unknown_tag_rejected() {
        assert!(matches!(
            read_value(&[0u8; 8], ManagedType::Unknown),
            Err(MarshalError::UnsupportedType(_))
        ));
    }
}
