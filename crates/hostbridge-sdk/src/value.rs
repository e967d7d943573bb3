//! Semantic tags and the values that flow across the boundary

use std::fmt;
use std::mem::size_of;

use crate::descriptor::ObjectRef;

// ============================================================================
// Semantic tags
// ============================================================================

/// Coarse value category used for overload matching and marshalling.
///
/// The discriminants are part of the native protocol.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagedType {
    /// Not representable as a native scalar
    Unknown = 0,
    /// Signed 8-bit integer
    SByte = 1,
    /// Unsigned 8-bit integer
    Byte = 2,
    /// Signed 16-bit integer
    Short = 3,
    /// Unsigned 16-bit integer
    UShort = 4,
    /// Signed 32-bit integer
    Int = 5,
    /// Unsigned 32-bit integer
    UInt = 6,
    /// Signed 64-bit integer
    Long = 7,
    /// Unsigned 64-bit integer
    ULong = 8,
    /// 32-bit float
    Float = 9,
    /// 64-bit float
    Double = 10,
    /// Boolean, carried as a 4-byte native value
    Bool = 11,
    /// Opaque pointer or handle
    Pointer = 12,
}

impl ManagedType {
    /// Decode a raw tag coming from native code
    pub fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            0 => ManagedType::Unknown,
            1 => ManagedType::SByte,
            2 => ManagedType::Byte,
            3 => ManagedType::Short,
            4 => ManagedType::UShort,
            5 => ManagedType::Int,
            6 => ManagedType::UInt,
            7 => ManagedType::Long,
            8 => ManagedType::ULong,
            9 => ManagedType::Float,
            10 => ManagedType::Double,
            11 => ManagedType::Bool,
            12 => ManagedType::Pointer,
            _ => return None,
        })
    }

    /// Native size in bytes; zero for `Unknown`
    pub fn size(self) -> usize {
        match self {
            ManagedType::Unknown => 0,
            ManagedType::SByte | ManagedType::Byte => 1,
            ManagedType::Short | ManagedType::UShort => 2,
            ManagedType::Int | ManagedType::UInt | ManagedType::Float | ManagedType::Bool => 4,
            ManagedType::Long | ManagedType::ULong | ManagedType::Double => 8,
            ManagedType::Pointer => size_of::<usize>(),
        }
    }

    /// Tag name as used in diagnostics
    pub fn name(self) -> &'static str {
        match self {
            ManagedType::Unknown => "Unknown",
            ManagedType::SByte => "SByte",
            ManagedType::Byte => "Byte",
            ManagedType::Short => "Short",
            ManagedType::UShort => "UShort",
            ManagedType::Int => "Int",
            ManagedType::UInt => "UInt",
            ManagedType::Long => "Long",
            ManagedType::ULong => "ULong",
            ManagedType::Float => "Float",
            ManagedType::Double => "Double",
            ManagedType::Bool => "Bool",
            ManagedType::Pointer => "Pointer",
        }
    }
}

impl fmt::Display for ManagedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Type shape
// ============================================================================

/// Shape of a provider type, as far as the broker cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// The `void` return type
    Void,
    /// A scalar with a fixed semantic tag
    Primitive(ManagedType),
    /// An unmanaged pointer type (`T*`)
    Pointer,
    /// An opaque native handle type (pointer-sized integer)
    Handle,
    /// An array type
    Array,
    /// A reference type
    Class,
    /// A value type with fields
    Struct,
}

impl TypeKind {
    /// Semantic tag used when matching a parameter of this shape.
    ///
    /// Every pointer-shaped kind collapses to [`ManagedType::Pointer`]:
    /// raw pointers, handles, and object references (which travel as
    /// instance handles).
    pub fn managed_type(self) -> ManagedType {
        match self {
            TypeKind::Primitive(t) => t,
            TypeKind::Pointer | TypeKind::Handle | TypeKind::Array | TypeKind::Class => {
                ManagedType::Pointer
            }
            TypeKind::Void | TypeKind::Struct => ManagedType::Unknown,
        }
    }

    /// Whether values of this kind are managed objects
    pub fn is_object(self) -> bool {
        matches!(self, TypeKind::Array | TypeKind::Class | TypeKind::Struct)
    }
}

/// Member accessibility, with protocol discriminants
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accessibility {
    /// Visible everywhere
    Public = 0,
    /// Visible in the declaring type only
    Private = 1,
    /// Visible in the declaring type and subclasses
    Protected = 2,
    /// Visible in the declaring module
    Internal = 3,
    /// Visible in the declaring module or subclasses
    ProtectedPublic = 4,
    /// Visible in subclasses within the declaring module
    PrivateProtected = 5,
}

// ============================================================================
// Values
// ============================================================================

/// A typed value passed to or returned from a provider
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Result of a `void` member
    Void,
    /// Null object reference
    Null,
    /// Signed 8-bit integer
    I8(i8),
    /// Unsigned 8-bit integer
    U8(u8),
    /// Signed 16-bit integer
    I16(i16),
    /// Unsigned 16-bit integer
    U16(u16),
    /// Signed 32-bit integer
    I32(i32),
    /// Unsigned 32-bit integer
    U32(u32),
    /// Signed 64-bit integer
    I64(i64),
    /// Unsigned 64-bit integer
    U64(u64),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
    /// Boolean
    Bool(bool),
    /// Opaque pointer-sized value
    Pointer(usize),
    /// Managed object reference
    Object(ObjectRef),
}

impl Value {
    /// Semantic tag of this value; `Unknown` for void and objects
    pub fn managed_type(&self) -> ManagedType {
        match self {
            Value::Void | Value::Object(_) => ManagedType::Unknown,
            Value::Null | Value::Pointer(_) => ManagedType::Pointer,
            Value::I8(_) => ManagedType::SByte,
            Value::U8(_) => ManagedType::Byte,
            Value::I16(_) => ManagedType::Short,
            Value::U16(_) => ManagedType::UShort,
            Value::I32(_) => ManagedType::Int,
            Value::U32(_) => ManagedType::UInt,
            Value::I64(_) => ManagedType::Long,
            Value::U64(_) => ManagedType::ULong,
            Value::F32(_) => ManagedType::Float,
            Value::F64(_) => ManagedType::Double,
            Value::Bool(_) => ManagedType::Bool,
        }
    }

    /// Get the value kind as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Null => "null",
            Value::Object(_) => "object",
            other => other.managed_type().name(),
        }
    }

    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Widen any integer value to `i64`
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::I8(v) => Some(v as i64),
            Value::U8(v) => Some(v as i64),
            Value::I16(v) => Some(v as i64),
            Value::U16(v) => Some(v as i64),
            Value::I32(v) => Some(v as i64),
            Value::U32(v) => Some(v as i64),
            Value::I64(v) => Some(v),
            Value::U64(v) => Some(v as i64),
            Value::Pointer(v) => Some(v as i64),
            _ => None,
        }
    }

    /// Get as i32, if this is an `I32`
    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Value::I32(v) => Some(v),
            _ => None,
        }
    }

    /// Get as f64, widening `F32`
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::F32(v) => Some(v as f64),
            Value::F64(v) => Some(v),
            _ => None,
        }
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Get the object reference, if any
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Null => write!(f, "null"),
            Value::I8(v) => write!(f, "{}", v),
            Value::U8(v) => write!(f, "{}", v),
            Value::I16(v) => write!(f, "{}", v),
            Value::U16(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Pointer(p) => write!(f, "{:#x}", p),
            Value::Object(o) => write!(f, "Object({:#x})", o.identity()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_managed_type_raw_roundtrip() {
        for raw in 0..=12 {
            let tag = ManagedType::from_raw(raw).unwrap();
            assert_eq!(tag as i32, raw);
        }
        assert_eq!(ManagedType::from_raw(13), None);
        assert_eq!(ManagedType::from_raw(-1), None);
    }

    #[test]
    fn test_managed_type_sizes() {
        assert_eq!(ManagedType::Byte.size(), 1);
        assert_eq!(ManagedType::Short.size(), 2);
        assert_eq!(ManagedType::Bool.size(), 4);
        assert_eq!(ManagedType::Double.size(), 8);
        assert_eq!(ManagedType::Pointer.size(), size_of::<usize>());
        assert_eq!(ManagedType::Unknown.size(), 0);
    }

    #[test]
    fn test_pointer_shapes_collapse() {
        assert_eq!(TypeKind::Pointer.managed_type(), ManagedType::Pointer);
        assert_eq!(TypeKind::Handle.managed_type(), ManagedType::Pointer);
        assert_eq!(TypeKind::Class.managed_type(), ManagedType::Pointer);
        assert_eq!(TypeKind::Struct.managed_type(), ManagedType::Unknown);
        assert_eq!(
            TypeKind::Primitive(ManagedType::Int).managed_type(),
            ManagedType::Int
        );
    }

    #[test]
    fn test_value_type_name() {
        assert_eq!(Value::Void.type_name(), "void");
        assert_eq!(Value::I32(1).type_name(), "Int");
        assert_eq!(Value::Bool(true).type_name(), "Bool");
        assert_eq!(Value::Pointer(0).type_name(), "Pointer");
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::I32(42).to_string(), "42");
        assert_eq!(Value::Bool(false).to_string(), "false");
        assert_eq!(Value::Pointer(255).to_string(), "0xff");
    }
}
