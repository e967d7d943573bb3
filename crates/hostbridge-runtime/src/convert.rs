//! Conversions between manifest JSON, runtime values and declared types

use std::sync::Arc;

use hostbridge_sdk::{ManagedType, ProviderError, ProviderResult, TypeKind, Value};
use serde_json::Value as JsonValue;

use crate::model::TypeInfo;
use crate::object::ManagedObject;

fn json_mismatch(ty: &TypeInfo, json: &JsonValue) -> ProviderError {
    ProviderError::TypeMismatch {
        expected: ty.full_name().to_string(),
        got: json.to_string(),
    }
}

fn value_mismatch(ty: &TypeInfo, value: &Value) -> ProviderError {
    ProviderError::TypeMismatch {
        expected: ty.full_name().to_string(),
        got: value.type_name().to_string(),
    }
}

/// Convert a manifest literal to a value of type `ty`
pub(crate) fn json_to_value(json: &JsonValue, ty: &TypeInfo) -> ProviderResult<Value> {
    let mismatch = || json_mismatch(ty, json);
    let int = || json.as_i64().ok_or_else(mismatch);
    let uint = || json.as_u64().ok_or_else(mismatch);

    Ok(match ty.kind() {
        TypeKind::Primitive(tag) => match tag {
            ManagedType::SByte => Value::I8(i8::try_from(int()?).map_err(|_| mismatch())?),
            ManagedType::Byte => Value::U8(u8::try_from(uint()?).map_err(|_| mismatch())?),
            ManagedType::Short => Value::I16(i16::try_from(int()?).map_err(|_| mismatch())?),
            ManagedType::UShort => Value::U16(u16::try_from(uint()?).map_err(|_| mismatch())?),
            ManagedType::Int => Value::I32(i32::try_from(int()?).map_err(|_| mismatch())?),
            ManagedType::UInt => Value::U32(u32::try_from(uint()?).map_err(|_| mismatch())?),
            ManagedType::Long => Value::I64(int()?),
            ManagedType::ULong => Value::U64(uint()?),
            ManagedType::Float => Value::F32(json.as_f64().ok_or_else(mismatch)? as f32),
            ManagedType::Double => Value::F64(json.as_f64().ok_or_else(mismatch)?),
            ManagedType::Bool => Value::Bool(json.as_bool().ok_or_else(mismatch)?),
            ManagedType::Pointer => Value::Pointer(usize::try_from(uint()?).map_err(|_| mismatch())?),
            ManagedType::Unknown => return Err(mismatch()),
        },
        TypeKind::Pointer | TypeKind::Handle => {
            Value::Pointer(usize::try_from(uint()?).map_err(|_| mismatch())?)
        }
        TypeKind::Class | TypeKind::Array | TypeKind::Struct if json.is_null() => Value::Null,
        _ => return Err(mismatch()),
    })
}

/// Initial value of a field of type `ty` with no declared default
pub(crate) fn zero_value(ty: &TypeInfo) -> Value {
    match ty.kind() {
        TypeKind::Primitive(tag) => match tag {
            ManagedType::SByte => Value::I8(0),
            ManagedType::Byte => Value::U8(0),
            ManagedType::Short => Value::I16(0),
            ManagedType::UShort => Value::U16(0),
            ManagedType::Int => Value::I32(0),
            ManagedType::UInt => Value::U32(0),
            ManagedType::Long => Value::I64(0),
            ManagedType::ULong => Value::U64(0),
            ManagedType::Float => Value::F32(0.0),
            ManagedType::Double => Value::F64(0.0),
            ManagedType::Bool => Value::Bool(false),
            ManagedType::Pointer => Value::Pointer(0),
            ManagedType::Unknown => Value::Null,
        },
        TypeKind::Pointer | TypeKind::Handle => Value::Pointer(0),
        TypeKind::Void => Value::Void,
        TypeKind::Class | TypeKind::Array | TypeKind::Struct => Value::Null,
    }
}

/// Check that `value` may be stored in a location of type `ty`
pub(crate) fn check_value(value: &Value, ty: &Arc<TypeInfo>) -> ProviderResult<()> {
    let ok = match (ty.kind(), value) {
        (TypeKind::Void, _) => false,
        (TypeKind::Primitive(tag), value) => {
            !matches!(value, Value::Null | Value::Object(_)) && value.managed_type() == tag
        }
        (TypeKind::Pointer | TypeKind::Handle, value) => {
            matches!(value, Value::Pointer(_) | Value::Null)
        }
        (_, Value::Null) => true,
        (_, Value::Object(object)) => object
            .downcast::<ManagedObject>()
            .map(|object| object.type_info().is_subtype_of(ty))
            .unwrap_or(false),
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(value_mismatch(ty, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::CoreTypes;
    use serde_json::json;

    #[test]
    fn test_json_to_primitives() {
        let core = CoreTypes::new();
        let int = core.find("int").unwrap();
        assert_eq!(json_to_value(&json!(42), &int).unwrap(), Value::I32(42));
        assert!(json_to_value(&json!(1u64 << 40), &int).is_err());
        assert!(json_to_value(&json!("42"), &int).is_err());

        let byte = core.find("byte").unwrap();
        assert!(json_to_value(&json!(-1), &byte).is_err());

        let flag = core.find("bool").unwrap();
        assert_eq!(json_to_value(&json!(true), &flag).unwrap(), Value::Bool(true));

        let real = core.find("float").unwrap();
        assert_eq!(json_to_value(&json!(1.5), &real).unwrap(), Value::F32(1.5));
    }

    #[test]
    fn test_json_null_objects() {
        let core = CoreTypes::new();
        assert_eq!(json_to_value(&json!(null), &core.object).unwrap(), Value::Null);
        assert!(json_to_value(&json!({}), &core.object).is_err());
        assert!(json_to_value(&json!(null), &core.void).is_err());
    }

    #[test]
    fn test_zero_values() {
        let core = CoreTypes::new();
        assert_eq!(zero_value(&core.find("long").unwrap()), Value::I64(0));
        assert_eq!(zero_value(&core.find("nint").unwrap()), Value::Pointer(0));
        assert_eq!(zero_value(&core.object), Value::Null);
    }

    #[test]
    fn test_check_value() {
        let core = CoreTypes::new();
        let int = core.find("int").unwrap();
        assert!(check_value(&Value::I32(1), &int).is_ok());
        assert!(check_value(&Value::I64(1), &int).is_err());
        assert!(check_value(&Value::Null, &int).is_err());
        assert!(check_value(&Value::Null, &core.object).is_ok());
        assert!(check_value(&Value::Pointer(8), &core.find("nint").unwrap()).is_ok());
        assert!(check_value(&Value::Void, &core.void).is_err());
    }
}
