//! Managed object instances

use std::sync::Arc;

use hostbridge_sdk::{ProviderError, ProviderResult, Value};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::model::TypeInfo;

/// An instance of a manifest type: its runtime type and field storage
#[derive(Debug)]
pub struct ManagedObject {
    ty: Arc<TypeInfo>,
    fields: Mutex<FxHashMap<String, Value>>,
}

impl ManagedObject {
    pub(crate) fn new(ty: Arc<TypeInfo>, fields: FxHashMap<String, Value>) -> Self {
        Self {
            ty,
            fields: Mutex::new(fields),
        }
    }

    /// Runtime type
    pub fn type_info(&self) -> &Arc<TypeInfo> {
        &self.ty
    }

    /// Full name of the runtime type
    pub fn type_name(&self) -> &str {
        self.ty.full_name()
    }

    /// Read a field
    pub fn get(&self, name: &str) -> ProviderResult<Value> {
        self.fields.lock().get(name).cloned().ok_or_else(|| {
            ProviderError::MemberNotFound(format!("{}.{}", self.type_name(), name))
        })
    }

    /// Overwrite a field. The field must exist; the value is not type-checked
    /// here.
    pub fn set(&self, name: &str, value: Value) -> ProviderResult<()> {
        let mut fields = self.fields.lock();
        match fields.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ProviderError::MemberNotFound(format!(
                "{}.{}",
                self.type_name(),
                name
            ))),
        }
    }

    /// Number of fields
    pub fn field_count(&self) -> usize {
        self.fields.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostbridge_sdk::TypeKind;
    use std::sync::Weak;

    fn object() -> ManagedObject {
        let ty = Arc::new(TypeInfo::new("A.T", TypeKind::Class, false, Weak::new()));
        let mut fields = FxHashMap::default();
        fields.insert("count".to_string(), Value::I32(0));
        ManagedObject::new(ty, fields)
    }

    #[test]
    fn test_get_set() {
        let obj = object();
        assert_eq!(obj.get("count").unwrap(), Value::I32(0));
        obj.set("count", Value::I32(5)).unwrap();
        assert_eq!(obj.get("count").unwrap(), Value::I32(5));
        assert_eq!(obj.field_count(), 1);
    }

    #[test]
    fn test_unknown_field() {
        let obj = object();
        assert!(matches!(obj.get("nope"), Err(ProviderError::MemberNotFound(_))));
        assert!(matches!(
            obj.set("nope", Value::I32(1)),
            Err(ProviderError::MemberNotFound(_))
        ));
    }
}
