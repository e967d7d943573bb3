//! Module manifest format
//!
//! A module image is a UTF-8 JSON document describing the module's types
//! and members. Member bodies are not part of the image; a method or
//! constructor names a `native` symbol that the host binds in the
//! [`NativeRegistry`](crate::NativeRegistry).
//!
//! ```json
//! {
//!   "name": "Sample",
//!   "references": ["Shared"],
//!   "types": [{
//!     "name": "Sample.Widget",
//!     "fields": [{ "name": "count", "type": "int" }],
//!     "constructors": [{ "params": [] }],
//!     "methods": [{
//!       "name": "Compute", "params": ["int"], "returns": "int",
//!       "native": "Sample.Widget::Compute"
//!     }]
//!   }]
//! }
//! ```

use hostbridge_sdk::{Accessibility, ProviderError, ProviderResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Top-level module image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModuleManifest {
    /// Module name; also the name other modules reference it by
    pub name: String,
    /// Informational version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Names of modules this one references
    pub references: Vec<String>,
    /// Type declarations
    pub types: Vec<TypeDecl>,
}

impl ModuleManifest {
    /// Parse and validate a module image
    pub fn from_slice(image: &[u8]) -> ProviderResult<Self> {
        let manifest: ModuleManifest = serde_json::from_slice(image)
            .map_err(|e| ProviderError::InvalidImage(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Serialize to an image
    pub fn to_vec(&self) -> ProviderResult<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| ProviderError::Other(e.to_string()))
    }

    /// Check structural consistency
    pub fn validate(&self) -> ProviderResult<()> {
        if self.name.trim().is_empty() {
            return Err(ProviderError::InvalidImage(
                "Module name cannot be empty".to_string(),
            ));
        }

        let mut seen = rustc_hash::FxHashSet::default();
        for ty in &self.types {
            if ty.name.trim().is_empty() {
                return Err(ProviderError::InvalidImage(format!(
                    "Module {} declares a type with an empty name",
                    self.name
                )));
            }
            if ty.name.ends_with("[]") || ty.name.ends_with('*') || ty.name.contains(',') {
                return Err(ProviderError::InvalidImage(format!(
                    "Invalid type name: {}",
                    ty.name
                )));
            }
            if !seen.insert(ty.name.as_str()) {
                return Err(ProviderError::InvalidImage(format!(
                    "Duplicate type {} in module {}",
                    ty.name, self.name
                )));
            }
            ty.validate()?;
        }
        Ok(())
    }
}

/// Shape of a declared type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeDeclKind {
    /// Reference type
    #[default]
    Class,
    /// Value type
    Struct,
}

/// A declared type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TypeDecl {
    /// Namespace-qualified name
    pub name: String,
    /// Class or struct
    pub kind: TypeDeclKind,
    /// Base type name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    /// Attributes on the type
    pub attributes: Vec<AttributeDecl>,
    /// Fields in declaration order
    pub fields: Vec<FieldDecl>,
    /// Properties in declaration order
    pub properties: Vec<PropertyDecl>,
    /// Constructors in declaration order
    pub constructors: Vec<ConstructorDecl>,
    /// Methods in declaration order
    pub methods: Vec<MethodDecl>,
}

impl TypeDecl {
    fn validate(&self) -> ProviderResult<()> {
        let invalid = |what: &str, name: &str| {
            Err(ProviderError::InvalidImage(format!(
                "{} {} in type {}",
                what, name, self.name
            )))
        };

        let mut fields = rustc_hash::FxHashSet::default();
        for field in &self.fields {
            if field.name.is_empty() || !fields.insert(field.name.as_str()) {
                return invalid("Empty or duplicate field", &field.name);
            }
            parse_access(field.access.as_deref())?;
        }
        let mut properties = rustc_hash::FxHashSet::default();
        for property in &self.properties {
            if property.name.is_empty() || !properties.insert(property.name.as_str()) {
                return invalid("Empty or duplicate property", &property.name);
            }
            if let Some(backing) = &property.backing {
                if property.getter.is_some() || property.setter.is_some() {
                    return invalid("Property with both backing field and accessors", &property.name);
                }
                if !fields.contains(backing.as_str()) {
                    return invalid("Property backed by unknown field", &property.name);
                }
            }
            parse_access(property.access.as_deref())?;
        }
        for method in &self.methods {
            if method.name.is_empty() {
                return invalid("Unnamed method", "");
            }
            parse_access(method.access.as_deref())?;
        }
        for ctor in &self.constructors {
            parse_access(ctor.access.as_deref())?;
        }
        Ok(())
    }
}

/// A declared field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldDecl {
    /// Field name
    pub name: String,
    /// Field type name
    #[serde(rename = "type")]
    pub ty: String,
    /// Accessibility keyword
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    /// Initial value for new instances
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    /// Attributes on the field
    pub attributes: Vec<AttributeDecl>,
}

/// A declared property
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PropertyDecl {
    /// Property name
    pub name: String,
    /// Property type name
    #[serde(rename = "type")]
    pub ty: String,
    /// Accessibility keyword
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    /// Field the property reads and writes directly
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backing: Option<String>,
    /// Native symbol for the getter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub getter: Option<String>,
    /// Native symbol for the setter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setter: Option<String>,
    /// Attributes on the property
    pub attributes: Vec<AttributeDecl>,
}

/// A declared constructor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConstructorDecl {
    /// Parameter type names
    pub params: Vec<String>,
    /// Accessibility keyword
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    /// Native symbol run after field initialization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native: Option<String>,
    /// Attributes on the constructor
    pub attributes: Vec<AttributeDecl>,
}

/// A declared method
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MethodDecl {
    /// Method name
    pub name: String,
    /// Parameter type names
    pub params: Vec<String>,
    /// Return type name; `void` when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
    /// Static method
    #[serde(rename = "static")]
    pub is_static: bool,
    /// Accessibility keyword
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    /// Native symbol implementing the body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native: Option<String>,
    /// Attributes on the method
    pub attributes: Vec<AttributeDecl>,
}

/// An attribute application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AttributeDecl {
    /// Attribute type name
    #[serde(rename = "type")]
    pub ty: String,
    /// Named field values
    pub values: Map<String, JsonValue>,
}

/// Parse an accessibility keyword; absent means public
pub fn parse_access(access: Option<&str>) -> ProviderResult<Accessibility> {
    Ok(match access.map(str::trim) {
        None | Some("public") => Accessibility::Public,
        Some("private") => Accessibility::Private,
        Some("protected") => Accessibility::Protected,
        Some("internal") => Accessibility::Internal,
        Some("protected internal") => Accessibility::ProtectedPublic,
        Some("private protected") => Accessibility::PrivateProtected,
        Some(other) => {
            return Err(ProviderError::InvalidImage(format!(
                "Unknown accessibility: {}",
                other
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image(value: JsonValue) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn test_parse_minimal() {
        let manifest = ModuleManifest::from_slice(&image(json!({ "name": "Empty" }))).unwrap();
        assert_eq!(manifest.name, "Empty");
        assert!(manifest.types.is_empty());
    }

    #[test]
    fn test_parse_members() {
        let manifest = ModuleManifest::from_slice(&image(json!({
            "name": "Sample",
            "types": [{
                "name": "Sample.Widget",
                "fields": [{ "name": "count", "type": "int", "default": 3 }],
                "properties": [{ "name": "Count", "type": "int", "backing": "count" }],
                "methods": [{ "name": "Reset", "static": true, "access": "internal" }]
            }]
        })))
        .unwrap();

        let widget = &manifest.types[0];
        assert_eq!(widget.kind, TypeDeclKind::Class);
        assert_eq!(widget.fields[0].default, Some(json!(3)));
        assert_eq!(widget.properties[0].backing.as_deref(), Some("count"));
        assert!(widget.methods[0].is_static);
        assert_eq!(widget.methods[0].returns, None);
    }

    #[test]
    fn test_malformed_json() {
        let err = ModuleManifest::from_slice(b"{ not json").unwrap_err();
        assert!(matches!(err, ProviderError::InvalidImage(_)));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = ModuleManifest::from_slice(&image(json!({ "name": "A", "typez": [] }))).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidImage(_)));
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let err = ModuleManifest::from_slice(&image(json!({
            "name": "A",
            "types": [{ "name": "A.T" }, { "name": "A.T" }]
        })))
        .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidImage(_)));
    }

    #[test]
    fn test_property_backing_must_exist() {
        let err = ModuleManifest::from_slice(&image(json!({
            "name": "A",
            "types": [{
                "name": "A.T",
                "properties": [{ "name": "P", "type": "int", "backing": "missing" }]
            }]
        })))
        .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidImage(_)));
    }

    #[test]
    fn test_parse_access() {
        assert_eq!(parse_access(None).unwrap(), Accessibility::Public);
        assert_eq!(
            parse_access(Some("protected internal")).unwrap(),
            Accessibility::ProtectedPublic
        );
        assert_eq!(
            parse_access(Some("private protected")).unwrap(),
            Accessibility::PrivateProtected
        );
        assert!(parse_access(Some("friend")).is_err());
    }

    #[test]
    fn test_roundtrip_through_image() {
        let manifest = ModuleManifest {
            name: "Round".to_string(),
            types: vec![TypeDecl {
                name: "Round.T".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let parsed = ModuleManifest::from_slice(&manifest.to_vec().unwrap()).unwrap();
        assert_eq!(parsed, manifest);
    }
}
