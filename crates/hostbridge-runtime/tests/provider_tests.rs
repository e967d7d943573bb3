//! Integration tests for the manifest-backed type-system provider

use hostbridge_runtime::{ManagedObject, ManifestProvider};
use hostbridge_sdk::{
    Accessibility, ManagedType, MemberRef, NoResolver, ProviderError, TypeKind,
    TypeRef, TypeSystemProvider, Value,
};
use serde_json::json;

fn image(value: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&value).unwrap()
}

fn widget_module() -> Vec<u8> {
    image(json!({
        "name": "Sample",
        "types": [
            {
                "name": "Sample.Base",
                "fields": [{ "name": "id", "type": "long", "default": 7 }],
                "methods": [
                    { "name": "Describe", "returns": "int", "native": "Sample.Base::Describe" }
                ]
            },
            {
                "name": "Sample.Widget",
                "base": "Sample.Base",
                "attributes": [{ "type": "Sample.TagAttribute", "values": { "Name": 5 } }],
                "fields": [
                    { "name": "count", "type": "int", "access": "private" },
                    { "name": "scale", "type": "double", "default": 1.5 }
                ],
                "properties": [
                    { "name": "Count", "type": "int", "backing": "count" },
                    { "name": "Doubled", "type": "int", "getter": "Sample.Widget::get_Doubled" }
                ],
                "constructors": [
                    { "params": [] },
                    { "params": ["int"], "native": "Sample.Widget::.ctor(int)" }
                ],
                "methods": [
                    { "name": "Compute", "params": ["int"], "returns": "int",
                      "native": "Sample.Widget::Compute" },
                    { "name": "Create", "static": true, "returns": "Sample.Widget",
                      "native": "Sample.Widget::Create" },
                    { "name": "Missing", "returns": "int" }
                ]
            },
            {
                "name": "Sample.TagAttribute",
                "base": "System.Attribute",
                "fields": [{ "name": "Name", "type": "int" }]
            },
            {
                "name": "Sample.Point",
                "kind": "struct",
                "fields": [
                    { "name": "x", "type": "int" },
                    { "name": "y", "type": "int" },
                    { "name": "tag", "type": "nint" }
                ]
            }
        ]
    }))
}

fn provider() -> ManifestProvider {
    let provider = ManifestProvider::new();
    let natives = provider.natives();
    natives.register("Sample.Widget::Compute", |call| {
        Ok(Value::I32(call.arg_i32(0)? * 2))
    });
    natives.register("Sample.Widget::.ctor(int)", |call| {
        call.set_field("count", Value::I32(call.arg_i32(0)?))?;
        Ok(Value::Void)
    });
    natives.register("Sample.Widget::get_Doubled", |call| {
        Ok(Value::I32(call.field("count")?.as_i32().unwrap_or(0) * 2))
    });
    natives.register("Sample.Base::Describe", |call| {
        Ok(Value::I32(call.field("id")?.as_i64().unwrap_or(0) as i32))
    });
    provider
}

fn load(provider: &mut ManifestProvider) -> Vec<TypeRef> {
    let ctx = provider.create_context("Plugins").unwrap();
    let module = provider
        .load_module(&ctx, &widget_module(), &mut NoResolver)
        .unwrap();
    provider.module_types(&module).unwrap()
}

fn named(provider: &ManifestProvider, types: &[TypeRef], name: &str) -> TypeRef {
    types
        .iter()
        .find(|t| provider.full_name(t) == name)
        .cloned()
        .unwrap()
}

// ===== Context and Module Tests =====

#[test]
fn test_default_modules_include_core() {
    let provider = ManifestProvider::new();
    let modules = provider.default_modules();
    assert_eq!(modules.len(), 1);
    assert_eq!(provider.module_name(&modules[0]), "System.Runtime");
    assert!(!provider.core_types().is_empty());
}

#[test]
fn test_load_and_enumerate() {
    let mut provider = provider();
    let types = load(&mut provider);
    let names: Vec<String> = types.iter().map(|t| provider.full_name(t)).collect();
    assert_eq!(
        names,
        vec!["Sample.Base", "Sample.Widget", "Sample.TagAttribute", "Sample.Point"]
    );
    let widget = named(&provider, &types, "Sample.Widget");
    assert_eq!(provider.qualified_name(&widget), "Sample.Widget, Sample");
    assert_eq!(provider.type_kind(&widget), TypeKind::Class);
}

#[test]
fn test_host_module_in_default_context() {
    let mut provider = ManifestProvider::new();
    provider
        .add_host_module(&image(json!({ "name": "Host", "types": [{ "name": "Host.Api" }] })))
        .unwrap();
    assert_eq!(provider.default_modules().len(), 2);
    assert!(provider.find_type("Host.Api", &mut NoResolver).is_some());
}

#[test]
fn test_invalid_image() {
    let mut provider = ManifestProvider::new();
    let ctx = provider.create_context("Bad").unwrap();
    let err = provider
        .load_module(&ctx, b"not a manifest", &mut NoResolver)
        .unwrap_err();
    assert!(matches!(err, ProviderError::InvalidImage(_)));
}

#[test]
fn test_unload_context() {
    let mut provider = provider();
    let ctx = provider.create_context("Temp").unwrap();
    provider
        .load_module(&ctx, &widget_module(), &mut NoResolver)
        .unwrap();
    assert_eq!(provider.context_count(), 1);

    provider.unload_context(&ctx).unwrap();
    assert_eq!(provider.context_count(), 0);
    assert!(provider.find_type("Sample.Widget", &mut NoResolver).is_none());

    let err = provider
        .load_module(&ctx, &widget_module(), &mut NoResolver)
        .unwrap_err();
    assert!(matches!(err, ProviderError::ContextUnusable(_)));
}

#[test]
fn test_default_context_not_unloadable() {
    let mut provider = ManifestProvider::new();
    let ctx = provider.default_context();
    let err = provider.unload_context(&ctx).unwrap_err();
    assert!(matches!(err, ProviderError::ContextUnusable(_)));
}

// ===== Type Query Tests =====

#[test]
fn test_find_type_forms() {
    let mut provider = provider();
    load(&mut provider);

    let int = provider.find_type("int", &mut NoResolver).unwrap();
    assert_eq!(provider.full_name(&int), "System.Int32");
    assert_eq!(provider.type_kind(&int), TypeKind::Primitive(ManagedType::Int));

    let qualified = provider
        .find_type("Sample.Widget, Sample", &mut NoResolver)
        .unwrap();
    let plain = provider.find_type("Sample.Widget", &mut NoResolver).unwrap();
    assert_eq!(qualified, plain);

    let array = provider.find_type("Sample.Widget[]", &mut NoResolver).unwrap();
    assert_eq!(provider.type_kind(&array), TypeKind::Array);
    assert_eq!(provider.element_type(&array), Some(plain));

    assert!(provider.find_type("Sample.Nope", &mut NoResolver).is_none());
    assert!(provider.find_type("Sample.Widget, Elsewhere", &mut NoResolver).is_none());
}

#[test]
fn test_inheritance_and_assignability() {
    let mut provider = provider();
    let types = load(&mut provider);
    let base = named(&provider, &types, "Sample.Base");
    let widget = named(&provider, &types, "Sample.Widget");
    let object = provider.find_type("object", &mut NoResolver).unwrap();

    assert_eq!(provider.base_type(&widget), Some(base.clone()));
    assert_eq!(provider.base_type(&base), Some(object.clone()));
    assert!(provider.is_assignable_to(&widget, &base));
    assert!(!provider.is_assignable_to(&base, &widget));
    assert!(provider.is_assignable_to(&widget, &object));

    let widgets = provider.find_type("Sample.Widget[]", &mut NoResolver).unwrap();
    let bases = provider.find_type("Sample.Base[]", &mut NoResolver).unwrap();
    assert!(provider.is_assignable_to(&widgets, &bases));
}

#[test]
fn test_type_size() {
    let mut provider = provider();
    let types = load(&mut provider);
    let point = named(&provider, &types, "Sample.Point");
    assert_eq!(
        provider.type_size(&point).unwrap(),
        8 + std::mem::size_of::<usize>()
    );

    let double = provider.find_type("double", &mut NoResolver).unwrap();
    assert_eq!(provider.type_size(&double).unwrap(), 8);

    let widget = named(&provider, &types, "Sample.Widget");
    assert!(matches!(
        provider.type_size(&widget),
        Err(ProviderError::NotBlittable(_))
    ));
}

// ===== Member Tests =====

#[test]
fn test_member_info() {
    let mut provider = provider();
    let types = load(&mut provider);
    let widget = named(&provider, &types, "Sample.Widget");

    let methods = provider.methods(&widget);
    assert_eq!(methods.len(), 3);
    assert_eq!(provider.method_signature(&methods[0]), "Int32 Compute(Int32)");
    assert!(provider.is_static(MemberRef::Method(&methods[1])));
    assert_eq!(
        provider.method_signature(&methods[1]),
        "Sample.Widget Create()"
    );

    let ctors = provider.constructors(&widget);
    assert_eq!(ctors.len(), 2);
    assert_eq!(provider.member_name(MemberRef::Method(&ctors[1])), ".ctor");
    assert_eq!(provider.method_parameters(&ctors[1]).len(), 1);

    let fields = provider.fields(&widget);
    assert_eq!(
        provider.member_accessibility(MemberRef::Field(&fields[0])),
        Accessibility::Private
    );
    let scale_ty = provider.member_type(MemberRef::Field(&fields[1]));
    assert_eq!(provider.full_name(&scale_ty), "System.Double");
}

#[test]
fn test_attributes() {
    let mut provider = provider();
    let types = load(&mut provider);
    let widget = named(&provider, &types, "Sample.Widget");

    let attributes = provider.type_attributes(&widget).unwrap();
    assert_eq!(attributes.len(), 1);
    let attr_ty = provider.attribute_type(&attributes[0]);
    assert_eq!(provider.full_name(&attr_ty), "Sample.TagAttribute");

    let (field_ty, value) = provider.attribute_value(&attributes[0], "Name").unwrap();
    assert_eq!(provider.full_name(&field_ty), "System.Int32");
    assert_eq!(value, Value::I32(5));

    assert!(matches!(
        provider.attribute_value(&attributes[0], "Nope"),
        Err(ProviderError::MemberNotFound(_))
    ));
}

// ===== Object Tests =====

#[test]
fn test_construct_runs_defaults_and_native_ctor() {
    let mut provider = provider();
    let types = load(&mut provider);
    let widget = named(&provider, &types, "Sample.Widget");
    let ctors = provider.constructors(&widget);

    let plain = provider.construct(&widget, &ctors[0], vec![]).unwrap();
    let object = plain.downcast::<ManagedObject>().unwrap();
    assert_eq!(object.get("count").unwrap(), Value::I32(0));
    assert_eq!(object.get("scale").unwrap(), Value::F64(1.5));
    assert_eq!(object.get("id").unwrap(), Value::I64(7));

    let seeded = provider
        .construct(&widget, &ctors[1], vec![Value::I32(9)])
        .unwrap();
    let fields = provider.fields(&widget);
    assert_eq!(provider.get_field(&seeded, &fields[0]).unwrap(), Value::I32(9));
    assert_eq!(provider.object_type(&seeded).unwrap(), widget);
}

#[test]
fn test_construct_argument_checks() {
    let mut provider = provider();
    let types = load(&mut provider);
    let widget = named(&provider, &types, "Sample.Widget");
    let ctors = provider.constructors(&widget);

    assert!(matches!(
        provider.construct(&widget, &ctors[1], vec![Value::Bool(true)]),
        Err(ProviderError::TypeMismatch { .. })
    ));
    assert!(matches!(
        provider.construct(&widget, &ctors[1], vec![]),
        Err(ProviderError::InvocationFailed(_))
    ));
}

#[test]
fn test_invoke_methods() {
    let mut provider = provider();
    let types = load(&mut provider);
    let widget = named(&provider, &types, "Sample.Widget");
    let base = named(&provider, &types, "Sample.Base");
    let object = provider
        .construct(&widget, &provider.constructors(&widget)[0], vec![])
        .unwrap();

    let compute = &provider.methods(&widget)[0];
    assert_eq!(
        provider.invoke(compute, Some(&object), vec![Value::I32(21)]).unwrap(),
        Value::I32(42)
    );

    // Inherited method on a derived instance
    let describe = &provider.methods(&base)[0];
    assert_eq!(
        provider.invoke(describe, Some(&object), vec![]).unwrap(),
        Value::I32(7)
    );

    let missing = &provider.methods(&widget)[2];
    assert!(matches!(
        provider.invoke(missing, Some(&object), vec![]),
        Err(ProviderError::InvocationFailed(_))
    ));
    assert!(matches!(
        provider.invoke(compute, None, vec![Value::I32(1)]),
        Err(ProviderError::InvocationFailed(_))
    ));
}

#[test]
fn test_return_value_checked() {
    let mut provider = provider();
    let types = load(&mut provider);
    let widget = named(&provider, &types, "Sample.Widget");
    provider
        .natives()
        .register("Sample.Widget::Create", |_| Ok(Value::I32(1)));

    let create = &provider.methods(&widget)[1];
    assert!(matches!(
        provider.invoke(create, None, vec![]),
        Err(ProviderError::TypeMismatch { .. })
    ));
}

#[test]
fn test_fields_and_properties() {
    let mut provider = provider();
    let types = load(&mut provider);
    let widget = named(&provider, &types, "Sample.Widget");
    let object = provider
        .construct(&widget, &provider.constructors(&widget)[0], vec![])
        .unwrap();

    let fields = provider.fields(&widget);
    provider.set_field(&object, &fields[0], Value::I32(4)).unwrap();
    assert!(matches!(
        provider.set_field(&object, &fields[0], Value::F64(1.0)),
        Err(ProviderError::TypeMismatch { .. })
    ));

    let properties = provider.properties(&widget);
    assert_eq!(provider.get_property(&object, &properties[0]).unwrap(), Value::I32(4));
    provider
        .set_property(&object, &properties[0], Value::I32(6))
        .unwrap();
    assert_eq!(provider.get_property(&object, &properties[1]).unwrap(), Value::I32(12));
    assert!(matches!(
        provider.set_property(&object, &properties[1], Value::I32(1)),
        Err(ProviderError::MemberNotFound(_))
    ));
}

#[test]
fn test_internal_call_binding() {
    let mut provider = provider();
    let ctx = provider.create_context("Calls").unwrap();
    let module = provider
        .load_module(
            &ctx,
            &image(json!({
                "name": "Calls",
                "types": [{
                    "name": "Calls.Host",
                    "methods": [{ "name": "Add", "static": true, "params": ["int", "int"],
                                  "returns": "int", "native": "Host::Add" }]
                }]
            })),
            &mut NoResolver,
        )
        .unwrap();
    provider
        .register_internal_call(
            "Host::Add",
            std::sync::Arc::new(|args: &[Value], returns: Option<ManagedType>| {
                assert_eq!(returns, Some(ManagedType::Int));
                Ok(Value::I32(
                    args[0].as_i32().unwrap_or(0) + args[1].as_i32().unwrap_or(0),
                ))
            }),
        )
        .unwrap();

    let host = &provider.module_types(&module).unwrap()[0];
    let add = &provider.methods(host)[0];
    let sum = provider
        .invoke(add, None, vec![Value::I32(2), Value::I32(3)])
        .unwrap();
    assert_eq!(sum, Value::I32(5));
}
