//! Native member bodies
//!
//! Manifest members name their bodies by symbol (e.g.
//! `Sample.Widget::Compute`). The host binds each symbol to a Rust closure
//! in a [`NativeRegistry`]. Binding happens at call time, so symbols may
//! be registered before or after the module that uses them is loaded.

use std::fmt;
use std::sync::Arc;

use hostbridge_sdk::{InternalCall, ManagedType, ProviderError, ProviderResult, Value};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::object::ManagedObject;

/// A native member body
pub type NativeFn = Arc<dyn Fn(&NativeCall<'_>) -> ProviderResult<Value> + Send + Sync>;

/// Everything a native body sees about the call
pub struct NativeCall<'a> {
    /// Symbol being invoked
    pub symbol: &'a str,
    /// Receiver for instance members and constructors
    pub this: Option<&'a ManagedObject>,
    /// Arguments in declaration order
    pub args: Vec<Value>,
    /// Declared return tag, `None` for `void`
    pub returns: Option<ManagedType>,
}

impl NativeCall<'_> {
    /// Argument at `index`
    pub fn arg(&self, index: usize) -> ProviderResult<&Value> {
        self.args.get(index).ok_or_else(|| {
            ProviderError::InvocationFailed(format!(
                "{}: missing argument {}",
                self.symbol, index
            ))
        })
    }

    /// Argument at `index` as `i32`
    pub fn arg_i32(&self, index: usize) -> ProviderResult<i32> {
        let value = self.arg(index)?;
        value.as_i32().ok_or_else(|| mismatch("Int32", value))
    }

    /// Argument at `index` as `i64`, widening any integer
    pub fn arg_i64(&self, index: usize) -> ProviderResult<i64> {
        let value = self.arg(index)?;
        value.as_i64().ok_or_else(|| mismatch("Int64", value))
    }

    /// Argument at `index` as `f64`, widening `f32`
    pub fn arg_f64(&self, index: usize) -> ProviderResult<f64> {
        let value = self.arg(index)?;
        value.as_f64().ok_or_else(|| mismatch("Double", value))
    }

    /// Argument at `index` as `bool`
    pub fn arg_bool(&self, index: usize) -> ProviderResult<bool> {
        let value = self.arg(index)?;
        value.as_bool().ok_or_else(|| mismatch("Boolean", value))
    }

    /// The receiver, failing for static calls
    pub fn this(&self) -> ProviderResult<&ManagedObject> {
        self.this.ok_or_else(|| {
            ProviderError::InvocationFailed(format!("{}: no receiver", self.symbol))
        })
    }

    /// Read a field of the receiver
    pub fn field(&self, name: &str) -> ProviderResult<Value> {
        self.this()?.get(name)
    }

    /// Write a field of the receiver
    pub fn set_field(&self, name: &str, value: Value) -> ProviderResult<()> {
        self.this()?.set(name, value)
    }
}

fn mismatch(expected: &str, got: &Value) -> ProviderError {
    ProviderError::TypeMismatch {
        expected: expected.to_string(),
        got: got.type_name().to_string(),
    }
}

/// Symbol table of native member bodies
#[derive(Default)]
pub struct NativeRegistry {
    functions: RwLock<FxHashMap<String, NativeFn>>,
}

impl NativeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `symbol` to `f`, replacing any previous binding
    pub fn register<F>(&self, symbol: &str, f: F)
    where
        F: Fn(&NativeCall<'_>) -> ProviderResult<Value> + Send + Sync + 'static,
    {
        self.functions.write().insert(symbol.to_string(), Arc::new(f));
    }

    /// Bind `symbol` to a host internal call
    pub fn register_internal(&self, symbol: &str, call: InternalCall) {
        self.register(symbol, move |native| call(&native.args, native.returns));
    }

    /// Look up the body bound to `symbol`
    pub fn get(&self, symbol: &str) -> Option<NativeFn> {
        self.functions.read().get(symbol).cloned()
    }

    /// Check if a symbol is bound
    pub fn contains(&self, symbol: &str) -> bool {
        self.functions.read().contains_key(symbol)
    }

    /// Call the body bound to `call.symbol`
    pub fn call(&self, call: &NativeCall<'_>) -> ProviderResult<Value> {
        let f = self.get(call.symbol).ok_or_else(|| {
            ProviderError::InvocationFailed(format!("Unbound native symbol: {}", call.symbol))
        })?;
        f(call)
    }

    /// Get the number of bound symbols
    pub fn len(&self) -> usize {
        self.functions.read().len()
    }

    /// Check if no symbols are bound
    pub fn is_empty(&self) -> bool {
        self.functions.read().is_empty()
    }
}

impl fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeRegistry")
            .field("count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(symbol: &str, args: Vec<Value>) -> NativeCall<'_> {
        NativeCall {
            symbol,
            this: None,
            args,
            returns: Some(ManagedType::Int),
        }
    }

    #[test]
    fn test_registry_register_and_call() {
        let registry = NativeRegistry::new();
        registry.register("math.double", |call| Ok(Value::I32(call.arg_i32(0)? * 2)));

        assert!(registry.contains("math.double"));
        assert!(!registry.contains("math.triple"));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.call(&call("math.double", vec![Value::I32(21)])).unwrap(),
            Value::I32(42)
        );
    }

    #[test]
    fn test_unbound_symbol() {
        let registry = NativeRegistry::new();
        let err = registry.call(&call("math.unknown", vec![])).unwrap_err();
        assert!(matches!(err, ProviderError::InvocationFailed(msg) if msg.contains("math.unknown")));
    }

    #[test]
    fn test_argument_errors() {
        let native = call("f", vec![Value::Bool(true)]);
        assert!(matches!(
            native.arg_i32(0),
            Err(ProviderError::TypeMismatch { .. })
        ));
        assert!(matches!(
            native.arg(3),
            Err(ProviderError::InvocationFailed(_))
        ));
        assert!(native.this().is_err());
    }

    #[test]
    fn test_internal_call_sees_return_tag() {
        let registry = NativeRegistry::new();
        let internal: InternalCall = Arc::new(|args: &[Value], returns: Option<ManagedType>| {
            assert_eq!(returns, Some(ManagedType::Int));
            Ok(Value::I32(args.len() as i32))
        });
        registry.register_internal("Host::Count", internal);

        let result = registry
            .call(&call("Host::Count", vec![Value::I8(1), Value::I8(2)]))
            .unwrap();
        assert_eq!(result, Value::I32(2));
    }
}
