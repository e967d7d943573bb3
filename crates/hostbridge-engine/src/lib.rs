//! Hostbridge engine - the native-to-managed interop broker
//!
//! The broker lets an unmanaged host load isolated code modules, enumerate
//! their types and members, construct instances, invoke methods and read
//! or write fields and properties, all through integer ids and opaque
//! handles. Reflection itself is delegated to a
//! [`TypeSystemProvider`](hostbridge_sdk::TypeSystemProvider).
//!
//! # Components
//!
//! - [`cache`]: identity-keyed id caches, one per entity kind
//! - [`context`]: load contexts, the global module index, last status
//! - [`resolver`]: overload resolution by name and semantic tags
//! - [`marshal`]: native buffer to typed value conversion and back
//! - [`handles`]: strong and weak instance handles
//! - [`broker`]: the [`Broker`] state object composing all of the above
//!
//! # Example
//!
//! ```ignore
//! use hostbridge_engine::{Broker, marshal::encode_arguments};
//! use hostbridge_sdk::Value;
//!
//! let mut broker = Broker::new(Box::new(provider));
//! let ctx = broker.create_context("Plugins")?;
//! broker.load_module(ctx, "Plugins/Sample.json")?;
//! let widget = broker.type_by_name("Sample.Widget")?;
//! let handle = broker.create_instance(widget, false, None, &[])?;
//! let (args, tags) = encode_arguments(&[Value::I32(21)])?;
//! let result = broker.invoke_instance_method(handle, "Compute", Some(&args), &tags)?;
//! assert_eq!(result.value, Value::I32(42));
//! ```

#![warn(missing_docs)]

pub mod broker;
pub mod cache;
pub mod context;
pub mod error;
pub mod handles;
pub mod marshal;
pub mod options;
pub mod resolver;

pub use broker::{Broker, MemberKind, TypedValue};
pub use cache::{EntityCaches, EntityId, IdCache};
pub use context::{ContextId, ContextManager, ModuleId, INVALID_ID};
pub use error::{BrokerError, BrokerResult, LoadStatus};
pub use handles::{HandleTable, InstanceHandle};
pub use options::{BrokerOptions, OptionsError};
pub use resolver::{MemberResolver, MethodKey, ResolveError};
