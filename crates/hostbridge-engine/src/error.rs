//! Error and status types for the broker

use std::io;
use std::path::PathBuf;

use hostbridge_sdk::ProviderError;
use thiserror::Error;

use crate::cache::EntityId;
use crate::context::{ContextId, ModuleId};
use crate::marshal::MarshalError;
use crate::resolver::ResolveError;

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Outcome of the most recent module load, as reported to native callers
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStatus {
    /// The module was loaded and registered
    Success = 0,
    /// The path, module, or a referenced module is absent
    NotFound = 1,
    /// Generic load failure
    Failed = 2,
    /// The path was empty or unusable
    InvalidPath = 3,
    /// The module image is malformed
    InvalidModule = 4,
    /// The context entry exists but cannot be used
    CorruptContext = 5,
    /// An internal fault was caught at the boundary
    UnknownError = 6,
}

/// Errors produced by broker operations
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Empty or otherwise unusable module path
    #[error("Invalid module path: {0:?}")]
    InvalidPath(String),

    /// Module path does not exist on storage
    #[error("Module file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Reading the module image failed
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Module image exceeds the configured limit
    #[error("Module image too large: {size} bytes (limit {limit})")]
    ImageTooLarge {
        /// Image size in bytes
        size: u64,
        /// Configured maximum
        limit: u64,
    },

    /// Context name is empty
    #[error("Context name cannot be empty")]
    EmptyContextName,

    /// No context with this id
    #[error("Context not found: {0}")]
    ContextNotFound(ContextId),

    /// The derived context id is already taken
    #[error("Context name {name:?} maps to id {id}, which is already in use")]
    ContextExists {
        /// Requested name
        name: String,
        /// Derived id
        id: ContextId,
    },

    /// The default context cannot be unloaded
    #[error("Context {0} is not unloadable")]
    ContextNotUnloadable(ContextId),

    /// The derived module id is already taken
    #[error("Module {name:?} maps to id {id}, which is already loaded")]
    ModuleExists {
        /// Module name
        name: String,
        /// Derived id
        id: ModuleId,
    },

    /// No module with this id
    #[error("Module not found: {0}")]
    ModuleNotFound(ModuleId),

    /// An entity id did not resolve in its cache
    #[error("No {kind} with id {id}")]
    EntityNotFound {
        /// Entity kind
        kind: &'static str,
        /// Requested id
        id: EntityId,
    },

    /// No type with this name is visible
    #[error("Type not found: {0}")]
    TypeNotFound(String),

    /// An id cache ran out of positive ids
    #[error("The {0} cache is full")]
    CacheExhausted(&'static str),

    /// Instance handle was never issued or was already released
    #[error("Instance handle not found: {0}")]
    HandleNotFound(u64),

    /// Weak instance handle whose object has been collected
    #[error("Instance behind handle {0} has been collected")]
    TargetCollected(u64),

    /// Field or property lookup by name failed
    #[error("Type {type_name} has no {kind} named {name:?}")]
    MemberNotFound {
        /// Member kind
        kind: &'static str,
        /// Runtime type searched
        type_name: String,
        /// Requested name
        name: String,
    },

    /// Caller passed something the operation cannot use
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Overload resolution failed
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Buffer conversion failed
    #[error(transparent)]
    Marshal(#[from] MarshalError),

    /// The type-system provider reported a failure
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl BrokerError {
    /// Map this error onto the load-status taxonomy
    pub fn load_status(&self) -> LoadStatus {
        match self {
            BrokerError::InvalidPath(_) => LoadStatus::InvalidPath,
            BrokerError::FileNotFound(_) => LoadStatus::NotFound,
            BrokerError::ContextNotFound(_) => LoadStatus::CorruptContext,
            BrokerError::Provider(err) => match err {
                ProviderError::ModuleNotFound(_) => LoadStatus::NotFound,
                ProviderError::InvalidImage(_) => LoadStatus::InvalidModule,
                ProviderError::ContextUnusable(_) => LoadStatus::CorruptContext,
                _ => LoadStatus::Failed,
            },
            _ => LoadStatus::Failed,
        }
    }
}
