//! Errors raised at the native boundary

use hostbridge_engine::BrokerError;
use thiserror::Error;

/// Result type for boundary operations
pub type BoundaryResult<T> = Result<T, BoundaryError>;

/// Failures detected before or around a broker call.
///
/// None of these ever reach native code; each operation turns them into its
/// sentinel return value after logging.
#[derive(Debug, Error)]
pub enum BoundaryError {
    /// `hostbridge_initialize` has not been called
    #[error("Broker is not initialized")]
    NotInitialized,

    /// A required pointer argument was null
    #[error("Null pointer passed for {0}")]
    NullPointer(&'static str),

    /// A string argument was not valid UTF-8
    #[error("Argument {0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    /// A numeric argument was out of range
    #[error("Invalid {name}: {value}")]
    InvalidValue {
        /// Argument name
        name: &'static str,
        /// Supplied value
        value: i64,
    },

    /// An internal call tried to call back into the broker
    #[error("Re-entrant call into the broker")]
    Reentrant,

    /// The broker reported a failure
    #[error(transparent)]
    Broker(#[from] BrokerError),
}
