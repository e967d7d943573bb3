//! Error types reported by type-system providers

/// Result type for provider calls
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Failures a type-system provider can report back to the broker
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// A referenced module could not be located
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    /// The module image is malformed or inconsistent
    #[error("Invalid module image: {0}")]
    InvalidImage(String),

    /// The module image was well formed but could not be loaded
    #[error("Module load failed: {0}")]
    LoadFailed(String),

    /// The context exists but can no longer accept work
    #[error("Context unusable: {0}")]
    ContextUnusable(String),

    /// A value did not have the type the member expects
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected type name
        expected: String,
        /// Actual type name
        got: String,
    },

    /// A member lookup failed
    #[error("Member not found: {0}")]
    MemberNotFound(String),

    /// A member body raised an error while running
    #[error("Invocation failed: {0}")]
    InvocationFailed(String),

    /// The type has no fixed native size
    #[error("Type is not blittable: {0}")]
    NotBlittable(String),

    /// A descriptor created by a different provider was passed in
    #[error("Foreign descriptor for {0}")]
    ForeignDescriptor(&'static str),

    /// The provider does not implement this capability
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl From<String> for ProviderError {
    fn from(s: String) -> Self {
        ProviderError::Other(s)
    }
}

impl From<&str> for ProviderError {
    fn from(s: &str) -> Self {
        ProviderError::Other(s.to_string())
    }
}
