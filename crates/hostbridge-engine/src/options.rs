//! Broker configuration
//!
//! Options can be built in code or read from a TOML file:
//!
//! ```toml
//! default_context_name = "Default"
//! memoize_resolutions = true
//! max_image_bytes = 16777216
//! log_filter = "hostbridge=debug"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reading broker options
#[derive(Debug, Error)]
pub enum OptionsError {
    /// Failed to read the options file
    #[error("Failed to read options file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse options: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid options: {0}")]
    ValidationError(String),
}

/// Options for creating a [`Broker`](crate::Broker)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerOptions {
    /// Name of the context the host process starts with
    pub default_context_name: String,

    /// Memoize overload resolutions by method key
    pub memoize_resolutions: bool,

    /// Reject module images larger than this many bytes
    pub max_image_bytes: Option<u64>,

    /// Log filter directive used by the native boundary layer
    pub log_filter: String,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            default_context_name: "Default".to_string(),
            memoize_resolutions: true,
            max_image_bytes: None,
            log_filter: "warn".to_string(),
        }
    }
}

impl BrokerOptions {
    /// Load options from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, OptionsError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse options from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, OptionsError> {
        let options: BrokerOptions = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    /// Validate the options
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.default_context_name.trim().is_empty() {
            return Err(OptionsError::ValidationError(
                "default_context_name cannot be empty".to_string(),
            ));
        }
        if self.max_image_bytes == Some(0) {
            return Err(OptionsError::ValidationError(
                "max_image_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Options with the resolution memo disabled
    pub fn without_memo() -> Self {
        Self {
            memoize_resolutions: false,
            ..Default::default()
        }
    }

    /// Options with a module image size limit
    pub fn with_image_limit(max_image_bytes: u64) -> Self {
        Self {
            max_image_bytes: Some(max_image_bytes),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let options = BrokerOptions::default();
        assert_eq!(options.default_context_name, "Default");
        assert!(options.memoize_resolutions);
        assert_eq!(options.max_image_bytes, None);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let options = BrokerOptions::from_toml_str("max_image_bytes = 1024\n").unwrap();
        assert_eq!(options.max_image_bytes, Some(1024));
        assert_eq!(options.default_context_name, "Default");
        assert!(options.memoize_resolutions);
    }

    #[test]
    fn test_empty_context_name_rejected() {
        let err = BrokerOptions::from_toml_str("default_context_name = \"  \"\n").unwrap_err();
        assert!(matches!(err, OptionsError::ValidationError(_)));
    }

    #[test]
    fn test_parse_error() {
        let err = BrokerOptions::from_toml_str("memoize_resolutions = \"yes\"\n").unwrap_err();
        assert!(matches!(err, OptionsError::ParseError(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "memoize_resolutions = false").unwrap();
        writeln!(file, "log_filter = \"debug\"").unwrap();

        let options = BrokerOptions::from_file(file.path()).unwrap();
        assert!(!options.memoize_resolutions);
        assert_eq!(options.log_filter, "debug");
    }

    #[test]
    fn test_builders() {
        assert!(!BrokerOptions::without_memo().memoize_resolutions);
        assert_eq!(
            BrokerOptions::with_image_limit(64).max_image_bytes,
            Some(64)
        );
    }
}
