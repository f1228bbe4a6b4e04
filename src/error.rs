//! Error types for the remote identity crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IdentityError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IdentityError {
    /// An operator pattern could not be compiled or applied.
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A setting has the wrong shape; only that key is skipped.
    #[error("Invalid setting '{key}': {reason}")]
    Configuration { key: String, reason: String },

    /// A deferred preference asked for metadata that was never provided.
    #[error("Missing metadata key: {0}")]
    MissingMetadata(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("YAML parsing error: {0}")]
    Yaml(String),
}

impl IdentityError {
    pub(crate) fn invalid_pattern(pattern: &str, reason: impl ToString) -> Self {
        IdentityError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn configuration(key: &str, reason: impl ToString) -> Self {
        IdentityError::Configuration {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<std::io::Error> for IdentityError {
    fn from(err: std::io::Error) -> Self {
        IdentityError::Io(err.to_string())
    }
}

impl From<serde_yaml::Error> for IdentityError {
    fn from(err: serde_yaml::Error) -> Self {
        IdentityError::Yaml(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_invalid_pattern_display() {
        let error = IdentityError::invalid_pattern("/a(/", "unclosed group");
        assert_eq!(error.to_string(), "Invalid pattern '/a(/': unclosed group");
        assert!(error.source().is_none());
    }

    #[test]
    fn test_configuration_display() {
        let error = IdentityError::configuration("Domain", "expected a string");
        assert_eq!(
            error.to_string(),
            "Invalid setting 'Domain': expected a string"
        );
    }

    #[test]
    fn test_missing_metadata_display() {
        let error = IdentityError::MissingMetadata("remoteUserName".to_string());
        assert_eq!(error.to_string(), "Missing metadata key: remoteUserName");
    }

    #[test]
    fn test_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: IdentityError = io_error.into();

        match error {
            IdentityError::Io(msg) => assert!(msg.contains("file not found")),
            _ => panic!("Expected Io variant"),
        }
    }

    #[test]
    fn test_from_yaml_error() {
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>("invalid: yaml: [").unwrap_err();
        let error: IdentityError = yaml_err.into();
        assert!(matches!(error, IdentityError::Yaml(_)));
    }

    #[test]
    fn test_error_equality_and_clone() {
        let error1 = IdentityError::configuration("Name", "bad");
        let error2 = error1.clone();
        assert_eq!(error1, error2);
        assert_ne!(error1, IdentityError::configuration("Mail", "bad"));
    }
}
