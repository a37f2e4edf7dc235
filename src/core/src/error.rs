use thiserror::Error;

/// Image authorization error types
#[derive(Error, Debug)]
pub enum AuthzError {
    /// Malformed or absent structured body
    #[error("Parse error: {0}")]
    ParseError(String),

    /// No allow-listed registries or no trust server configured
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Resolved registry is not on the allow-list
    #[error("Registry {registry} is not authorized (allowed: {allowed})")]
    RegistryMismatch { registry: String, allowed: String },

    /// Trust verification exited unsuccessfully
    #[error("Trust verification failed: {0}")]
    VerificationFailure(String),

    /// Trust verification did not finish in time
    #[error("Trust verification timed out after {secs}s: {reference}")]
    VerificationTimeout { reference: String, secs: u64 },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AuthzError {
    fn from(err: serde_json::Error) -> Self {
        AuthzError::SerializationError(err.to_string())
    }
}

/// Result type alias for image authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let error = AuthzError::ParseError("missing Image field".to_string());
        assert_eq!(error.to_string(), "Parse error: missing Image field");
    }

    #[test]
    fn test_config_error_display() {
        let error = AuthzError::ConfigError("No authorized registries configured".to_string());
        assert_eq!(
            error.to_string(),
            "Configuration error: No authorized registries configured"
        );
    }

    #[test]
    fn test_registry_mismatch_display() {
        let error = AuthzError::RegistryMismatch {
            registry: "quay.io".to_string(),
            allowed: "docker.io, ghcr.io".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Registry quay.io is not authorized (allowed: docker.io, ghcr.io)"
        );
    }

    #[test]
    fn test_verification_failure_display() {
        let error = AuthzError::VerificationFailure("no trust data".to_string());
        assert_eq!(error.to_string(), "Trust verification failed: no trust data");
    }

    #[test]
    fn test_verification_timeout_display() {
        let error = AuthzError::VerificationTimeout {
            reference: "docker.io/library/nginx:latest".to_string(),
            secs: 30,
        };
        assert_eq!(
            error.to_string(),
            "Trust verification timed out after 30s: docker.io/library/nginx:latest"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: AuthzError = io_error.into();
        assert!(matches!(err, AuthzError::IoError(_)));
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope");
        let err: AuthzError = result.unwrap_err().into();
        assert!(matches!(err, AuthzError::SerializationError(_)));
    }

    #[test]
    fn test_other_error_display() {
        let error = AuthzError::Other("Unknown error occurred".to_string());
        assert_eq!(error.to_string(), "Unknown error occurred");
    }

    #[test]
    fn test_error_is_debug() {
        let error = AuthzError::ParseError("test".to_string());
        assert!(format!("{:?}", error).contains("ParseError"));
    }
}
