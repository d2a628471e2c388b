use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shipwatch error types
#[derive(Error, Debug)]
pub enum WatchError {
    /// Component configuration rejected at registration
    #[error("Configuration error: {component} - {message}")]
    Configuration { component: String, message: String },

    /// Registry credentials rejected
    #[error("Authentication error: {registry} - {message}")]
    Authentication { registry: String, message: String },

    /// Registry or host unreachable
    #[error("Network error: {target} - {message}")]
    Network { target: String, message: String },

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Unparseable tag, manifest or reference
    #[error("Parse error: {0}")]
    Parse(String),

    /// Registry answered with something unexpected
    #[error("Registry error: {registry} - {message}")]
    Registry { registry: String, message: String },

    /// Notification delivery failed
    #[error("Trigger error: {trigger} - {message}")]
    Trigger { trigger: String, message: String },

    /// No registry provider registered under that name
    #[error("Unsupported registry: {0}")]
    UnsupportedRegistry(String),

    /// Unknown component id
    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl WatchError {
    /// Shorthand for a configuration error scoped to one component.
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        WatchError::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a network error against `target`.
    pub fn network(target: impl Into<String>, message: impl ToString) -> Self {
        WatchError::Network {
            target: target.into(),
            message: message.to_string(),
        }
    }

    /// Classify this error for per-container reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WatchError::Configuration { .. } => ErrorKind::Configuration,
            WatchError::Authentication { .. } => ErrorKind::Authentication,
            WatchError::Network { .. } | WatchError::Timeout(_) => ErrorKind::Network,
            WatchError::Parse(_) | WatchError::Serialization(_) => ErrorKind::Parse,
            _ => ErrorKind::Other,
        }
    }
}

/// Coarse error category surfaced in container reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Configuration,
    Authentication,
    Network,
    Parse,
    Other,
}

impl From<serde_json::Error> for WatchError {
    fn from(err: serde_json::Error) -> Self {
        WatchError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for WatchError {
    fn from(err: serde_yaml::Error) -> Self {
        WatchError::Serialization(err.to_string())
    }
}

/// Result type alias for Shipwatch operations
pub type Result<T> = std::result::Result<T, WatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let error = WatchError::config("registry.ecr.private", "field region is required");
        assert_eq!(
            error.to_string(),
            "Configuration error: registry.ecr.private - field region is required"
        );
    }

    #[test]
    fn test_authentication_error_display() {
        let error = WatchError::Authentication {
            registry: "hub.public".to_string(),
            message: "401 Unauthorized".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Authentication error: hub.public - 401 Unauthorized"
        );
    }

    #[test]
    fn test_network_error_display() {
        let error = WatchError::network("https://registry-1.docker.io/v2", "connection refused");
        assert_eq!(
            error.to_string(),
            "Network error: https://registry-1.docker.io/v2 - connection refused"
        );
    }

    #[test]
    fn test_error_kind_classification() {
        assert_eq!(
            WatchError::config("x", "y").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            WatchError::Timeout("auth".to_string()).kind(),
            ErrorKind::Network
        );
        assert_eq!(
            WatchError::Parse("bad tag".to_string()).kind(),
            ErrorKind::Parse
        );
        assert_eq!(
            WatchError::Trigger {
                trigger: "t".to_string(),
                message: "m".to_string()
            }
            .kind(),
            ErrorKind::Other
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: WatchError = io_error.into();
        assert!(matches!(error, WatchError::Io(_)));
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let error: WatchError = result.unwrap_err().into();
        assert!(matches!(error, WatchError::Serialization(_)));
    }

    #[test]
    fn test_serde_yaml_error_conversion() {
        let result: std::result::Result<serde_yaml::Value, _> =
            serde_yaml::from_str("invalid: yaml: content:");
        let error: WatchError = result.unwrap_err().into();
        assert!(matches!(error, WatchError::Serialization(_)));
    }

    #[test]
    fn test_unsupported_registry_display() {
        let error = WatchError::UnsupportedRegistry("unknown".to_string());
        assert_eq!(error.to_string(), "Unsupported registry: unknown");
    }
}
