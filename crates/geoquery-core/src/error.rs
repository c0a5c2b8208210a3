//! Error types for geoquery

use std::fmt;
use thiserror::Error;

/// Why a backend could not express an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedReason {
    /// The backend has no spatial SQL at all (e.g. SQLite without SpatiaLite)
    NativeSpatialUnavailable,
    /// The backend cannot evaluate a DE-9IM intersection pattern
    De9imUnavailable,
    /// The backend cannot reproject geometries server-side
    TransformUnavailable,
    /// The predicate has no envelope-only approximation
    EnvelopeApproximationImpossible,
}

impl fmt::Display for UnsupportedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnsupportedReason::NativeSpatialUnavailable => "native spatial SQL is not available",
            UnsupportedReason::De9imUnavailable => "DE-9IM relate patterns are not supported",
            UnsupportedReason::TransformUnavailable => "coordinate transformation is not supported",
            UnsupportedReason::EnvelopeApproximationImpossible => {
                "no bounding-box approximation exists for this predicate"
            }
        };
        f.write_str(text)
    }
}

/// Coarse classification used by protocol layers to pick an error envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Validation,
    UnsupportedOperation,
    Limit,
    Configuration,
    Execution,
    Timeout,
}

#[derive(Debug, Error)]
pub enum GeoqueryError {
    // Request errors
    #[error("Parse error at {locator}: {message}")]
    Parse { message: String, locator: String },

    #[error("Validation error{}: {message}", .field.as_ref().map(|f| format!(" on '{}'", f)).unwrap_or_default())]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Unsupported operation {operation} on {backend}: {reason}")]
    UnsupportedOperation {
        operation: String,
        backend: String,
        reason: UnsupportedReason,
    },

    #[error("Invalid {parameter}: {reason}")]
    Limit { parameter: String, reason: String },

    // Configuration errors
    #[error("Missing required configuration: {key}")]
    ConfigMissing { key: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    // Execution errors
    #[error("Query execution failed: {0}")]
    Execution(String),

    #[error("Query exceeded its deadline of {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GeoqueryError {
    pub fn parse(message: impl Into<String>, locator: impl Into<String>) -> Self {
        Self::Parse { message: message.into(), locator: locator.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    pub fn field_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    pub fn unsupported(
        operation: impl Into<String>,
        backend: impl Into<String>,
        reason: UnsupportedReason,
    ) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
            backend: backend.into(),
            reason,
        }
    }

    pub fn limit(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Limit { parameter: parameter.into(), reason: reason.into() }
    }

    /// Classify the error for protocol mapping
    pub fn kind(&self) -> ErrorKind {
        match self {
            GeoqueryError::Parse { .. } => ErrorKind::Parse,
            GeoqueryError::Validation { .. } => ErrorKind::Validation,
            GeoqueryError::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            GeoqueryError::Limit { .. } => ErrorKind::Limit,
            GeoqueryError::ConfigMissing { .. } | GeoqueryError::ConfigInvalid { .. } => {
                ErrorKind::Configuration
            }
            GeoqueryError::Execution(_)
            | GeoqueryError::Io(_)
            | GeoqueryError::Serialization(_) => ErrorKind::Execution,
            GeoqueryError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// The unsupported reason, if this is an `UnsupportedOperation`
    pub fn unsupported_reason(&self) -> Option<UnsupportedReason> {
        match self {
            GeoqueryError::UnsupportedOperation { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GeoqueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_field() {
        let err = GeoqueryError::field_validation("geom", "geometry fields cannot be sorted");
        assert_eq!(err.to_string(), "Validation error on 'geom': geometry fields cannot be sorted");
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = GeoqueryError::validation("ring closure violated");
        assert_eq!(err.to_string(), "Validation error: ring closure violated");
    }

    #[test]
    fn test_unsupported_reason_is_exposed() {
        let err =
            GeoqueryError::unsupported("Relate", "mysql", UnsupportedReason::De9imUnavailable);
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
        assert_eq!(err.unsupported_reason(), Some(UnsupportedReason::De9imUnavailable));
        assert!(err.to_string().contains("mysql"));
    }
}
