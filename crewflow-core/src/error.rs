//! Error types for the core domain

use thiserror::Error;

/// Core error type for domain operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Agent {agent_id} is at maximum capacity ({max_load})")]
    Overloaded { agent_id: String, max_load: u32 },

    #[error("Processing error: {message}")]
    Processing { message: String },

    #[error("Collaboration error: {message}")]
    Collaboration { message: String },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Agent {agent_id} is unavailable: {reason}")]
    Unavailable { agent_id: String, reason: String },

    #[error("Operation timeout: {operation} exceeded {timeout_seconds}s")]
    Timeout {
        operation: String,
        timeout_seconds: u64,
    },

    #[error("Model backend error ({kind:?}): {message}")]
    ModelBackend {
        kind: ModelBackendKind,
        message: String,
    },

    #[error("Registry error: {message}")]
    Registry { message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("UUID parsing error: {0}")]
    UuidParse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure kind reported by a model backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelBackendKind {
    /// Credentials rejected (401 and friends)
    Unauthorized,
    /// Could not reach the backend
    Connection,
    /// Anything else the backend reported
    Other,
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<uuid::Error> for Error {
    fn from(err: uuid::Error) -> Self {
        Error::UuidParse(err.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl Error {
    /// Create a validation error with a formatted message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an admission-rejection error for a fully loaded agent
    pub fn overloaded<S: Into<String>>(agent_id: S, max_load: u32) -> Self {
        Self::Overloaded {
            agent_id: agent_id.into(),
            max_load,
        }
    }

    /// Create a processing error
    pub fn processing<S: Into<String>>(message: S) -> Self {
        Self::Processing {
            message: message.into(),
        }
    }

    /// Create a collaboration error
    pub fn collaboration<S: Into<String>>(message: S) -> Self {
        Self::Collaboration {
            message: message.into(),
        }
    }

    /// Create a not found error for a specific entity type and ID
    pub fn not_found<S1: Into<String>, S2: Into<String>>(entity_type: S1, id: S2) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Create an unavailable-agent error
    pub fn unavailable<S1: Into<String>, S2: Into<String>>(agent_id: S1, reason: S2) -> Self {
        Self::Unavailable {
            agent_id: agent_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, timeout_seconds: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_seconds,
        }
    }

    /// Create a model backend error
    pub fn model_backend<S: Into<String>>(kind: ModelBackendKind, message: S) -> Self {
        Self::ModelBackend {
            kind,
            message: message.into(),
        }
    }

    /// Create a registry error
    pub fn registry<S: Into<String>>(message: S) -> Self {
        Self::Registry {
            message: message.into(),
        }
    }

    /// Check if this error is an admission rejection
    pub fn is_overloaded(&self) -> bool {
        matches!(self, Error::Overloaded { .. })
    }

    /// Check if this error is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Check if this error is recoverable (caller can retry elsewhere)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Overloaded { .. }
                | Error::Unavailable { .. }
                | Error::Timeout { .. }
                | Error::ModelBackend {
                    kind: ModelBackendKind::Connection,
                    ..
                }
        )
    }

    /// Get the error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "validation",
            Error::Overloaded { .. } => "overloaded",
            Error::Processing { .. } => "processing",
            Error::Collaboration { .. } => "collaboration",
            Error::NotFound { .. } => "not_found",
            Error::Unavailable { .. } => "unavailable",
            Error::Timeout { .. } => "timeout",
            Error::ModelBackend { .. } => "model_backend",
            Error::Registry { .. } => "registry",
            Error::Serialization(_) => "serialization",
            Error::UuidParse(_) => "uuid_parse",
            Error::Internal(_) => "internal",
        }
    }
}

/// Failure class used by the health-check manager to pick a cooldown policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Credentials rejected; probing again soon will not help
    Auth,
    /// Transport-level failure reaching the dependency
    Connection,
    /// Probe exceeded its deadline
    Timeout,
    /// Everything else
    Other,
}

impl FailureClass {
    /// Classify an error for health-check cooldown handling.
    ///
    /// Typed variants are matched first; wrapped errors fall back to
    /// message sniffing ("401", "unauthorized", "connection", "timeout")
    /// so that probe functions wrapping foreign errors still classify.
    pub fn classify(error: &Error) -> Self {
        match error {
            Error::Timeout { .. } => FailureClass::Timeout,
            Error::ModelBackend {
                kind: ModelBackendKind::Unauthorized,
                ..
            } => FailureClass::Auth,
            Error::ModelBackend {
                kind: ModelBackendKind::Connection,
                ..
            } => FailureClass::Connection,
            other => Self::sniff(&other.to_string()),
        }
    }

    fn sniff(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("401") || lower.contains("unauthorized") {
            FailureClass::Auth
        } else if lower.contains("timeout") {
            FailureClass::Timeout
        } else if lower.contains("connection") {
            FailureClass::Connection
        } else {
            FailureClass::Other
        }
    }

    /// Tag used in tracker statistics and log events
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::Auth => "auth_error",
            FailureClass::Connection => "connection_error",
            FailureClass::Timeout => "timeout",
            FailureClass::Other => "unknown",
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, Error>;
