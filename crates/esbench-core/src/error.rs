//! Core error types.

use thiserror::Error;

/// Message fragments backends use to report a write against an existing key.
const DUPLICATE_PATTERNS: &[&str] = &[
    "already exists",
    "conflict",
    "unique constraint",
    "duplicate key",
];

/// Message fragment drivers use once the client has dropped its connection.
const CONNECTION_LOST_PATTERN: &str = "client is not connected";

/// Benchmark errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Aggregate indices are 1-based.
    #[error("aggregate index must be positive, got {0}")]
    InvalidIndex(i64),

    /// Sampling was requested from an empty aggregate set.
    #[error("aggregate set is empty")]
    EmptyAggregateSet,

    /// The target of a write already exists.
    #[error("{0}")]
    Duplicate(String),

    /// The backend client is not connected.
    #[error("client is not connected: {0}")]
    Disconnected(String),

    /// An operation lost its connection while being measured.
    #[error("operation `{operation}` lost its connection: {message}")]
    ConnectionLost { operation: String, message: String },

    /// A requested aggregate does not exist.
    #[error("aggregate not found: {category}/{id}")]
    NotFound { category: String, id: String },

    /// Backend driver error.
    #[error("backend error: {0}")]
    Backend(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Benchmark results failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// JSON encoding or decoding error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// True when the error reports a write against an already existing target.
    pub fn is_duplicate(&self) -> bool {
        match self {
            Error::Duplicate(_) => true,
            Error::Backend(message) => {
                let message = message.to_lowercase();
                DUPLICATE_PATTERNS.iter().any(|p| message.contains(p))
            }
            _ => false,
        }
    }

    /// True when the error reports a dropped client connection.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Error::Disconnected(_) | Error::ConnectionLost { .. } => true,
            other => other
                .to_string()
                .to_lowercase()
                .contains(CONNECTION_LOST_PATTERN),
        }
    }

    /// True for broken preconditions, which stop a run instead of being
    /// recorded against a single task.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Error::InvalidIndex(_) | Error::EmptyAggregateSet)
    }
}

/// Result alias for esbench operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_classification() {
        assert!(Error::Duplicate("row 1".into()).is_duplicate());
        assert!(Error::Backend("Aggregate Already Exists".into()).is_duplicate());
        assert!(Error::Backend("409 Conflict".into()).is_duplicate());
        assert!(Error::Backend("UNIQUE constraint failed: aggregates.id".into()).is_duplicate());
        assert!(!Error::Backend("disk full".into()).is_duplicate());
        assert!(!Error::EmptyAggregateSet.is_duplicate());
    }

    #[test]
    fn test_connection_lost_classification() {
        assert!(Error::Disconnected("pool closed".into()).is_connection_lost());
        assert!(Error::Backend("The Client Is Not Connected".into()).is_connection_lost());
        assert!(!Error::Backend("syntax error".into()).is_connection_lost());
    }

    #[test]
    fn test_precondition_classification() {
        assert!(Error::EmptyAggregateSet.is_precondition());
        assert!(Error::InvalidIndex(0).is_precondition());
        assert!(!Error::Backend("x".into()).is_precondition());
    }
}
