//! Error types for Roster operations

use std::time::Duration;
use thiserror::Error;

/// Record store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store connection failed: {reason}")]
    Connection { reason: String },

    #[error("Store query failed: {reason}")]
    Query { reason: String },

    #[error("Store {operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },
}

impl StoreError {
    pub fn connection(reason: impl Into<String>) -> Self {
        Self::Connection {
            reason: reason.into(),
        }
    }

    pub fn query(reason: impl Into<String>) -> Self {
        Self::Query {
            reason: reason.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }
}

/// Cache backend errors.
///
/// Every variant means the cache could not be used for this call; callers
/// on the request path degrade to the store instead of failing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache protocol error: {reason}")]
    Protocol { reason: String },

    #[error("Cache server replied with error: {message}")]
    Server { message: String },

    #[error("Cache {operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },
}

impl CacheError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }
}

/// Row set payload encoding errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Failed to encode row set: {reason}")]
    Encode { reason: String },

    #[error("Failed to decode row set: {reason}")]
    Decode { reason: String },
}

/// Startup configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", names.join(", "))]
    MissingRequired { names: Vec<String> },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Session storage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session store unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Errors surfaced by the cache-aside read path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Database unavailable: {0}")]
    DatabaseUnavailable(#[from] StoreError),
}

// =============================================================================
// TESTS
// =============================================================================
