//! Error Types for the Roster API
//!
//! This module defines error handling for the HTTP layer:
//! - ApiError struct carrying a code and an internal message
//! - ErrorCode enum selecting the HTTP status and the public body
//! - IntoResponse implementation for Axum HTTP responses
//!
//! Bodies are fixed HTML fragments. The internal message is logged, never
//! sent to the client.

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use roster_core::{ConfigError, ServiceError, SessionError, StoreError};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for HTTP responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The record store could not be read
    DatabaseUnavailable,

    /// Anything else, including caught handler panics
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::DatabaseUnavailable | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get the HTML body sent for this error code.
    pub fn body(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseUnavailable => {
                "<h3>Database Connection Error</h3><p>Please try again later.</p>"
            }
            ErrorCode::InternalError => {
                "<h3>Application Error</h3><p>An unexpected error occurred.</p>"
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Error returned by handlers and by the startup path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// Error code selecting status and body
    pub code: ErrorCode,

    /// Internal message, logged only
    pub message: String,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    /// Create a DatabaseUnavailable error.
    pub fn database_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseUnavailable, message)
    }

    /// Create an InternalError.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(code = %self.code, message = %self.message, "Request failed");
        (self.status_code(), Html(self.code.body())).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::DatabaseUnavailable(store) => {
                ApiError::database_unavailable(store.to_string())
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::database_unavailable(err.to_string())
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        ApiError::internal_error(err.to_string())
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::internal_error(err.to_string())
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
