//! Roster Core - Data Types, Errors and Configuration
//!
//! Pure data structures shared by every other crate in the workspace:
//! - [`Row`] / [`RowSet`] and the scalar [`Value`] carried in them
//! - [`TableName`], a validated SQL identifier
//! - the error taxonomy used by store, cache, session and request paths
//! - [`RosterConfig`], assembled and validated once at startup

pub mod config;
pub mod error;
pub mod identifier;
pub mod row;

pub use config::{
    CacheConfig, DatabaseConfig, RosterConfig, ServerConfig, SessionBackend, SessionConfig,
    DEFAULT_SESSION_CAPACITY, DEFAULT_SESSION_LIFETIME, REQUIRED_VARS, SHARED_CACHE_KEY,
    SHARED_CACHE_TTL,
};
pub use error::{CacheError, CodecError, ConfigError, ServiceError, SessionError, StoreError};
pub use identifier::TableName;
pub use row::{Row, RowSet, Value};
