//! Roster API - HTTP Layer for the Employee Listing Service
//!
//! Serves the cached employee row set as an HTML page with a per-session
//! visit counter, backed by PostgreSQL and a Redis-compatible cache.
//! Also provides the startup schema guard and tracing setup.

pub mod bootstrap;
pub mod db;
pub mod error;
pub mod render;
pub mod routes;
pub mod session;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use bootstrap::ensure_schema;
pub use db::PgRecordStore;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_router;
pub use session::{SessionIdentity, SessionSigner, SESSION_COOKIE};
pub use state::{build_session_store, AppState};
pub use telemetry::{init_tracing, TelemetryConfig};
