//! Liveness endpoint.
//!
//! `/status` touches neither the record store nor the cache, so it stays
//! green while either backend is down.

use axum::{http::StatusCode, response::IntoResponse};

/// GET /status - Simple liveness check
pub async fn status() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
