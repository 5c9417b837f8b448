//! HTTP Routes Module
//!
//! - `/` renders the cached row set with the session's visit count
//! - `/status` is a dependency-free liveness check
//!
//! Every request runs inside a tower-http trace span, and a panicking
//! handler is answered with the generic application error page.

pub mod health;
pub mod index;

use std::any::Any;

use axum::{
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::error::ApiError;
use crate::state::AppState;

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    ApiError::internal_error(format!("Handler panicked: {}", detail)).into_response()
}

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index::index))
        .route("/status", get(health::status))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
