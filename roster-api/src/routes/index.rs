//! Listing page.

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    response::{Html, IntoResponse, Response},
};

use crate::error::{ApiError, ApiResult};
use crate::render::{render_page, PageContext};
use crate::state::AppState;

/// GET / - Count the visit, resolve the row set and render it.
///
/// A failed read still counts the visit and still hands out the session
/// cookie.
pub async fn index(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let identity = state.sessions.resolve(&headers);
    let visits = state.visits.increment_visit(&identity.id).await?;

    let mut response = match state.rows.resolve().await {
        Ok(resolution) => {
            tracing::debug!(
                source = ?resolution.source,
                rows = resolution.rows.len(),
                visits,
                "Rendering listing"
            );
            Html(render_page(&PageContext {
                rows: &resolution.rows,
                visits,
                hostname: &state.hostname,
                version: &state.version,
            }))
            .into_response()
        }
        Err(err) => ApiError::from(err).into_response(),
    };

    if identity.issued {
        let cookie = HeaderValue::from_str(&state.sessions.set_cookie(&identity.id))
            .map_err(|e| ApiError::internal_error(format!("Invalid session cookie: {}", e)))?;
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }

    Ok(response)
}
