//! services/api/src/web/middleware.rs
//!
//! Session-cookie authentication for the protected router.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::web::state::AppState;

/// Pulls the session id out of a request's Cookie header, if present.
/// Shared with logout, which needs the id to revoke it.
pub fn session_cookie_value(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .find_map(|part| part.trim().strip_prefix("session="))
}

/// Resolves the session cookie to a user id through the store and hands it
/// to the handler via request extensions. Anything short of a live session
/// is a uniform 401; expired and unknown sessions are indistinguishable to
/// the caller.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let session_id = session_cookie_value(req.headers()).ok_or(StatusCode::UNAUTHORIZED)?;

    let user_id = state
        .store
        .validate_auth_session(session_id)
        .await
        .map_err(|e| {
            debug!("session rejected: {e}");
            StatusCode::UNAUTHORIZED
        })?;

    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}
