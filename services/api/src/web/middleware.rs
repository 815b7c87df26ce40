//! services/api/src/web/middleware.rs
//!
//! Bearer-token authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::error;

use crate::web::state::AppState;

/// Middleware that resolves the bearer token to a session and extracts the user_id.
///
/// If valid, inserts the user_id into request extensions for handlers to use
/// and bumps the session's last-accessed timestamp. If the token is missing
/// or unknown, returns 401 Unauthorized; a backing-store failure is a 500.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Extract the bearer token from the Authorization header.
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_string();

    // 2. Resolve the session. Absent (or, hypothetically, expired) means
    //    unauthenticated; only store failures become 500s.
    let session = state
        .sessions
        .get_session(&token)
        .await
        .map_err(|e| {
            error!("Failed to look up session: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // 3. Record the access.
    state.sessions.update_session_access(&token).await.map_err(|e| {
        error!("Failed to update session access time: {:?}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    // 4. Insert the user_id into request extensions.
    req.extensions_mut().insert(session.user_id);

    // 5. Continue to the handler.
    Ok(next.run(req).await)
}
