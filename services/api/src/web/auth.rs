//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: login (session issuance), logout, and account
//! deletion. The OAuth code exchange itself happens upstream; login receives
//! the already-verified provider identity.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use flashdeck_core::domain::NewUser;

use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Provider-namespaced subject id, e.g. `google-<sub>` or `apple-<sub>`.
    pub auth_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    /// Opaque bearer token for subsequent requests.
    pub token: String,
    pub user: UserResponse,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/login - Exchange a verified provider identity for a session
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = LoginResponse),
        (status = 400, description = "Invalid request"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.auth_id.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "auth_id is required".to_string()));
    }

    // 1. Find the user by authId, creating the account on first login.
    let existing = state
        .sessions
        .get_user_by_auth_id(&req.auth_id)
        .await
        .map_err(|e| {
            error!("Failed to look up user: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to log in".to_string())
        })?;

    let user = match existing {
        Some(user) => user,
        None => {
            info!("Creating account for new auth id");
            state
                .sessions
                .create_user(NewUser {
                    auth_id: req.auth_id.clone(),
                    email: req.email,
                    name: req.name,
                    picture: req.picture,
                })
                .await
                .map_err(|e| {
                    error!("Failed to create user: {:?}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create user".to_string())
                })?
        }
    };

    // 2. Issue the bearer session.
    let session = state.sessions.create_session(user.id).await.map_err(|e| {
        error!("Failed to create session: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session".to_string())
    })?;

    let response = LoginResponse {
        token: session.token,
        user: UserResponse {
            id: user.id,
            email: user.email,
            name: user.name,
            picture: user.picture,
        },
    };
    Ok((StatusCode::OK, Json(response)))
}

/// POST /auth/logout - Invalidate the presented session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Session invalidated"),
        (status = 401, description = "No valid session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // The middleware already validated the token; re-read it here to know
    // which session to drop.
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    state.sessions.invalidate_session(token).await.map_err(|e| {
        error!("Failed to invalidate session: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to log out".to_string())
    })?;

    Ok(StatusCode::OK)
}

/// DELETE /auth/account - Delete the account and everything it owns
#[utoipa::path(
    delete,
    path = "/auth/account",
    responses(
        (status = 204, description = "Account deleted"),
        (status = 401, description = "No valid session"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn delete_account_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // Flashcards go first, so a racing read cannot attribute orphaned sets
    // to a later re-created user.
    state.repository.delete_all_for_user(user_id).await.map_err(|e| {
        error!("Failed to delete user flashcards: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete account".to_string())
    })?;

    state.sessions.delete_user_account(user_id).await.map_err(|e| {
        error!("Failed to delete user account: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete account".to_string())
    })?;

    info!("Deleted account {}", user_id);
    Ok(StatusCode::NO_CONTENT)
}
