//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the flashcard REST endpoints and the master
//! definition for the OpenAPI specification.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use flashdeck_core::domain::{Flashcard, FlashcardSet, RateLimitDecision};
use flashdeck_core::ports::PortError;

use crate::web::auth;
use crate::web::state::AppState;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::login_handler,
        auth::logout_handler,
        auth::delete_account_handler,
        list_sets_handler,
        get_set_handler,
        save_set_handler,
        delete_set_handler,
        randomized_handler,
        generate_handler,
    ),
    components(
        schemas(
            auth::LoginRequest,
            auth::LoginResponse,
            auth::UserResponse,
            FlashcardSetResponse,
            FlashcardResponse,
            SaveFlashcardSetRequest,
            CardInput,
            GenerateRequest,
            RateLimitedResponse,
        )
    ),
    tags(
        (name = "Flashdeck API", description = "Flashcard storage, study, and generation endpoints.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct FlashcardResponse {
    pub id: Uuid,
    pub front: String,
    pub back: String,
}

#[derive(Serialize, ToSchema)]
pub struct FlashcardSetResponse {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub topic: String,
    pub flashcards: Vec<FlashcardResponse>,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, ToSchema)]
pub struct CardInput {
    pub front: String,
    pub back: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SaveFlashcardSetRequest {
    /// Omit to create a new set; supply to overwrite an existing one.
    pub id: Option<Uuid>,
    pub topic: String,
    pub flashcards: Vec<CardInput>,
}

#[derive(Deserialize, ToSchema)]
pub struct GenerateRequest {
    pub topic: String,
    /// Number of cards to generate (1-30, default 10).
    pub count: Option<u8>,
}

/// Body of a 429 response from the generation endpoint.
#[derive(Serialize, ToSchema)]
pub struct RateLimitedResponse {
    pub try_again_at: DateTime<Utc>,
    /// Attempts already inside the current window.
    pub count: u32,
}

impl FlashcardSetResponse {
    fn from_domain(set: FlashcardSet) -> Self {
        Self {
            id: set.id,
            user_id: set.user_id,
            topic: set.topic,
            flashcards: set.flashcards.into_iter().map(FlashcardResponse::from_domain).collect(),
            created_at: set.created_at,
        }
    }
}

impl FlashcardResponse {
    fn from_domain(card: Flashcard) -> Self {
        Self {
            id: card.id,
            front: card.front,
            back: card.back,
        }
    }
}

/// Translates a port failure into a 500; absence never takes this path.
fn internal(e: PortError) -> (StatusCode, String) {
    error!("Port operation failed: {:?}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// List the caller's flashcard sets, newest first.
#[utoipa::path(
    get,
    path = "/flashcard-sets",
    responses(
        (status = 200, description = "The caller's sets", body = [FlashcardSetResponse]),
        (status = 401, description = "Unauthenticated")
    )
)]
pub async fn list_sets_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let sets = state.repository.get_all_for(user_id).await.map_err(internal)?;
    let response: Vec<FlashcardSetResponse> =
        sets.into_iter().map(FlashcardSetResponse::from_domain).collect();
    Ok(Json(response))
}

/// Fetch one owned flashcard set.
#[utoipa::path(
    get,
    path = "/flashcard-sets/{id}",
    params(("id" = Uuid, Path, description = "The set id")),
    responses(
        (status = 200, description = "The set", body = FlashcardSetResponse),
        (status = 404, description = "Not found (or not owned by the caller)"),
        (status = 401, description = "Unauthenticated")
    )
)]
pub async fn get_set_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let set = state
        .repository
        .get_by_id_for(id, user_id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Flashcard set not found".to_string()))?;
    Ok(Json(FlashcardSetResponse::from_domain(set)))
}

/// Create or overwrite a flashcard set owned by the caller.
#[utoipa::path(
    post,
    path = "/flashcard-sets",
    request_body = SaveFlashcardSetRequest,
    responses(
        (status = 201, description = "Set saved", body = FlashcardSetResponse),
        (status = 404, description = "Supplied id exists but is not owned by the caller"),
        (status = 401, description = "Unauthenticated")
    )
)]
pub async fn save_set_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<SaveFlashcardSetRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let cards = req.flashcards.into_iter().map(|c| (c.front, c.back)).collect();
    let mut set = FlashcardSet::new(Some(user_id), req.topic, cards);
    if let Some(id) = req.id {
        // Upsert in place: keep the supplied id, rewire the embedded cards.
        set.id = id;
        for card in &mut set.flashcards {
            card.set_id = id;
        }
    }

    let saved = state
        .repository
        .save_for(set, user_id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Flashcard set not found".to_string()))?;
    Ok((StatusCode::CREATED, Json(FlashcardSetResponse::from_domain(saved))))
}

/// Delete one owned flashcard set. Deleting a missing set succeeds.
#[utoipa::path(
    delete,
    path = "/flashcard-sets/{id}",
    params(("id" = Uuid, Path, description = "The set id")),
    responses(
        (status = 204, description = "Deleted (or already absent)"),
        (status = 401, description = "Unauthenticated")
    )
)]
pub async fn delete_set_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state.repository.delete_for(id, user_id).await.map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Fetch an owned set's flashcards in shuffled order for a study run.
#[utoipa::path(
    get,
    path = "/flashcard-sets/{id}/randomized",
    params(("id" = Uuid, Path, description = "The set id")),
    responses(
        (status = 200, description = "Shuffled cards", body = [FlashcardResponse]),
        (status = 404, description = "Not found (or not owned by the caller)"),
        (status = 401, description = "Unauthenticated")
    )
)]
pub async fn randomized_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let cards = state
        .repository
        .get_randomized_for(id, user_id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Flashcard set not found".to_string()))?;
    let response: Vec<FlashcardResponse> =
        cards.into_iter().map(FlashcardResponse::from_domain).collect();
    Ok(Json(response))
}

/// Generate a flashcard set with the LLM, subject to the per-user rate limit.
///
/// The limit is checked before generation; the attempt is recorded only after
/// the generator succeeds, so failed generations don't consume quota.
#[utoipa::path(
    post,
    path = "/flashcard-sets/generate",
    request_body = GenerateRequest,
    responses(
        (status = 201, description = "Generated set saved", body = FlashcardSetResponse),
        (status = 429, description = "Rate limit exceeded", body = RateLimitedResponse),
        (status = 401, description = "Unauthenticated"),
        (status = 502, description = "Card generation failed")
    )
)]
pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<GenerateRequest>,
) -> Result<Response, (StatusCode, String)> {
    if req.topic.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "topic is required".to_string()));
    }
    let count = req.count.unwrap_or(10).clamp(1, 30);

    // 1. Check the sliding window before doing any work.
    match state.rate_limiter.check_rate_limit(user_id).await.map_err(internal)? {
        RateLimitDecision::Allowed => {}
        RateLimitDecision::Exceeded { try_again_at, count } => {
            warn!("Rate limit exceeded for user {}", user_id);
            let retry_after = (try_again_at - Utc::now()).num_seconds().max(0);
            let body = RateLimitedResponse { try_again_at, count };
            return Ok((
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after.to_string())],
                Json(body),
            )
                .into_response());
        }
    }

    // 2. Generate. Failures here are the upstream model's, not ours.
    let cards = state
        .generator
        .generate_cards(&req.topic, count)
        .await
        .map_err(|e| {
            error!("Card generation failed: {:?}", e);
            (StatusCode::BAD_GATEWAY, "Card generation failed".to_string())
        })?;

    // 3. Persist the set, then record the attempt — only a successful
    //    generation consumes quota.
    let cards = cards.into_iter().map(|c| (c.front, c.back)).collect();
    let set = FlashcardSet::new(Some(user_id), req.topic, cards);
    let saved = state
        .repository
        .save_for(set, user_id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "Failed to save set".to_string()))?;

    state.rate_limiter.record_attempt(user_id).await.map_err(internal)?;

    Ok((StatusCode::CREATED, Json(FlashcardSetResponse::from_domain(saved))).into_response())
}
