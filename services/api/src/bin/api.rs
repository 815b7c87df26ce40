//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, InMemoryRateLimiter, InMemorySessionStore, InMemoryStorage, OpenAiCardGenerator},
    config::{Config, StorageBackend},
    error::ApiError,
    web::{
        auth::{delete_account_handler, login_handler, logout_handler},
        middleware::require_auth,
        rest::{
            delete_set_handler, generate_handler, get_set_handler, list_sets_handler,
            randomized_handler, save_set_handler, ApiDoc,
        },
        state::AppState,
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;
use flashdeck_core::ports::{RateLimiter, SessionStore};
use flashdeck_core::repository::Repository;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Select and Initialize the Storage Backend ---
    let (repository, sessions, rate_limiter): (
        Repository,
        Arc<dyn SessionStore>,
        Arc<dyn RateLimiter>,
    ) = match config.storage_backend {
        StorageBackend::Memory => {
            info!("Using in-memory stores (single instance only)");
            (
                Repository::new(Arc::new(InMemoryStorage::new())),
                Arc::new(InMemorySessionStore::new()),
                Arc::new(InMemoryRateLimiter::new(config.default_generation_limit)),
            )
        }
        StorageBackend::Postgres => {
            let database_url = config
                .database_url
                .as_ref()
                .ok_or_else(|| ApiError::Internal("DATABASE_URL is required".to_string()))?;
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let db_adapter = Arc::new(DbAdapter::new(
                db_pool,
                config.default_generation_limit,
                config.session_cache_ttl,
                config.rate_limit_cache_ttl,
            ));
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            (
                Repository::new(db_adapter.clone()),
                db_adapter.clone(),
                db_adapter,
            )
        }
    };

    // --- 3. Initialize the Card Generator ---
    let openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    let openai_client = Client::with_config(openai_config);
    let generator = Arc::new(OpenAiCardGenerator::new(
        openai_client,
        config.generation_model.clone(),
    ));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        config: config.clone(),
        repository,
        sessions,
        rate_limiter: rate_limiter.clone(),
        generator,
    });

    // --- 5. Start the Out-of-band Rate-limit Cleanup ---
    // Deletes only records already outside every check's window, so it is
    // safe to run concurrently with normal operation.
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            ticker.tick().await;
            match rate_limiter.purge_expired(Utc::now()).await {
                Ok(removed) if removed > 0 => {
                    info!("Purged {} expired rate-limit attempts", removed);
                }
                Ok(_) => {}
                Err(e) => warn!("Rate-limit purge failed: {:?}", e),
            }
        }
    });

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .cors_origin
                .parse::<HeaderValue>()
                .map_err(|e| ApiError::Internal(format!("Invalid CORS_ORIGIN: {}", e)))?,
        )
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new().route("/auth/login", post(login_handler));

    // Protected routes (bearer auth required)
    let protected_routes = Router::new()
        .route("/auth/logout", post(logout_handler))
        .route("/auth/account", delete(delete_account_handler))
        .route("/flashcard-sets", get(list_sets_handler).post(save_set_handler))
        .route("/flashcard-sets/generate", post(generate_handler))
        .route(
            "/flashcard-sets/{id}",
            get(get_set_handler).delete(delete_set_handler),
        )
        .route("/flashcard-sets/{id}/randomized", get(randomized_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
