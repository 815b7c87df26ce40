//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.
//!
//! Every store is an explicitly constructed, injected object — there is no
//! ambient global state, so tests can spin up as many independent instances
//! as they like.

use std::sync::Arc;

use flashdeck_core::ports::{CardGenerationService, RateLimiter, SessionStore};
use flashdeck_core::repository::Repository;

use crate::config::Config;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Owner-scoping facade over the flashcard storage backend.
    pub repository: Repository,
    pub sessions: Arc<dyn SessionStore>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub generator: Arc<dyn CardGenerationService>,
}
