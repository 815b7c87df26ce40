//! crates/flashdeck_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    FlashcardSet, GeneratedCard, NewUser, RateLimitDecision, Session, User,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Key-value persistence for flashcard sets, keyed by set id.
///
/// Absence is always expressed as an `Option`, never as an error; `Err` is
/// reserved for backing-store failures (I/O, network), which propagate to the
/// caller untouched.
#[async_trait]
pub trait FlashcardStorage: Send + Sync {
    /// Unconditional upsert keyed by `set.id` (last write wins).
    async fn save(&self, set: FlashcardSet) -> PortResult<()>;

    /// Every record currently held, in unspecified stored order.
    /// Ordering and owner-filtering are the repository's job.
    async fn get_all(&self) -> PortResult<Vec<FlashcardSet>>;

    async fn get_by_id(&self, id: Uuid) -> PortResult<Option<FlashcardSet>>;

    /// Idempotent: a missing id is a no-op, not an error.
    async fn delete(&self, id: Uuid) -> PortResult<()>;

    /// Removes every set owned by `user_id`. Used only for account deletion;
    /// partial completion on failure is acceptable (at-least-once).
    async fn delete_all_for_user(&self, user_id: Uuid) -> PortResult<()>;
}

/// Token-based session issuance and user account records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, user_id: Uuid) -> PortResult<Session>;

    /// Looks up a session by token. An expired session is treated as absent
    /// (expiry is currently disabled, see [`Session::is_expired`]).
    async fn get_session(&self, token: &str) -> PortResult<Option<Session>>;

    /// Idempotent: an unknown token is a no-op.
    async fn invalidate_session(&self, token: &str) -> PortResult<()>;

    /// Bumps `last_accessed_at`. Called on every authenticated request.
    async fn update_session_access(&self, token: &str) -> PortResult<()>;

    async fn get_user_by_auth_id(&self, auth_id: &str) -> PortResult<Option<User>>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<Option<User>>;

    /// Creates the user record together with its authId→userId index entry.
    async fn create_user(&self, new_user: NewUser) -> PortResult<User>;

    /// Deletes, in order: all sessions owned by the user, the authId mapping,
    /// the user record. A silent no-op if the user does not exist. Owned
    /// flashcard sets are the caller's responsibility.
    async fn delete_user_account(&self, user_id: Uuid) -> PortResult<()>;
}

/// Length of the rolling rate-limit window.
pub const RATE_LIMIT_WINDOW_HOURS: i64 = 24;

/// Generation attempts allowed per user per window unless overridden.
pub const DEFAULT_GENERATION_LIMIT: u32 = 20;

/// Per-user sliding-window counter over generation attempts.
///
/// The limiter never records implicitly: callers run `check_rate_limit`
/// before generating and `record_attempt` only after a successful generation.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn set_user_limit(&self, user_id: Uuid, limit: u32) -> PortResult<()>;

    /// The user's ceiling for the rolling window (a configured override or
    /// the instance default).
    async fn get_user_limit(&self, user_id: Uuid) -> PortResult<u32>;

    async fn check_rate_limit(&self, user_id: Uuid) -> PortResult<RateLimitDecision>;

    async fn record_attempt(&self, user_id: Uuid) -> PortResult<()>;

    /// Drops attempt records older than the window. Safe to run concurrently
    /// with normal operation; meant for an out-of-band periodic task, never
    /// the request path.
    async fn purge_expired(&self, now: DateTime<Utc>) -> PortResult<u64>;
}

/// LLM-backed flashcard generation.
#[async_trait]
pub trait CardGenerationService: Send + Sync {
    /// Generates `count` front/back pairs for the given topic.
    async fn generate_cards(&self, topic: &str, count: u8) -> PortResult<Vec<GeneratedCard>>;
}
