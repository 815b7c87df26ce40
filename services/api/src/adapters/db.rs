//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `FlashcardStorage`, `SessionStore`, and `RateLimiter` ports from the
//! `core` crate. It handles all interactions with the PostgreSQL database using
//! `sqlx`, fronted by two small TTL caches: one for sessions (so authenticated
//! requests avoid a round trip) and one for per-user rate-limit decisions.
//!
//! Consistency relies on per-row atomicity; multi-row deletes (account
//! deletion, attempt purges) are at-least-once and may partially complete on
//! failure.

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use flashdeck_core::domain::{
    Flashcard, FlashcardSet, NewUser, RateLimitDecision, Session, User,
};
use flashdeck_core::ports::{
    FlashcardStorage, PortError, PortResult, RateLimiter, SessionStore, RATE_LIMIT_WINDOW_HOURS,
};

use super::cache::TtlCache;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the storage, session, and rate-limit ports.
pub struct DbAdapter {
    pool: PgPool,
    default_limit: u32,
    session_cache: TtlCache<String, Session>,
    decision_cache: TtlCache<Uuid, RateLimitDecision>,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(
        pool: PgPool,
        default_limit: u32,
        session_cache_ttl: StdDuration,
        decision_cache_ttl: StdDuration,
    ) -> Self {
        Self {
            pool,
            default_limit,
            session_cache: TtlCache::new(session_cache_ttl),
            decision_cache: TtlCache::new(decision_cache_ttl),
        }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    fn unexpected(e: sqlx::Error) -> PortError {
        PortError::Unexpected(e.to_string())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

/// The embedded-document form of a flashcard inside the set's JSONB column.
#[derive(Serialize, Deserialize)]
struct FlashcardDoc {
    id: Uuid,
    front: String,
    back: String,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct FlashcardSetRecord {
    id: Uuid,
    user_id: Option<Uuid>,
    topic: String,
    flashcards: Json<Vec<FlashcardDoc>>,
    created_at: DateTime<Utc>,
}

impl FlashcardSetRecord {
    fn to_domain(self) -> FlashcardSet {
        let set_id = self.id;
        FlashcardSet {
            id: self.id,
            user_id: self.user_id,
            topic: self.topic,
            flashcards: self
                .flashcards
                .0
                .into_iter()
                .map(|doc| Flashcard {
                    id: doc.id,
                    set_id,
                    front: doc.front,
                    back: doc.back,
                    created_at: doc.created_at,
                })
                .collect(),
            created_at: self.created_at,
        }
    }

    fn from_domain(set: &FlashcardSet) -> (Uuid, Option<Uuid>, String, Json<Vec<FlashcardDoc>>, DateTime<Utc>) {
        let docs = set
            .flashcards
            .iter()
            .map(|card| FlashcardDoc {
                id: card.id,
                front: card.front.clone(),
                back: card.back.clone(),
                created_at: card.created_at,
            })
            .collect();
        (set.id, set.user_id, set.topic.clone(), Json(docs), set.created_at)
    }
}

#[derive(FromRow)]
struct SessionRecord {
    token: String,
    user_id: Uuid,
    created_at: DateTime<Utc>,
    last_accessed_at: DateTime<Utc>,
}

impl SessionRecord {
    fn to_domain(self) -> Session {
        Session {
            token: self.token,
            user_id: self.user_id,
            created_at: self.created_at,
            last_accessed_at: self.last_accessed_at,
        }
    }
}

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    auth_id: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
    created_at: DateTime<Utc>,
}

impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            auth_id: self.auth_id,
            email: self.email,
            name: self.name,
            picture: self.picture,
            created_at: self.created_at,
        }
    }
}

//=========================================================================================
// `FlashcardStorage` Trait Implementation
//=========================================================================================

#[async_trait]
impl FlashcardStorage for DbAdapter {
    async fn save(&self, set: FlashcardSet) -> PortResult<()> {
        let (id, user_id, topic, flashcards, created_at) = FlashcardSetRecord::from_domain(&set);
        sqlx::query(
            "INSERT INTO flashcard_sets (id, user_id, topic, flashcards, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO UPDATE SET \
                 user_id = EXCLUDED.user_id, \
                 topic = EXCLUDED.topic, \
                 flashcards = EXCLUDED.flashcards, \
                 created_at = EXCLUDED.created_at",
        )
        .bind(id)
        .bind(user_id)
        .bind(topic)
        .bind(flashcards)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(Self::unexpected)?;
        Ok(())
    }

    async fn get_all(&self) -> PortResult<Vec<FlashcardSet>> {
        let records = sqlx::query_as::<_, FlashcardSetRecord>(
            "SELECT id, user_id, topic, flashcards, created_at FROM flashcard_sets",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Self::unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_by_id(&self, id: Uuid) -> PortResult<Option<FlashcardSet>> {
        let record = sqlx::query_as::<_, FlashcardSetRecord>(
            "SELECT id, user_id, topic, flashcards, created_at FROM flashcard_sets WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::unexpected)?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn delete(&self, id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM flashcard_sets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Self::unexpected)?;
        Ok(())
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM flashcard_sets WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Self::unexpected)?;
        Ok(())
    }
}

//=========================================================================================
// `SessionStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl SessionStore for DbAdapter {
    async fn create_session(&self, user_id: Uuid) -> PortResult<Session> {
        let session = Session::issue(user_id);
        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, last_accessed_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&session.token)
        .bind(session.user_id)
        .bind(session.created_at)
        .bind(session.last_accessed_at)
        .execute(&self.pool)
        .await
        .map_err(Self::unexpected)?;
        Ok(session)
    }

    async fn get_session(&self, token: &str) -> PortResult<Option<Session>> {
        if let Some(cached) = self.session_cache.get(&token.to_string()) {
            return Ok(Some(cached).filter(|s| !s.is_expired()));
        }

        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT token, user_id, created_at, last_accessed_at FROM sessions WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::unexpected)?;

        // Misses are never cached, so a late-created session is found as soon
        // as it exists.
        let session = record.map(|r| r.to_domain()).filter(|s| !s.is_expired());
        if let Some(session) = &session {
            self.session_cache.insert(session.token.clone(), session.clone());
        }
        Ok(session)
    }

    async fn invalidate_session(&self, token: &str) -> PortResult<()> {
        self.session_cache.remove(&token.to_string());
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(Self::unexpected)?;
        Ok(())
    }

    async fn update_session_access(&self, token: &str) -> PortResult<()> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "UPDATE sessions SET last_accessed_at = $2 WHERE token = $1 \
             RETURNING token, user_id, created_at, last_accessed_at",
        )
        .bind(token)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::unexpected)?;

        // Write-through: the cache never serves a stale last_accessed_at.
        match record {
            Some(record) => {
                let session = record.to_domain();
                self.session_cache.insert(session.token.clone(), session);
            }
            None => self.session_cache.remove(&token.to_string()),
        }
        Ok(())
    }

    async fn get_user_by_auth_id(&self, auth_id: &str) -> PortResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT u.id, u.auth_id, u.email, u.name, u.picture, u.created_at \
             FROM users u JOIN user_auth_ids m ON m.user_id = u.id \
             WHERE m.auth_id = $1",
        )
        .bind(auth_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::unexpected)?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, auth_id, email, name, picture, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::unexpected)?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let user = new_user.into_user();

        // The user record and its authId index entry land in one transaction:
        // no caller can observe one without the other.
        let mut tx = self.pool.begin().await.map_err(Self::unexpected)?;
        sqlx::query(
            "INSERT INTO users (id, auth_id, email, name, picture, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user.id)
        .bind(&user.auth_id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.picture)
        .bind(user.created_at)
        .execute(&mut *tx)
        .await
        .map_err(Self::unexpected)?;

        sqlx::query("INSERT INTO user_auth_ids (auth_id, user_id) VALUES ($1, $2)")
            .bind(&user.auth_id)
            .bind(user.id)
            .execute(&mut *tx)
            .await
            .map_err(Self::unexpected)?;
        tx.commit().await.map_err(Self::unexpected)?;

        Ok(user)
    }

    async fn delete_user_account(&self, user_id: Uuid) -> PortResult<()> {
        let Some(user) = self.get_user_by_id(user_id).await? else {
            return Ok(());
        };

        // Order matters: sessions, then the authId mapping, then the record.
        // At-least-once: a failure partway leaves a re-runnable remainder.
        self.session_cache.retain(|s| s.user_id != user_id);
        sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Self::unexpected)?;

        sqlx::query("DELETE FROM user_auth_ids WHERE auth_id = $1")
            .bind(&user.auth_id)
            .execute(&self.pool)
            .await
            .map_err(Self::unexpected)?;

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Self::unexpected)?;
        Ok(())
    }
}

//=========================================================================================
// `RateLimiter` Trait Implementation
//=========================================================================================

#[async_trait]
impl RateLimiter for DbAdapter {
    async fn set_user_limit(&self, user_id: Uuid, limit: u32) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO user_rate_limits (user_id, attempt_limit) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET attempt_limit = EXCLUDED.attempt_limit",
        )
        .bind(user_id)
        .bind(limit as i32)
        .execute(&self.pool)
        .await
        .map_err(Self::unexpected)?;
        self.decision_cache.remove(&user_id);
        Ok(())
    }

    async fn get_user_limit(&self, user_id: Uuid) -> PortResult<u32> {
        let limit = sqlx::query_scalar::<_, i32>(
            "SELECT attempt_limit FROM user_rate_limits WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::unexpected)?;
        Ok(limit.map_or(self.default_limit, |l| l as u32))
    }

    async fn check_rate_limit(&self, user_id: Uuid) -> PortResult<RateLimitDecision> {
        if let Some(cached) = self.decision_cache.get(&user_id) {
            return Ok(cached);
        }

        let limit = self.get_user_limit(user_id).await?;
        let window_start = Utc::now() - Duration::hours(RATE_LIMIT_WINDOW_HOURS);
        let timestamps = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT attempted_at FROM rate_limit_attempts \
             WHERE user_id = $1 AND attempted_at >= $2 \
             ORDER BY attempted_at ASC",
        )
        .bind(user_id)
        .bind(window_start)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::unexpected)?;

        let count = timestamps.len() as u32;
        let decision = if count > 0 && count >= limit {
            // timestamps are sorted ascending, so the first is the earliest.
            let earliest = timestamps[0];
            RateLimitDecision::Exceeded {
                try_again_at: earliest + Duration::hours(RATE_LIMIT_WINDOW_HOURS),
                count,
            }
        } else {
            RateLimitDecision::Allowed
        };
        self.decision_cache.insert(user_id, decision.clone());
        Ok(decision)
    }

    async fn record_attempt(&self, user_id: Uuid) -> PortResult<()> {
        let now = Utc::now();
        // The id is derived from user and millisecond timestamp, matching the
        // natural-uniqueness scheme of the attempt documents.
        let id = format!("{}_{}", user_id, now.timestamp_millis());
        sqlx::query(
            "INSERT INTO rate_limit_attempts (id, user_id, attempted_at) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(id)
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Self::unexpected)?;
        self.decision_cache.remove(&user_id);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> PortResult<u64> {
        let cutoff = now - Duration::hours(RATE_LIMIT_WINDOW_HOURS);
        let result = sqlx::query("DELETE FROM rate_limit_attempts WHERE attempted_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(Self::unexpected)?;
        Ok(result.rows_affected())
    }
}
