//! services/api/src/adapters/memory.rs
//!
//! In-process implementations of the storage, session-store, and rate-limiter
//! ports. Each adapter guards its collections with a single whole-store mutex:
//! records are small and operations are at worst O(n) on modest volumes, so
//! coarse locking is the intended granularity — do not shard it.
//!
//! These backends are single-instance only; the Postgres adapter in `db.rs`
//! is the cross-instance variant.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use flashdeck_core::domain::{FlashcardSet, NewUser, RateLimitDecision, Session, User};
use flashdeck_core::ports::{
    FlashcardStorage, PortError, PortResult, RateLimiter, SessionStore, RATE_LIMIT_WINDOW_HOURS,
};

fn poisoned() -> PortError {
    PortError::Unexpected("store mutex poisoned".to_string())
}

//=========================================================================================
// In-memory Flashcard Storage
//=========================================================================================

/// Flashcard sets in a mutex-guarded map, keyed by set id.
#[derive(Default)]
pub struct InMemoryStorage {
    sets: Mutex<HashMap<Uuid, FlashcardSet>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FlashcardStorage for InMemoryStorage {
    async fn save(&self, set: FlashcardSet) -> PortResult<()> {
        let mut sets = self.sets.lock().map_err(|_| poisoned())?;
        sets.insert(set.id, set);
        Ok(())
    }

    async fn get_all(&self) -> PortResult<Vec<FlashcardSet>> {
        let sets = self.sets.lock().map_err(|_| poisoned())?;
        Ok(sets.values().cloned().collect())
    }

    async fn get_by_id(&self, id: Uuid) -> PortResult<Option<FlashcardSet>> {
        let sets = self.sets.lock().map_err(|_| poisoned())?;
        Ok(sets.get(&id).cloned())
    }

    async fn delete(&self, id: Uuid) -> PortResult<()> {
        let mut sets = self.sets.lock().map_err(|_| poisoned())?;
        sets.remove(&id);
        Ok(())
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> PortResult<()> {
        let mut sets = self.sets.lock().map_err(|_| poisoned())?;
        sets.retain(|_, s| s.user_id != Some(user_id));
        Ok(())
    }
}

//=========================================================================================
// In-memory Session Store
//=========================================================================================

/// Sessions, users, and the authId→userId index, all behind one mutex so a
/// user record and its index entry are always observed together.
#[derive(Default)]
struct SessionStoreInner {
    sessions: HashMap<String, Session>,
    users: HashMap<Uuid, User>,
    auth_index: HashMap<String, Uuid>,
}

#[derive(Default)]
pub struct InMemorySessionStore {
    inner: Mutex<SessionStoreInner>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self, user_id: Uuid) -> PortResult<Session> {
        let session = Session::issue(user_id);
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        inner.sessions.insert(session.token.clone(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, token: &str) -> PortResult<Option<Session>> {
        let inner = self.inner.lock().map_err(|_| poisoned())?;
        let session = inner.sessions.get(token).cloned();
        // Expired sessions read as absent (expiry is currently disabled).
        Ok(session.filter(|s| !s.is_expired()))
    }

    async fn invalidate_session(&self, token: &str) -> PortResult<()> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        inner.sessions.remove(token);
        Ok(())
    }

    async fn update_session_access(&self, token: &str) -> PortResult<()> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        if let Some(session) = inner.sessions.get_mut(token) {
            session.last_accessed_at = Utc::now();
        }
        Ok(())
    }

    async fn get_user_by_auth_id(&self, auth_id: &str) -> PortResult<Option<User>> {
        let inner = self.inner.lock().map_err(|_| poisoned())?;
        let user = inner
            .auth_index
            .get(auth_id)
            .and_then(|user_id| inner.users.get(user_id))
            .cloned();
        Ok(user)
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<Option<User>> {
        let inner = self.inner.lock().map_err(|_| poisoned())?;
        Ok(inner.users.get(&user_id).cloned())
    }

    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let user = new_user.into_user();
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        inner.auth_index.insert(user.auth_id.clone(), user.id);
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn delete_user_account(&self, user_id: Uuid) -> PortResult<()> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        let Some(user) = inner.users.get(&user_id).cloned() else {
            return Ok(());
        };
        // Order matters: sessions, then the authId mapping, then the record.
        inner.sessions.retain(|_, s| s.user_id != user_id);
        inner.auth_index.remove(&user.auth_id);
        inner.users.remove(&user_id);
        Ok(())
    }
}

//=========================================================================================
// In-memory Rate Limiter
//=========================================================================================

#[derive(Default)]
struct RateLimiterInner {
    /// Per-user attempt timestamps, pruned lazily on each check.
    attempts: HashMap<Uuid, Vec<DateTime<Utc>>>,
    /// Per-user overrides of the default limit.
    limits: HashMap<Uuid, u32>,
}

/// Sliding 24-hour-window limiter over generation attempts.
///
/// Best effort: counts are exact within one process only. The Postgres
/// variant is the one that holds across instances.
pub struct InMemoryRateLimiter {
    default_limit: u32,
    inner: Mutex<RateLimiterInner>,
}

impl InMemoryRateLimiter {
    pub fn new(default_limit: u32) -> Self {
        Self {
            default_limit,
            inner: Mutex::new(RateLimiterInner::default()),
        }
    }

    /// Records an attempt at an explicit timestamp. Lets tests age attempts
    /// past the window without waiting for wall-clock time.
    pub fn record_attempt_at(&self, user_id: Uuid, at: DateTime<Utc>) -> PortResult<()> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        inner.attempts.entry(user_id).or_default().push(at);
        Ok(())
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn set_user_limit(&self, user_id: Uuid, limit: u32) -> PortResult<()> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        inner.limits.insert(user_id, limit);
        Ok(())
    }

    async fn get_user_limit(&self, user_id: Uuid) -> PortResult<u32> {
        let inner = self.inner.lock().map_err(|_| poisoned())?;
        Ok(inner.limits.get(&user_id).copied().unwrap_or(self.default_limit))
    }

    async fn check_rate_limit(&self, user_id: Uuid) -> PortResult<RateLimitDecision> {
        let window_start = Utc::now() - Duration::hours(RATE_LIMIT_WINDOW_HOURS);
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        let limit = inner.limits.get(&user_id).copied().unwrap_or(self.default_limit);

        let Some(timestamps) = inner.attempts.get_mut(&user_id) else {
            return Ok(RateLimitDecision::Allowed);
        };
        // Prune lazily while we hold the lock.
        timestamps.retain(|ts| *ts >= window_start);

        let count = timestamps.len() as u32;
        // With no attempts in the window the check always passes, even at
        // limit 0; the first recorded attempt is what flips a limit-0 user
        // to Exceeded.
        if count > 0 && count >= limit {
            let earliest = timestamps.iter().min().copied().unwrap_or(window_start);
            return Ok(RateLimitDecision::Exceeded {
                try_again_at: earliest + Duration::hours(RATE_LIMIT_WINDOW_HOURS),
                count,
            });
        }
        Ok(RateLimitDecision::Allowed)
    }

    async fn record_attempt(&self, user_id: Uuid) -> PortResult<()> {
        self.record_attempt_at(user_id, Utc::now())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> PortResult<u64> {
        let window_start = now - Duration::hours(RATE_LIMIT_WINDOW_HOURS);
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        let mut removed = 0u64;
        inner.attempts.retain(|_, timestamps| {
            let before = timestamps.len();
            timestamps.retain(|ts| *ts >= window_start);
            removed += (before - timestamps.len()) as u64;
            !timestamps.is_empty()
        });
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_round_trip_and_invalidation() {
        let store = InMemorySessionStore::new();
        let user_id = Uuid::new_v4();

        let session = store.create_session(user_id).await.unwrap();
        assert_eq!(session.token.len(), 64);
        assert!(session.token.chars().all(|c| c.is_ascii_hexdigit()));

        let found = store.get_session(&session.token).await.unwrap().unwrap();
        assert_eq!(found.user_id, user_id);

        store.invalidate_session(&session.token).await.unwrap();
        assert!(store.get_session(&session.token).await.unwrap().is_none());

        // Invalidating again is a no-op, not an error.
        store.invalidate_session(&session.token).await.unwrap();
    }

    #[tokio::test]
    async fn update_session_access_bumps_timestamp() {
        let store = InMemorySessionStore::new();
        let session = store.create_session(Uuid::new_v4()).await.unwrap();

        store.update_session_access(&session.token).await.unwrap();
        let found = store.get_session(&session.token).await.unwrap().unwrap();
        assert!(found.last_accessed_at >= session.last_accessed_at);
    }

    #[tokio::test]
    async fn user_lookup_via_auth_index() {
        let store = InMemorySessionStore::new();
        let user = store
            .create_user(NewUser {
                auth_id: "google-123".to_string(),
                email: Some("a@b.c".to_string()),
                name: None,
                picture: None,
            })
            .await
            .unwrap();

        let by_auth = store.get_user_by_auth_id("google-123").await.unwrap().unwrap();
        assert_eq!(by_auth.id, user.id);
        assert!(store.get_user_by_auth_id("apple-123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_user_account_cascades() {
        let store = InMemorySessionStore::new();
        let user = store
            .create_user(NewUser {
                auth_id: "google-xyz".to_string(),
                email: None,
                name: None,
                picture: None,
            })
            .await
            .unwrap();
        let s1 = store.create_session(user.id).await.unwrap();
        let s2 = store.create_session(user.id).await.unwrap();
        let other = store.create_session(Uuid::new_v4()).await.unwrap();

        store.delete_user_account(user.id).await.unwrap();

        assert!(store.get_session(&s1.token).await.unwrap().is_none());
        assert!(store.get_session(&s2.token).await.unwrap().is_none());
        assert!(store.get_user_by_id(user.id).await.unwrap().is_none());
        assert!(store.get_user_by_auth_id("google-xyz").await.unwrap().is_none());
        // Unrelated sessions survive.
        assert!(store.get_session(&other.token).await.unwrap().is_some());

        // Deleting an unknown user is a silent no-op.
        store.delete_user_account(Uuid::new_v4()).await.unwrap();
    }

    #[tokio::test]
    async fn limiter_allows_under_limit_and_blocks_at_limit() {
        let limiter = InMemoryRateLimiter::new(3);
        let user = Uuid::new_v4();

        assert_eq!(
            limiter.check_rate_limit(user).await.unwrap(),
            RateLimitDecision::Allowed
        );

        for _ in 0..3 {
            limiter.record_attempt(user).await.unwrap();
        }
        match limiter.check_rate_limit(user).await.unwrap() {
            RateLimitDecision::Exceeded { count, .. } => assert_eq!(count, 3),
            RateLimitDecision::Allowed => panic!("expected Exceeded at the limit"),
        }
    }

    #[tokio::test]
    async fn attempts_aged_past_the_window_free_the_user() {
        let limiter = InMemoryRateLimiter::new(2);
        let user = Uuid::new_v4();
        let stale = Utc::now() - Duration::hours(25);

        limiter.record_attempt_at(user, stale).unwrap();
        limiter.record_attempt_at(user, stale).unwrap();

        assert_eq!(
            limiter.check_rate_limit(user).await.unwrap(),
            RateLimitDecision::Allowed
        );
    }

    #[tokio::test]
    async fn try_again_at_is_earliest_attempt_plus_window() {
        let limiter = InMemoryRateLimiter::new(2);
        let user = Uuid::new_v4();
        let earliest = Utc::now() - Duration::hours(2);

        limiter.record_attempt_at(user, earliest).unwrap();
        limiter.record_attempt(user).await.unwrap();

        match limiter.check_rate_limit(user).await.unwrap() {
            RateLimitDecision::Exceeded { try_again_at, count } => {
                assert_eq!(count, 2);
                assert_eq!(try_again_at, earliest + Duration::hours(24));
            }
            RateLimitDecision::Allowed => panic!("expected Exceeded"),
        }
    }

    #[tokio::test]
    async fn limit_zero_passes_until_the_first_attempt() {
        let limiter = InMemoryRateLimiter::new(20);
        let user = Uuid::new_v4();
        limiter.set_user_limit(user, 0).await.unwrap();

        // No attempts yet: the check passes even at limit 0.
        assert_eq!(
            limiter.check_rate_limit(user).await.unwrap(),
            RateLimitDecision::Allowed
        );

        limiter.record_attempt(user).await.unwrap();
        assert!(matches!(
            limiter.check_rate_limit(user).await.unwrap(),
            RateLimitDecision::Exceeded { count: 1, .. }
        ));
    }

    #[tokio::test]
    async fn per_user_limit_overrides_default() {
        let limiter = InMemoryRateLimiter::new(20);
        let user = Uuid::new_v4();
        assert_eq!(limiter.get_user_limit(user).await.unwrap(), 20);

        limiter.set_user_limit(user, 5).await.unwrap();
        assert_eq!(limiter.get_user_limit(user).await.unwrap(), 5);
        // Other users keep the default.
        assert_eq!(limiter.get_user_limit(Uuid::new_v4()).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn purge_drops_only_out_of_window_attempts() {
        let limiter = InMemoryRateLimiter::new(20);
        let user = Uuid::new_v4();
        let now = Utc::now();

        limiter.record_attempt_at(user, now - Duration::hours(30)).unwrap();
        limiter.record_attempt_at(user, now - Duration::hours(1)).unwrap();

        let removed = limiter.purge_expired(now).await.unwrap();
        assert_eq!(removed, 1);

        match limiter.check_rate_limit(user).await.unwrap() {
            RateLimitDecision::Allowed => {}
            RateLimitDecision::Exceeded { .. } => panic!("one in-window attempt under limit 20"),
        }
    }
}
