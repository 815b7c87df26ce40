//! crates/flashdeck_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use uuid::Uuid;

/// A single flashcard, always embedded in the ordered list of its parent set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flashcard {
    pub id: Uuid,
    pub set_id: Uuid,
    pub front: String,
    pub back: String,
    pub created_at: DateTime<Utc>,
}

impl Flashcard {
    /// Creates a new flashcard belonging to the given set.
    pub fn new(set_id: Uuid, front: String, back: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            set_id,
            front,
            back,
            created_at: Utc::now(),
        }
    }
}

/// A named, ordered collection of flashcards.
///
/// `user_id` is `None` for anonymous sets. The id is generated on creation and
/// immutable; saving again with the same id overwrites the record in place.
#[derive(Debug, Clone)]
pub struct FlashcardSet {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub topic: String,
    pub flashcards: Vec<Flashcard>,
    pub created_at: DateTime<Utc>,
}

impl FlashcardSet {
    /// Creates a new set with a fresh id, wiring each card's `set_id`.
    pub fn new(user_id: Option<Uuid>, topic: String, cards: Vec<(String, String)>) -> Self {
        let id = Uuid::new_v4();
        let flashcards = cards
            .into_iter()
            .map(|(front, back)| Flashcard::new(id, front, back))
            .collect();
        Self {
            id,
            user_id,
            topic,
            flashcards,
            created_at: Utc::now(),
        }
    }
}

/// An authenticated bearer session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque bearer token: 64 lowercase hex characters.
    pub token: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl Session {
    /// Issues a new session with a freshly generated token.
    ///
    /// The token is 256 bits from the OS CSPRNG, hex-encoded. Collisions are
    /// treated as negligible: generate-and-trust, no uniqueness check.
    pub fn issue(user_id: Uuid) -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        let now = Utc::now();
        Self {
            token: hex::encode(bytes),
            user_id,
            created_at: now,
            last_accessed_at: now,
        }
    }

    /// Whether this session has expired.
    ///
    /// Sessions currently never expire by age. The check is kept at the lookup
    /// call sites so an expiry policy can be introduced without touching them.
    pub fn is_expired(&self) -> bool {
        false
    }
}

/// An account, keyed internally by `id` and externally by `auth_id`.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    /// The OAuth provider's stable subject id, namespaced by provider
    /// (e.g. `google-<sub>`). Exactly one user exists per distinct auth_id.
    pub auth_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The provider-verified identity used to create a [`User`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub auth_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

impl NewUser {
    pub fn into_user(self) -> User {
        User {
            id: Uuid::new_v4(),
            auth_id: self.auth_id,
            email: self.email,
            name: self.name,
            picture: self.picture,
            created_at: Utc::now(),
        }
    }
}

/// The outcome of a rate-limit check. Exceeding the limit is a normal return
/// value, not an error; callers translate it into a 429-style response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Exceeded {
        /// When the earliest in-window attempt falls out of the window.
        try_again_at: DateTime<Utc>,
        /// Number of attempts currently inside the window.
        count: u32,
    },
}

/// A front/back pair produced by the card generator, before it is given an
/// identity by being embedded in a [`FlashcardSet`].
#[derive(Debug, Clone)]
pub struct GeneratedCard {
    pub front: String,
    pub back: String,
}
