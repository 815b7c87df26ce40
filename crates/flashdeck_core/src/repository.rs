//! crates/flashdeck_core/src/repository.rs
//!
//! The repository facade: wraps a [`FlashcardStorage`] backend with
//! owner-scoping so route handlers never filter records themselves.
//!
//! Ownership mismatches are deliberately indistinguishable from absence —
//! a scoped read of another user's record returns `None`, and a scoped
//! delete of it is a no-op. The facade never mutates storage records
//! directly; everything round-trips through the storage contract.

use std::sync::Arc;

use rand::seq::SliceRandom;
use uuid::Uuid;

use crate::domain::{Flashcard, FlashcardSet};
use crate::ports::{FlashcardStorage, PortResult};

/// Owner-scoping facade over a flashcard storage backend.
#[derive(Clone)]
pub struct Repository {
    storage: Arc<dyn FlashcardStorage>,
}

impl Repository {
    pub fn new(storage: Arc<dyn FlashcardStorage>) -> Self {
        Self { storage }
    }

    //=====================================================================================
    // Owner-scoped operations (authenticated routes use these exclusively)
    //=====================================================================================

    /// Saves a set on behalf of `user_id`, stamping it as the owner.
    ///
    /// Returns `None` without writing when the id already exists but belongs
    /// to someone else, so a scoped save cannot capture a foreign record.
    pub async fn save_for(
        &self,
        mut set: FlashcardSet,
        user_id: Uuid,
    ) -> PortResult<Option<FlashcardSet>> {
        if let Some(existing) = self.storage.get_by_id(set.id).await? {
            if existing.user_id != Some(user_id) {
                return Ok(None);
            }
        }
        set.user_id = Some(user_id);
        self.storage.save(set.clone()).await?;
        Ok(Some(set))
    }

    /// Every set owned by `user_id`, newest first.
    pub async fn get_all_for(&self, user_id: Uuid) -> PortResult<Vec<FlashcardSet>> {
        let mut sets: Vec<FlashcardSet> = self
            .storage
            .get_all()
            .await?
            .into_iter()
            .filter(|s| s.user_id == Some(user_id))
            .collect();
        sets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sets)
    }

    /// The set, only if it exists and is owned by `user_id`.
    pub async fn get_by_id_for(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Option<FlashcardSet>> {
        let set = self.storage.get_by_id(id).await?;
        Ok(set.filter(|s| s.user_id == Some(user_id)))
    }

    /// Deletes the set only if it exists and is owned by `user_id`.
    pub async fn delete_for(&self, id: Uuid, user_id: Uuid) -> PortResult<()> {
        if self.get_by_id_for(id, user_id).await?.is_some() {
            self.storage.delete(id).await?;
        }
        Ok(())
    }

    /// The owned set's flashcards in uniformly shuffled order.
    pub async fn get_randomized_for(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Option<Vec<Flashcard>>> {
        Ok(self.get_by_id_for(id, user_id).await?.map(shuffled_cards))
    }

    /// Removes every set owned by `user_id` (account deletion).
    pub async fn delete_all_for_user(&self, user_id: Uuid) -> PortResult<()> {
        self.storage.delete_all_for_user(user_id).await
    }

    //=====================================================================================
    // Unscoped operations (anonymous/local use — straight delegation)
    //=====================================================================================

    pub async fn save(&self, set: FlashcardSet) -> PortResult<()> {
        self.storage.save(set).await
    }

    pub async fn get_all(&self) -> PortResult<Vec<FlashcardSet>> {
        self.storage.get_all().await
    }

    pub async fn get_by_id(&self, id: Uuid) -> PortResult<Option<FlashcardSet>> {
        self.storage.get_by_id(id).await
    }

    pub async fn delete(&self, id: Uuid) -> PortResult<()> {
        self.storage.delete(id).await
    }

    pub async fn get_randomized(&self, id: Uuid) -> PortResult<Option<Vec<Flashcard>>> {
        Ok(self.storage.get_by_id(id).await?.map(shuffled_cards))
    }
}

/// Fisher–Yates shuffle of the set's cards.
fn shuffled_cards(set: FlashcardSet) -> Vec<Flashcard> {
    let mut cards = set.flashcards;
    cards.shuffle(&mut rand::thread_rng());
    cards
}
