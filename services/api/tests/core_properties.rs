//! services/api/tests/core_properties.rs
//!
//! End-to-end properties of the storage / repository / session subsystem,
//! exercised against the in-memory backends.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use api_lib::adapters::{InMemorySessionStore, InMemoryStorage};
use flashdeck_core::domain::{FlashcardSet, NewUser};
use flashdeck_core::ports::{FlashcardStorage, SessionStore};
use flashdeck_core::repository::Repository;

fn repo() -> (Repository, Arc<InMemoryStorage>) {
    let storage = Arc::new(InMemoryStorage::new());
    (Repository::new(storage.clone()), storage)
}

fn sample_set(user_id: Option<Uuid>, topic: &str) -> FlashcardSet {
    FlashcardSet::new(
        user_id,
        topic.to_string(),
        vec![("Q".to_string(), "A".to_string())],
    )
}

#[tokio::test]
async fn upsert_overwrites_in_place() {
    let (repo, _) = repo();
    let user = Uuid::new_v4();

    let mut set = sample_set(Some(user), "Rust");
    let id = set.id;
    repo.save(set.clone()).await.unwrap();

    set.topic = "Rust, revised".to_string();
    repo.save(set).await.unwrap();

    let found = repo.get_by_id(id).await.unwrap().unwrap();
    assert_eq!(found.topic, "Rust, revised");
    // No duplicate entries appear after a second save with the same id.
    assert_eq!(repo.get_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn owner_isolation_end_to_end() {
    // The example scenario: u1 creates s1; u2 can neither see nor delete it.
    let (repo, _) = repo();
    let u1 = Uuid::new_v4();
    let u2 = Uuid::new_v4();

    let s1 = repo
        .save_for(sample_set(None, "X"), u1)
        .await
        .unwrap()
        .unwrap();

    let u1_sets = repo.get_all_for(u1).await.unwrap();
    assert_eq!(u1_sets.len(), 1);
    assert_eq!(u1_sets[0].id, s1.id);
    assert!(repo.get_all_for(u2).await.unwrap().is_empty());
    assert!(repo.get_by_id_for(s1.id, u2).await.unwrap().is_none());

    // A foreign scoped delete is a no-op.
    repo.delete_for(s1.id, u2).await.unwrap();
    assert!(repo.get_by_id_for(s1.id, u1).await.unwrap().is_some());

    // The owner's delete removes it.
    repo.delete_for(s1.id, u1).await.unwrap();
    assert!(repo.get_by_id_for(s1.id, u1).await.unwrap().is_none());
}

#[tokio::test]
async fn scoped_save_cannot_capture_a_foreign_set() {
    let (repo, _) = repo();
    let owner = Uuid::new_v4();
    let attacker = Uuid::new_v4();

    let set = repo
        .save_for(sample_set(None, "Mine"), owner)
        .await
        .unwrap()
        .unwrap();

    let mut stolen = sample_set(None, "Stolen");
    stolen.id = set.id;
    assert!(repo.save_for(stolen, attacker).await.unwrap().is_none());

    let found = repo.get_by_id(set.id).await.unwrap().unwrap();
    assert_eq!(found.topic, "Mine");
    assert_eq!(found.user_id, Some(owner));
}

#[tokio::test]
async fn delete_is_idempotent_and_leaves_others_untouched() {
    let (repo, _) = repo();
    let keep = sample_set(None, "keep");
    let keep_id = keep.id;
    repo.save(keep).await.unwrap();

    let gone = sample_set(None, "gone");
    let gone_id = gone.id;
    repo.save(gone).await.unwrap();

    repo.delete(gone_id).await.unwrap();
    repo.delete(gone_id).await.unwrap();
    repo.delete(Uuid::new_v4()).await.unwrap();

    assert!(repo.get_by_id(keep_id).await.unwrap().is_some());
    assert!(repo.get_by_id(gone_id).await.unwrap().is_none());
}

#[tokio::test]
async fn listing_is_sorted_newest_first() {
    let (repo, _) = repo();
    let user = Uuid::new_v4();
    let now = Utc::now();

    let mut oldest = sample_set(Some(user), "oldest");
    oldest.created_at = now - Duration::days(2);
    let mut middle = sample_set(Some(user), "middle");
    middle.created_at = now - Duration::days(1);
    let mut newest = sample_set(Some(user), "newest");
    newest.created_at = now;

    // Insert out of order.
    repo.save(middle).await.unwrap();
    repo.save(newest).await.unwrap();
    repo.save(oldest).await.unwrap();

    let topics: Vec<String> = repo
        .get_all_for(user)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.topic)
        .collect();
    assert_eq!(topics, vec!["newest", "middle", "oldest"]);
}

#[tokio::test]
async fn shuffle_preserves_the_multiset_of_cards() {
    let (repo, _) = repo();
    let user = Uuid::new_v4();

    for size in [0usize, 1, 8] {
        let cards = (0..size)
            .map(|i| (format!("Q{}", i), format!("A{}", i)))
            .collect();
        let set = repo
            .save_for(FlashcardSet::new(None, format!("size-{}", size), cards), user)
            .await
            .unwrap()
            .unwrap();

        let mut expected: Vec<Uuid> = set.flashcards.iter().map(|c| c.id).collect();
        expected.sort();

        let mut shuffled: Vec<Uuid> = repo
            .get_randomized_for(set.id, user)
            .await
            .unwrap()
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        shuffled.sort();

        assert_eq!(shuffled, expected, "set of size {}", size);
    }

    // A foreign caller gets absence, not a shuffle.
    let set = repo
        .save_for(sample_set(None, "private"), user)
        .await
        .unwrap()
        .unwrap();
    assert!(repo
        .get_randomized_for(set.id, Uuid::new_v4())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn account_deletion_cascades_across_stores() {
    let storage = Arc::new(InMemoryStorage::new());
    let repo = Repository::new(storage.clone());
    let sessions = InMemorySessionStore::new();

    let user = sessions
        .create_user(NewUser {
            auth_id: "google-cascade".to_string(),
            email: None,
            name: None,
            picture: None,
        })
        .await
        .unwrap();
    let session = sessions.create_session(user.id).await.unwrap();
    repo.save_for(sample_set(None, "owned"), user.id)
        .await
        .unwrap()
        .unwrap();
    let anonymous = sample_set(None, "anonymous");
    let anonymous_id = anonymous.id;
    repo.save(anonymous).await.unwrap();

    // Flashcards first, then the user/session records.
    repo.delete_all_for_user(user.id).await.unwrap();
    sessions.delete_user_account(user.id).await.unwrap();

    assert!(repo.get_all_for(user.id).await.unwrap().is_empty());
    assert!(sessions.get_session(&session.token).await.unwrap().is_none());
    assert!(sessions.get_user_by_id(user.id).await.unwrap().is_none());
    assert!(sessions
        .get_user_by_auth_id("google-cascade")
        .await
        .unwrap()
        .is_none());
    // Anonymous sets are untouched.
    assert!(storage.get_by_id(anonymous_id).await.unwrap().is_some());
}
