//! Conformance suite for the storage contract.
//!
//! Every property runs against all three backends; a consumer must not be
//! able to tell them apart. Each test gets a fresh store so listings are
//! never polluted by a sibling test.

use api_lib::adapters::{DocumentAdapter, MemoryAdapter, SqlAdapter};
use api_lib::storage::seed_bootstrap_admin;
use studypack_core::domain::{
    NewAccountRequest, NewFlashcard, NewPack, NewUser, PackPatch, Role, User, UserPatch,
};
use studypack_core::ports::{PortError, StorageService};
use tempfile::TempDir;
use uuid::Uuid;

//=========================================================================================
// Fixtures
//=========================================================================================

struct SqlFixture {
    _dir: TempDir,
    adapter: SqlAdapter,
}

async fn sql_store() -> SqlFixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("conformance.db").display()
    );
    let adapter = SqlAdapter::connect(&url).await.expect("connect sqlite");
    SqlFixture { _dir: dir, adapter }
}

struct DocFixture {
    _dir: TempDir,
    adapter: DocumentAdapter,
}

fn doc_store() -> DocFixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let adapter =
        DocumentAdapter::open(&dir.path().join("conformance.redb")).expect("open redb");
    DocFixture { _dir: dir, adapter }
}

async fn seed_user(
    store: &dyn StorageService,
    first: &str,
    last: &str,
    role: Role,
    subject: Option<&str>,
) -> User {
    store
        .create_user(NewUser {
            first_name: first.to_string(),
            last_name: last.to_string(),
            password_hash: "hash".to_string(),
            role,
            subject: subject.map(str::to_string),
        })
        .await
        .expect("create user")
}

async fn seed_pack(store: &dyn StorageService, owner: Uuid, title: &str, order: i32) -> Uuid {
    store
        .create_pack(NewPack {
            title: title.to_string(),
            description: format!("{} cards", title),
            subject: "Maths".to_string(),
            published: true,
            order,
            created_by: owner,
        })
        .await
        .expect("create pack")
        .id
}

//=========================================================================================
// Properties
//=========================================================================================

/// Active listings are ordered by `order` ascending and exclude anything
/// soft-deleted.
async fn check_pack_listing_ordering(store: &dyn StorageService) {
    let owner = seed_user(store, "Olive", "Owner", Role::Admin, None).await;
    let p2 = seed_pack(store, owner.id, "Two", 2).await;
    let p0 = seed_pack(store, owner.id, "Zero", 0).await;
    let p1 = seed_pack(store, owner.id, "One", 1).await;
    store.soft_delete_pack(p1).await.unwrap();

    let packs = store.get_all_packs().await.unwrap();
    let ids: Vec<Uuid> = packs.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![p0, p2]);
    for pair in packs.windows(2) {
        assert!(pair[0].order <= pair[1].order);
    }
    assert!(packs.iter().all(|p| p.deleted_at.is_none()));

    let deleted = store.get_deleted_packs().await.unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].id, p1);
    assert!(deleted[0].deleted_at.is_some());
}

/// Soft delete hides the pack; restore brings it back with identical fields.
async fn check_soft_delete_round_trip(store: &dyn StorageService) {
    let owner = seed_user(store, "Olive", "Owner", Role::Admin, None).await;
    let id = seed_pack(store, owner.id, "Geometry", 0).await;
    let before = store.get_pack(id).await.unwrap().unwrap();

    store.soft_delete_pack(id).await.unwrap();
    assert!(store.get_all_packs().await.unwrap().iter().all(|p| p.id != id));
    // Still addressable by id while soft-deleted.
    assert!(store.get_pack(id).await.unwrap().is_some());

    // Idempotent on repeat.
    store.soft_delete_pack(id).await.unwrap();

    store.restore_pack(id).await.unwrap();
    let after = store.get_pack(id).await.unwrap().unwrap();
    assert!(store.get_all_packs().await.unwrap().iter().any(|p| p.id == id));
    assert_eq!(after.title, before.title);
    assert_eq!(after.description, before.description);
    assert_eq!(after.subject, before.subject);
    assert_eq!(after.published, before.published);
    assert_eq!(after.order, before.order);
    assert_eq!(after.views, before.views);
    assert!(after.deleted_at.is_none());

    // Restoring an active pack is a no-op.
    store.restore_pack(id).await.unwrap();
    assert!(store.get_pack(id).await.unwrap().unwrap().deleted_at.is_none());
}

/// Permanent delete removes the pack and every flashcard with it.
async fn check_permanent_delete_cascades(store: &dyn StorageService) {
    let owner = seed_user(store, "Olive", "Owner", Role::Admin, None).await;
    let pack_id = seed_pack(store, owner.id, "History", 0).await;
    let other_pack = seed_pack(store, owner.id, "Untouched", 1).await;
    for i in 0..3 {
        store
            .create_flashcard(NewFlashcard {
                pack_id,
                question: format!("q{}", i),
                answer: format!("a{}", i),
                order: i,
            })
            .await
            .unwrap();
    }
    let survivor = store
        .create_flashcard(NewFlashcard {
            pack_id: other_pack,
            question: "stays".to_string(),
            answer: "yes".to_string(),
            order: 0,
        })
        .await
        .unwrap();

    store.permanently_delete_pack(pack_id).await.unwrap();

    assert!(store.get_pack(pack_id).await.unwrap().is_none());
    assert!(store
        .get_flashcards_by_pack(pack_id)
        .await
        .unwrap()
        .is_empty());
    // The cascade does not reach other packs.
    let kept = store.get_flashcards_by_pack(other_pack).await.unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].id, survivor.id);
}

/// A partial update only touches supplied fields.
async fn check_partial_update_preserves_fields(store: &dyn StorageService) {
    let owner = seed_user(store, "Olive", "Owner", Role::Admin, None).await;
    let pack = store
        .create_pack(NewPack {
            title: "Biology".to_string(),
            description: "cells".to_string(),
            subject: "Science".to_string(),
            published: false,
            order: 4,
            created_by: owner.id,
        })
        .await
        .unwrap();

    let updated = store
        .update_pack(
            pack.id,
            PackPatch {
                published: Some(true),
                ..PackPatch::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

    assert!(updated.published);
    assert_eq!(updated.title, "Biology");
    assert_eq!(updated.description, "cells");
    assert_eq!(updated.subject, "Science");
    assert_eq!(updated.order, 4);
    assert_eq!(updated.views, 0);

    // Updating a missing id is absence, not an error.
    assert!(store
        .update_pack(Uuid::new_v4(), PackPatch::default())
        .await
        .unwrap()
        .is_none());
}

/// The (first_name, last_name) pair is a natural key on every backend:
/// login resolves accounts by it, so duplicates must be rejected with a
/// constraint error everywhere, not just where the engine has an index.
async fn check_duplicate_user_names_rejected(store: &dyn StorageService) {
    let original = seed_user(store, "Dana", "Doe", Role::Teacher, Some("Maths")).await;

    let err = store
        .create_user(NewUser {
            first_name: "Dana".to_string(),
            last_name: "Doe".to_string(),
            password_hash: "other".to_string(),
            role: Role::Student,
            subject: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::Constraint(_)));

    // Renaming another user into the taken pair is rejected too.
    let other = seed_user(store, "Eli", "Ember", Role::Student, None).await;
    let err = store
        .update_user(
            other.id,
            UserPatch {
                first_name: Some("Dana".to_string()),
                last_name: Some("Doe".to_string()),
                ..UserPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::Constraint(_)));

    // Re-asserting a user's own name is not a collision.
    let unchanged = store
        .update_user(
            other.id,
            UserPatch {
                first_name: Some("Eli".to_string()),
                ..UserPatch::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.first_name, "Eli");
    assert_eq!(unchanged.last_name, "Ember");

    // Approving a request for a taken name fails and keeps the request.
    let request = store
        .create_account_request(NewAccountRequest {
            first_name: "Dana".to_string(),
            last_name: "Doe".to_string(),
            password_hash: "hash".to_string(),
            requested_role: Role::Student,
        })
        .await
        .unwrap();
    let err = store
        .approve_account_request(request.id, "Dana", "Doe", "hash", Role::Student)
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::Constraint(_)));
    assert!(store
        .get_account_request(request.id)
        .await
        .unwrap()
        .is_some());

    // The original account is untouched throughout.
    let kept = store.get_user(original.id).await.unwrap().unwrap();
    assert_eq!(kept.role, Role::Teacher);
}

/// View counting is a single storage operation and survives repetition.
async fn check_view_counter(store: &dyn StorageService) {
    let owner = seed_user(store, "Olive", "Owner", Role::Admin, None).await;
    let id = seed_pack(store, owner.id, "Counting", 0).await;

    let after_first = store
        .increment_pack_views(id)
        .await
        .unwrap()
        .expect("pack exists");
    assert_eq!(after_first.views, 1);
    store.increment_pack_views(id).await.unwrap();
    store.increment_pack_views(id).await.unwrap();

    let pack = store.get_pack(id).await.unwrap().unwrap();
    assert_eq!(pack.views, 3);

    // Counting a missing pack is absence, not an error.
    assert!(store
        .increment_pack_views(Uuid::new_v4())
        .await
        .unwrap()
        .is_none());
}

/// Non-admins may only message admins; admins may message everyone; nobody
/// messages themselves.
async fn check_recipient_policy(store: &dyn StorageService) {
    let admin_a = seed_user(store, "Ada", "Adminson", Role::Admin, None).await;
    let admin_b = seed_user(store, "Bea", "Bossley", Role::Admin, None).await;
    let teacher = seed_user(store, "Tam", "Teachwell", Role::Teacher, Some("Maths")).await;
    let student = seed_user(store, "Stu", "Dent", Role::Student, None).await;

    let ids = |users: Vec<User>| -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = users.into_iter().map(|u| u.id).collect();
        ids.sort();
        ids
    };

    let for_teacher = ids(store
        .get_valid_message_recipients(teacher.id, teacher.role)
        .await
        .unwrap());
    let mut admins = vec![admin_a.id, admin_b.id];
    admins.sort();
    assert_eq!(for_teacher, admins);

    let for_student = ids(store
        .get_valid_message_recipients(student.id, student.role)
        .await
        .unwrap());
    assert_eq!(for_student, admins);

    let for_admin = ids(store
        .get_valid_message_recipients(admin_a.id, admin_a.role)
        .await
        .unwrap());
    let mut everyone_else = vec![admin_b.id, teacher.id, student.id];
    everyone_else.sort();
    assert_eq!(for_admin, everyone_else);
}

/// Unread counts move in lockstep with message creation and
/// mark-conversation-read.
async fn check_unread_consistency(store: &dyn StorageService) {
    let a = seed_user(store, "Ada", "Adminson", Role::Admin, None).await;
    let b = seed_user(store, "Bea", "Bossley", Role::Admin, None).await;
    let c = seed_user(store, "Cal", "Chairman", Role::Admin, None).await;

    assert_eq!(store.get_total_unread_count(b.id).await.unwrap(), 0);

    store.create_message(a.id, b.id, "one").await.unwrap();
    assert_eq!(store.get_total_unread_count(b.id).await.unwrap(), 1);

    store.create_message(a.id, b.id, "two").await.unwrap();
    store.create_message(c.id, b.id, "three").await.unwrap();
    store.create_message(b.id, a.id, "reply").await.unwrap();
    assert_eq!(store.get_total_unread_count(b.id).await.unwrap(), 3);
    assert_eq!(store.get_total_unread_count(a.id).await.unwrap(), 1);

    store.mark_conversation_as_read(b.id, a.id).await.unwrap();
    // Only the a->b conversation's contribution disappears.
    assert_eq!(store.get_total_unread_count(b.id).await.unwrap(), 1);
    assert_eq!(store.get_total_unread_count(a.id).await.unwrap(), 1);

    let conversation = store.get_messages_between(a.id, b.id).await.unwrap();
    assert_eq!(conversation.len(), 3);
    assert!(conversation
        .windows(2)
        .all(|w| w[0].created_at <= w[1].created_at));
    assert!(conversation
        .iter()
        .filter(|m| m.to_user_id == b.id)
        .all(|m| m.read));

    // Single-message flip.
    let msg = store.create_message(c.id, a.id, "ping").await.unwrap();
    assert_eq!(store.get_total_unread_count(a.id).await.unwrap(), 2);
    store.mark_message_read(msg.id).await.unwrap();
    assert_eq!(store.get_total_unread_count(a.id).await.unwrap(), 1);
}

/// Approval consumes the request and creates the user; rejection just
/// deletes it; both are terminal.
async fn check_account_request_lifecycle(store: &dyn StorageService) {
    let request = store
        .create_account_request(NewAccountRequest {
            first_name: "New".to_string(),
            last_name: "Comer".to_string(),
            password_hash: "hash".to_string(),
            requested_role: Role::Teacher,
        })
        .await
        .unwrap();
    assert!(store
        .get_account_request(request.id)
        .await
        .unwrap()
        .is_some());

    let user = store
        .approve_account_request(
            request.id,
            &request.first_name,
            &request.last_name,
            &request.password_hash,
            request.requested_role,
        )
        .await
        .unwrap();
    assert_eq!(user.first_name, "New");
    assert_eq!(user.role, Role::Teacher);
    assert!(store.get_user(user.id).await.unwrap().is_some());
    assert!(store
        .get_account_request(request.id)
        .await
        .unwrap()
        .is_none());

    // Approving a consumed request fails.
    let err = store
        .approve_account_request(request.id, "New", "Comer", "hash", Role::Teacher)
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::NotFound(_)));

    // Rejection is an idempotent delete.
    let doomed = store
        .create_account_request(NewAccountRequest {
            first_name: "No".to_string(),
            last_name: "Luck".to_string(),
            password_hash: "hash".to_string(),
            requested_role: Role::Student,
        })
        .await
        .unwrap();
    store.reject_account_request(doomed.id).await.unwrap();
    assert!(store.get_account_request(doomed.id).await.unwrap().is_none());
    store.reject_account_request(doomed.id).await.unwrap();
}

/// Seeding is guarded by the zero-users check, never a flag.
async fn check_idempotent_seeding(store: &dyn StorageService) {
    let seeded = seed_bootstrap_admin(store, "admin123").await.unwrap();
    let admin = seeded.expect("empty store should be seeded");
    assert_eq!(admin.role, Role::Admin);
    assert_eq!(store.count_users().await.unwrap(), 1);

    // A second pass against a non-empty store creates nothing.
    assert!(seed_bootstrap_admin(store, "admin123")
        .await
        .unwrap()
        .is_none());
    assert_eq!(store.count_users().await.unwrap(), 1);
}

/// The end-to-end authoring flow: draft pack, add a card, publish, appears
/// in the public listing.
async fn check_publish_scenario(store: &dyn StorageService) {
    let teacher = seed_user(store, "Tam", "Teachwell", Role::Teacher, Some("Maths")).await;
    let pack = store
        .create_pack(NewPack {
            title: "Math".to_string(),
            description: String::new(),
            subject: "Maths".to_string(),
            published: false,
            order: 0,
            created_by: teacher.id,
        })
        .await
        .unwrap();
    assert_eq!(pack.views, 0);
    assert!(pack.deleted_at.is_none());

    store
        .create_flashcard(NewFlashcard {
            pack_id: pack.id,
            question: "2+2?".to_string(),
            answer: "4".to_string(),
            order: 0,
        })
        .await
        .unwrap();

    let cards = store.get_flashcards_by_pack(pack.id).await.unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].question, "2+2?");

    store
        .update_pack(
            pack.id,
            PackPatch {
                published: Some(true),
                ..PackPatch::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

    let listed = store.get_all_packs().await.unwrap();
    assert!(listed.iter().any(|p| p.id == pack.id && p.published));
}

/// Deleting missing entities never errors.
async fn check_idempotent_deletes(store: &dyn StorageService) {
    let ghost = Uuid::new_v4();
    store.delete_user(ghost).await.unwrap();
    store.delete_flashcard(ghost).await.unwrap();
    store.soft_delete_pack(ghost).await.unwrap();
    store.restore_pack(ghost).await.unwrap();
    store.permanently_delete_pack(ghost).await.unwrap();
    assert!(store.get_user(ghost).await.unwrap().is_none());
    assert!(store.get_pack(ghost).await.unwrap().is_none());
    assert!(store.get_flashcard(ghost).await.unwrap().is_none());
}

//=========================================================================================
// Per-backend Tests
//=========================================================================================

macro_rules! conformance_tests {
    ($($name:ident => $check:ident),+ $(,)?) => {
        mod memory {
            use super::*;
            $(
                #[tokio::test]
                async fn $name() {
                    $check(&MemoryAdapter::new()).await;
                }
            )+
        }

        mod sql {
            use super::*;
            $(
                #[tokio::test]
                async fn $name() {
                    let fixture = sql_store().await;
                    $check(&fixture.adapter).await;
                }
            )+
        }

        mod document {
            use super::*;
            $(
                #[tokio::test]
                async fn $name() {
                    let fixture = doc_store();
                    $check(&fixture.adapter).await;
                }
            )+
        }
    };
}

conformance_tests! {
    pack_listing_ordering => check_pack_listing_ordering,
    duplicate_user_names_rejected => check_duplicate_user_names_rejected,
    view_counter => check_view_counter,
    soft_delete_round_trip => check_soft_delete_round_trip,
    permanent_delete_cascades => check_permanent_delete_cascades,
    partial_update_preserves_fields => check_partial_update_preserves_fields,
    recipient_policy => check_recipient_policy,
    unread_consistency => check_unread_consistency,
    account_request_lifecycle => check_account_request_lifecycle,
    idempotent_seeding => check_idempotent_seeding,
    publish_scenario => check_publish_scenario,
    idempotent_deletes => check_idempotent_deletes,
}
