//! services/api/src/adapters/memory.rs
//!
//! The in-memory adapter: process-local keyed maps behind a `tokio` RwLock.
//! It exists as the zero-dependency terminal fallback for the storage
//! selector and as the substrate of the conformance suite, so it honors
//! every contract invariant (ordering, soft-delete filtering, recipient
//! policy) exactly like the persistent backends. State is lost on restart.
//!
//! No lock is ever held across an await point; every mutation completes
//! within one synchronous critical section.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use studypack_core::domain::{
    AccountRequest, Flashcard, FlashcardPatch, Message, MessageRead, NewAccountRequest,
    NewFlashcard, NewPack, NewUser, Pack, PackPatch, RequestStatus, Role, User, UserPatch,
    MESSAGE_RETENTION_DAYS,
};
use studypack_core::ports::{is_valid_recipient, PortError, PortResult, StorageService};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Store {
    users: HashMap<Uuid, User>,
    packs: HashMap<Uuid, Pack>,
    flashcards: HashMap<Uuid, Flashcard>,
    account_requests: HashMap<Uuid, AccountRequest>,
    messages: HashMap<Uuid, Message>,
    message_reads: Vec<MessageRead>,
}

/// An in-memory adapter that implements the `StorageService` port.
#[derive(Default)]
pub struct MemoryAdapter {
    store: RwLock<Store>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

fn name_conflict(first: &str, last: &str) -> PortError {
    PortError::Constraint(format!("User '{} {}' already exists", first, last))
}

#[async_trait]
impl StorageService for MemoryAdapter {
    async fn get_user(&self, id: Uuid) -> PortResult<Option<User>> {
        Ok(self.store.read().await.users.get(&id).cloned())
    }

    async fn get_all_users(&self) -> PortResult<Vec<User>> {
        let store = self.store.read().await;
        let mut users: Vec<User> = store.users.values().cloned().collect();
        users.sort_by(|a, b| {
            (a.last_name.as_str(), a.first_name.as_str())
                .cmp(&(b.last_name.as_str(), b.first_name.as_str()))
        });
        Ok(users)
    }

    async fn count_users(&self) -> PortResult<u64> {
        Ok(self.store.read().await.users.len() as u64)
    }

    async fn create_user(&self, new: NewUser) -> PortResult<User> {
        let mut store = self.store.write().await;
        if store
            .users
            .values()
            .any(|u| u.first_name == new.first_name && u.last_name == new.last_name)
        {
            return Err(name_conflict(&new.first_name, &new.last_name));
        }
        let user = User {
            id: Uuid::new_v4(),
            first_name: new.first_name,
            last_name: new.last_name,
            password_hash: new.password_hash,
            role: new.role,
            subject: new.subject,
        };
        store.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> PortResult<Option<User>> {
        let mut store = self.store.write().await;
        let Some(existing) = store.users.get(&id) else {
            return Ok(None);
        };
        let first_name = patch
            .first_name
            .unwrap_or_else(|| existing.first_name.clone());
        let last_name = patch.last_name.unwrap_or_else(|| existing.last_name.clone());
        if store
            .users
            .values()
            .any(|u| u.id != id && u.first_name == first_name && u.last_name == last_name)
        {
            return Err(name_conflict(&first_name, &last_name));
        }
        let Some(user) = store.users.get_mut(&id) else {
            return Ok(None);
        };
        user.first_name = first_name;
        user.last_name = last_name;
        if let Some(v) = patch.password_hash {
            user.password_hash = v;
        }
        if let Some(v) = patch.role {
            user.role = v;
        }
        if let Some(v) = patch.subject {
            user.subject = Some(v);
        }
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: Uuid) -> PortResult<()> {
        self.store.write().await.users.remove(&id);
        Ok(())
    }

    async fn get_pack(&self, id: Uuid) -> PortResult<Option<Pack>> {
        Ok(self.store.read().await.packs.get(&id).cloned())
    }

    async fn get_all_packs(&self) -> PortResult<Vec<Pack>> {
        let store = self.store.read().await;
        let mut packs: Vec<Pack> = store
            .packs
            .values()
            .filter(|p| p.deleted_at.is_none())
            .cloned()
            .collect();
        packs.sort_by_key(|p| p.order);
        Ok(packs)
    }

    async fn get_deleted_packs(&self) -> PortResult<Vec<Pack>> {
        let store = self.store.read().await;
        let mut packs: Vec<Pack> = store
            .packs
            .values()
            .filter(|p| p.deleted_at.is_some())
            .cloned()
            .collect();
        packs.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at));
        Ok(packs)
    }

    async fn create_pack(&self, new: NewPack) -> PortResult<Pack> {
        let pack = Pack {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            subject: new.subject,
            published: new.published,
            order: new.order,
            views: 0,
            created_by: new.created_by,
            deleted_at: None,
        };
        self.store.write().await.packs.insert(pack.id, pack.clone());
        Ok(pack)
    }

    async fn update_pack(&self, id: Uuid, patch: PackPatch) -> PortResult<Option<Pack>> {
        let mut store = self.store.write().await;
        let Some(pack) = store.packs.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(v) = patch.title {
            pack.title = v;
        }
        if let Some(v) = patch.description {
            pack.description = v;
        }
        if let Some(v) = patch.subject {
            pack.subject = v;
        }
        if let Some(v) = patch.published {
            pack.published = v;
        }
        if let Some(v) = patch.order {
            pack.order = v;
        }
        if let Some(v) = patch.views {
            pack.views = v;
        }
        Ok(Some(pack.clone()))
    }

    async fn increment_pack_views(&self, id: Uuid) -> PortResult<Option<Pack>> {
        let mut store = self.store.write().await;
        let Some(pack) = store.packs.get_mut(&id) else {
            return Ok(None);
        };
        pack.views += 1;
        Ok(Some(pack.clone()))
    }

    async fn soft_delete_pack(&self, id: Uuid) -> PortResult<()> {
        let mut store = self.store.write().await;
        if let Some(pack) = store.packs.get_mut(&id) {
            if pack.deleted_at.is_none() {
                pack.deleted_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn restore_pack(&self, id: Uuid) -> PortResult<()> {
        let mut store = self.store.write().await;
        if let Some(pack) = store.packs.get_mut(&id) {
            pack.deleted_at = None;
        }
        Ok(())
    }

    async fn permanently_delete_pack(&self, id: Uuid) -> PortResult<()> {
        // Single critical section: cards and pack disappear together.
        let mut store = self.store.write().await;
        store.flashcards.retain(|_, c| c.pack_id != id);
        store.packs.remove(&id);
        Ok(())
    }

    async fn get_flashcard(&self, id: Uuid) -> PortResult<Option<Flashcard>> {
        Ok(self.store.read().await.flashcards.get(&id).cloned())
    }

    async fn get_flashcards_by_pack(&self, pack_id: Uuid) -> PortResult<Vec<Flashcard>> {
        let store = self.store.read().await;
        let mut cards: Vec<Flashcard> = store
            .flashcards
            .values()
            .filter(|c| c.pack_id == pack_id)
            .cloned()
            .collect();
        cards.sort_by_key(|c| c.order);
        Ok(cards)
    }

    async fn create_flashcard(&self, new: NewFlashcard) -> PortResult<Flashcard> {
        let card = Flashcard {
            id: Uuid::new_v4(),
            pack_id: new.pack_id,
            question: new.question,
            answer: new.answer,
            order: new.order,
        };
        self.store
            .write()
            .await
            .flashcards
            .insert(card.id, card.clone());
        Ok(card)
    }

    async fn update_flashcard(
        &self,
        id: Uuid,
        patch: FlashcardPatch,
    ) -> PortResult<Option<Flashcard>> {
        let mut store = self.store.write().await;
        let Some(card) = store.flashcards.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(v) = patch.question {
            card.question = v;
        }
        if let Some(v) = patch.answer {
            card.answer = v;
        }
        if let Some(v) = patch.order {
            card.order = v;
        }
        Ok(Some(card.clone()))
    }

    async fn delete_flashcard(&self, id: Uuid) -> PortResult<()> {
        self.store.write().await.flashcards.remove(&id);
        Ok(())
    }

    async fn get_account_request(&self, id: Uuid) -> PortResult<Option<AccountRequest>> {
        Ok(self.store.read().await.account_requests.get(&id).cloned())
    }

    async fn get_all_account_requests(&self) -> PortResult<Vec<AccountRequest>> {
        let store = self.store.read().await;
        let mut requests: Vec<AccountRequest> =
            store.account_requests.values().cloned().collect();
        requests.sort_by(|a, b| {
            (a.last_name.as_str(), a.first_name.as_str())
                .cmp(&(b.last_name.as_str(), b.first_name.as_str()))
        });
        Ok(requests)
    }

    async fn create_account_request(&self, new: NewAccountRequest) -> PortResult<AccountRequest> {
        let request = AccountRequest {
            id: Uuid::new_v4(),
            first_name: new.first_name,
            last_name: new.last_name,
            password_hash: new.password_hash,
            requested_role: new.requested_role,
            status: RequestStatus::Pending,
        };
        self.store
            .write()
            .await
            .account_requests
            .insert(request.id, request.clone());
        Ok(request)
    }

    async fn approve_account_request(
        &self,
        id: Uuid,
        first_name: &str,
        last_name: &str,
        password_hash: &str,
        role: Role,
    ) -> PortResult<User> {
        let mut store = self.store.write().await;
        if !store.account_requests.contains_key(&id) {
            return Err(PortError::NotFound(format!(
                "Account request {} not found",
                id
            )));
        }
        // Checked before the request is consumed, so a name collision leaves
        // the request intact for a retry under a different name.
        if store
            .users
            .values()
            .any(|u| u.first_name == first_name && u.last_name == last_name)
        {
            return Err(name_conflict(first_name, last_name));
        }
        store.account_requests.remove(&id);
        let user = User {
            id: Uuid::new_v4(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            password_hash: password_hash.to_string(),
            role,
            subject: None,
        };
        store.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn reject_account_request(&self, id: Uuid) -> PortResult<()> {
        self.store.write().await.account_requests.remove(&id);
        Ok(())
    }

    async fn create_message(
        &self,
        from_user_id: Uuid,
        to_user_id: Uuid,
        content: &str,
    ) -> PortResult<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            from_user_id,
            to_user_id,
            content: content.to_string(),
            created_at: Utc::now(),
            read: false,
        };
        self.store
            .write()
            .await
            .messages
            .insert(message.id, message.clone());
        Ok(message)
    }

    async fn get_messages_between(&self, user_a: Uuid, user_b: Uuid) -> PortResult<Vec<Message>> {
        let store = self.store.read().await;
        let mut messages: Vec<Message> = store
            .messages
            .values()
            .filter(|m| {
                (m.from_user_id == user_a && m.to_user_id == user_b)
                    || (m.from_user_id == user_b && m.to_user_id == user_a)
            })
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn get_valid_message_recipients(
        &self,
        user_id: Uuid,
        role: Role,
    ) -> PortResult<Vec<User>> {
        let users = self.get_all_users().await?;
        Ok(users
            .into_iter()
            .filter(|u| is_valid_recipient(user_id, role, u))
            .collect())
    }

    async fn get_total_unread_count(&self, user_id: Uuid) -> PortResult<u64> {
        let store = self.store.read().await;
        Ok(store
            .messages
            .values()
            .filter(|m| m.to_user_id == user_id && !m.read)
            .count() as u64)
    }

    async fn mark_message_read(&self, id: Uuid) -> PortResult<()> {
        let mut store = self.store.write().await;
        let Some(message) = store.messages.get_mut(&id) else {
            return Ok(());
        };
        if message.read {
            return Ok(());
        }
        message.read = true;
        let receipt = MessageRead {
            message_id: id,
            user_id: message.to_user_id,
            read_at: Utc::now(),
        };
        store.message_reads.push(receipt);
        Ok(())
    }

    async fn mark_conversation_as_read(
        &self,
        user_id: Uuid,
        other_user_id: Uuid,
    ) -> PortResult<()> {
        let mut store = self.store.write().await;
        let read_at = Utc::now();
        let mut receipts = Vec::new();
        for message in store.messages.values_mut() {
            if message.to_user_id == user_id && message.from_user_id == other_user_id && !message.read
            {
                message.read = true;
                receipts.push(MessageRead {
                    message_id: message.id,
                    user_id,
                    read_at,
                });
            }
        }
        store.message_reads.extend(receipts);
        Ok(())
    }

    async fn delete_old_messages(&self) -> PortResult<u64> {
        let cutoff = Utc::now() - Duration::days(MESSAGE_RETENTION_DAYS);
        let mut store = self.store.write().await;
        let before = store.messages.len();
        store.messages.retain(|_, m| m.created_at >= cutoff);
        Ok((before - store.messages.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_at(age_days: i64) -> Message {
        Message {
            id: Uuid::new_v4(),
            from_user_id: Uuid::new_v4(),
            to_user_id: Uuid::new_v4(),
            content: "hello".to_string(),
            created_at: Utc::now() - Duration::days(age_days),
            read: false,
        }
    }

    #[tokio::test]
    async fn purge_respects_retention_boundary() {
        let adapter = MemoryAdapter::new();
        let old = message_at(8);
        let fresh = message_at(6);
        {
            let mut store = adapter.store.write().await;
            store.messages.insert(old.id, old.clone());
            store.messages.insert(fresh.id, fresh.clone());
        }

        let purged = adapter.delete_old_messages().await.unwrap();
        assert_eq!(purged, 1);

        let store = adapter.store.read().await;
        assert!(!store.messages.contains_key(&old.id));
        assert!(store.messages.contains_key(&fresh.id));
    }

    #[tokio::test]
    async fn purge_of_empty_store_removes_nothing() {
        let adapter = MemoryAdapter::new();
        assert_eq!(adapter.delete_old_messages().await.unwrap(), 0);
    }
}
