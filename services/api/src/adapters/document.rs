//! services/api/src/adapters/document.rs
//!
//! The document-store adapter: `StorageService` implemented atop `redb`,
//! with one JSON document per entity keyed by its UUID. The engine has no
//! schema; list queries scan and sort in memory. Multi-document operations
//! (pack cascade delete, mark-conversation-read) run inside a single write
//! transaction, and a mid-batch failure is surfaced with the number of
//! operations that had already been applied.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use studypack_core::domain::{
    AccountRequest, Flashcard, FlashcardPatch, Message, MessageRead, NewAccountRequest,
    NewFlashcard, NewPack, NewUser, Pack, PackPatch, RequestStatus, Role, User, UserPatch,
    MESSAGE_RETENTION_DAYS,
};
use studypack_core::ports::{is_valid_recipient, PortError, PortResult, StorageService};
use uuid::Uuid;

const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
const PACKS: TableDefinition<&str, &[u8]> = TableDefinition::new("packs");
const FLASHCARDS: TableDefinition<&str, &[u8]> = TableDefinition::new("flashcards");
const ACCOUNT_REQUESTS: TableDefinition<&str, &[u8]> = TableDefinition::new("account_requests");
const MESSAGES: TableDefinition<&str, &[u8]> = TableDefinition::new("messages");
const MESSAGE_READS: TableDefinition<&str, &[u8]> = TableDefinition::new("message_reads");

//=========================================================================================
// Document Shapes
//=========================================================================================

/// The stored pack document. `is_deleted` is kept redundantly alongside
/// `deleted_at` so the soft-delete filter never needs a "field is not null"
/// query against the engine.
#[derive(Serialize, Deserialize)]
struct PackDoc {
    #[serde(flatten)]
    pack: Pack,
    is_deleted: bool,
}

fn encode<T: Serialize>(value: &T) -> PortResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| PortError::Unexpected(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> PortResult<T> {
    serde_json::from_slice(bytes).map_err(|e| PortError::Unexpected(e.to_string()))
}

fn map_store_err<E: std::fmt::Display>(e: E) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn name_conflict(first: &str, last: &str) -> PortError {
    PortError::Constraint(format!("User '{} {}' already exists", first, last))
}

/// Scans the users table for another account holding the given name pair.
/// Runs against the caller's transaction so check and write are atomic.
fn name_taken(
    users: &impl ReadableTable<&'static str, &'static [u8]>,
    exclude: Option<Uuid>,
    first_name: &str,
    last_name: &str,
) -> PortResult<bool> {
    for entry in users.iter().map_err(map_store_err)? {
        let (_, value) = entry.map_err(map_store_err)?;
        let user: User = decode(value.value())?;
        if Some(user.id) != exclude && user.first_name == first_name && user.last_name == last_name
        {
            return Ok(true);
        }
    }
    Ok(false)
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A document-store adapter that implements the `StorageService` port.
#[derive(Clone)]
pub struct DocumentAdapter {
    db: Arc<Database>,
}

impl DocumentAdapter {
    /// Opens (or creates) the store file and ensures every table exists, so
    /// later read transactions never observe a missing table.
    pub fn open(path: &Path) -> PortResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(map_store_err)?;
            }
        }
        let db = Database::create(path).map_err(map_store_err)?;
        let txn = db.begin_write().map_err(map_store_err)?;
        {
            txn.open_table(USERS).map_err(map_store_err)?;
            txn.open_table(PACKS).map_err(map_store_err)?;
            txn.open_table(FLASHCARDS).map_err(map_store_err)?;
            txn.open_table(ACCOUNT_REQUESTS).map_err(map_store_err)?;
            txn.open_table(MESSAGES).map_err(map_store_err)?;
            txn.open_table(MESSAGE_READS).map_err(map_store_err)?;
        }
        txn.commit().map_err(map_store_err)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn read_doc<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        id: Uuid,
    ) -> PortResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_store_err)?;
        let table = txn.open_table(table).map_err(map_store_err)?;
        let guard = table.get(id.to_string().as_str()).map_err(map_store_err)?;
        guard.map(|g| decode(g.value())).transpose()
    }

    fn read_all<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
    ) -> PortResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_store_err)?;
        let table = txn.open_table(table).map_err(map_store_err)?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(map_store_err)? {
            let (_, value) = entry.map_err(map_store_err)?;
            out.push(decode(value.value())?);
        }
        Ok(out)
    }

    fn write_doc<T: Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        value: &T,
    ) -> PortResult<()> {
        let bytes = encode(value)?;
        let txn = self.db.begin_write().map_err(map_store_err)?;
        {
            let mut table = txn.open_table(table).map_err(map_store_err)?;
            table.insert(key, bytes.as_slice()).map_err(map_store_err)?;
        }
        txn.commit().map_err(map_store_err)?;
        Ok(())
    }

    fn remove_doc(&self, table: TableDefinition<&str, &[u8]>, id: Uuid) -> PortResult<()> {
        let txn = self.db.begin_write().map_err(map_store_err)?;
        {
            let mut table = txn.open_table(table).map_err(map_store_err)?;
            table.remove(id.to_string().as_str()).map_err(map_store_err)?;
        }
        txn.commit().map_err(map_store_err)?;
        Ok(())
    }

    fn read_pack_doc(&self, id: Uuid) -> PortResult<Option<PackDoc>> {
        self.read_doc(PACKS, id)
    }
}

//=========================================================================================
// `StorageService` Trait Implementation
//=========================================================================================

#[async_trait]
impl StorageService for DocumentAdapter {
    async fn get_user(&self, id: Uuid) -> PortResult<Option<User>> {
        self.read_doc(USERS, id)
    }

    async fn get_all_users(&self) -> PortResult<Vec<User>> {
        let mut users: Vec<User> = self.read_all(USERS)?;
        users.sort_by(|a, b| {
            (a.last_name.as_str(), a.first_name.as_str())
                .cmp(&(b.last_name.as_str(), b.first_name.as_str()))
        });
        Ok(users)
    }

    async fn count_users(&self) -> PortResult<u64> {
        let users: Vec<User> = self.read_all(USERS)?;
        Ok(users.len() as u64)
    }

    async fn create_user(&self, new: NewUser) -> PortResult<User> {
        let user = User {
            id: Uuid::new_v4(),
            first_name: new.first_name,
            last_name: new.last_name,
            password_hash: new.password_hash,
            role: new.role,
            subject: new.subject,
        };
        let bytes = encode(&user)?;
        // Uniqueness check and insert share one write transaction so no
        // other writer can slip a duplicate in between.
        let txn = self.db.begin_write().map_err(map_store_err)?;
        {
            let mut users = txn.open_table(USERS).map_err(map_store_err)?;
            if name_taken(&users, None, &user.first_name, &user.last_name)? {
                return Err(name_conflict(&user.first_name, &user.last_name));
            }
            users
                .insert(user.id.to_string().as_str(), bytes.as_slice())
                .map_err(map_store_err)?;
        }
        txn.commit().map_err(map_store_err)?;
        Ok(user)
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> PortResult<Option<User>> {
        let key = id.to_string();
        let user;
        let txn = self.db.begin_write().map_err(map_store_err)?;
        {
            let mut users = txn.open_table(USERS).map_err(map_store_err)?;
            let mut updated = match users.get(key.as_str()).map_err(map_store_err)? {
                Some(guard) => decode::<User>(guard.value())?,
                None => return Ok(None),
            };
            if let Some(v) = patch.first_name {
                updated.first_name = v;
            }
            if let Some(v) = patch.last_name {
                updated.last_name = v;
            }
            if let Some(v) = patch.password_hash {
                updated.password_hash = v;
            }
            if let Some(v) = patch.role {
                updated.role = v;
            }
            if let Some(v) = patch.subject {
                updated.subject = Some(v);
            }
            if name_taken(&users, Some(id), &updated.first_name, &updated.last_name)? {
                return Err(name_conflict(&updated.first_name, &updated.last_name));
            }
            let bytes = encode(&updated)?;
            users
                .insert(key.as_str(), bytes.as_slice())
                .map_err(map_store_err)?;
            user = updated;
        }
        txn.commit().map_err(map_store_err)?;
        Ok(Some(user))
    }

    async fn delete_user(&self, id: Uuid) -> PortResult<()> {
        self.remove_doc(USERS, id)
    }

    async fn get_pack(&self, id: Uuid) -> PortResult<Option<Pack>> {
        Ok(self.read_pack_doc(id)?.map(|d| d.pack))
    }

    async fn get_all_packs(&self) -> PortResult<Vec<Pack>> {
        let docs: Vec<PackDoc> = self.read_all(PACKS)?;
        let mut packs: Vec<Pack> = docs
            .into_iter()
            .filter(|d| !d.is_deleted)
            .map(|d| d.pack)
            .collect();
        packs.sort_by_key(|p| p.order);
        Ok(packs)
    }

    async fn get_deleted_packs(&self) -> PortResult<Vec<Pack>> {
        let docs: Vec<PackDoc> = self.read_all(PACKS)?;
        let mut packs: Vec<Pack> = docs
            .into_iter()
            .filter(|d| d.is_deleted)
            .map(|d| d.pack)
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
        let doc = PackDoc {
            pack,
            is_deleted: false,
        };
        self.write_doc(PACKS, &doc.pack.id.to_string(), &doc)?;
        Ok(doc.pack)
    }

    async fn update_pack(&self, id: Uuid, patch: PackPatch) -> PortResult<Option<Pack>> {
        let Some(mut doc) = self.read_pack_doc(id)? else {
            return Ok(None);
        };
        if let Some(v) = patch.title {
            doc.pack.title = v;
        }
        if let Some(v) = patch.description {
            doc.pack.description = v;
        }
        if let Some(v) = patch.subject {
            doc.pack.subject = v;
        }
        if let Some(v) = patch.published {
            doc.pack.published = v;
        }
        if let Some(v) = patch.order {
            doc.pack.order = v;
        }
        if let Some(v) = patch.views {
            doc.pack.views = v;
        }
        self.write_doc(PACKS, &id.to_string(), &doc)?;
        Ok(Some(doc.pack))
    }

    async fn increment_pack_views(&self, id: Uuid) -> PortResult<Option<Pack>> {
        let key = id.to_string();
        let pack;
        // Read-modify-write under one write transaction; concurrent views
        // serialize instead of losing increments.
        let txn = self.db.begin_write().map_err(map_store_err)?;
        {
            let mut packs = txn.open_table(PACKS).map_err(map_store_err)?;
            let mut doc = match packs.get(key.as_str()).map_err(map_store_err)? {
                Some(guard) => decode::<PackDoc>(guard.value())?,
                None => return Ok(None),
            };
            doc.pack.views += 1;
            let bytes = encode(&doc)?;
            packs
                .insert(key.as_str(), bytes.as_slice())
                .map_err(map_store_err)?;
            pack = doc.pack;
        }
        txn.commit().map_err(map_store_err)?;
        Ok(Some(pack))
    }

    async fn soft_delete_pack(&self, id: Uuid) -> PortResult<()> {
        let Some(mut doc) = self.read_pack_doc(id)? else {
            return Ok(());
        };
        if doc.is_deleted {
            return Ok(());
        }
        doc.is_deleted = true;
        doc.pack.deleted_at = Some(Utc::now());
        self.write_doc(PACKS, &id.to_string(), &doc)
    }

    async fn restore_pack(&self, id: Uuid) -> PortResult<()> {
        let Some(mut doc) = self.read_pack_doc(id)? else {
            return Ok(());
        };
        doc.is_deleted = false;
        doc.pack.deleted_at = None;
        self.write_doc(PACKS, &id.to_string(), &doc)
    }

    async fn permanently_delete_pack(&self, id: Uuid) -> PortResult<()> {
        // Collect the flashcard refs first, then apply every delete within
        // one write transaction so readers never observe orphaned cards.
        let cards: Vec<Flashcard> = self.read_all(FLASHCARDS)?;
        let doomed: Vec<String> = cards
            .into_iter()
            .filter(|c| c.pack_id == id)
            .map(|c| c.id.to_string())
            .collect();

        let txn = self.db.begin_write().map_err(map_store_err)?;
        let mut completed = 0usize;
        {
            let mut card_table = txn.open_table(FLASHCARDS).map_err(map_store_err)?;
            for key in &doomed {
                card_table
                    .remove(key.as_str())
                    .map_err(|e| PortError::PartialBatch {
                        completed,
                        reason: e.to_string(),
                    })?;
                completed += 1;
            }
            let mut pack_table = txn.open_table(PACKS).map_err(map_store_err)?;
            pack_table
                .remove(id.to_string().as_str())
                .map_err(|e| PortError::PartialBatch {
                    completed,
                    reason: e.to_string(),
                })?;
        }
        txn.commit().map_err(map_store_err)?;
        Ok(())
    }

    async fn get_flashcard(&self, id: Uuid) -> PortResult<Option<Flashcard>> {
        self.read_doc(FLASHCARDS, id)
    }

    async fn get_flashcards_by_pack(&self, pack_id: Uuid) -> PortResult<Vec<Flashcard>> {
        let cards: Vec<Flashcard> = self.read_all(FLASHCARDS)?;
        let mut cards: Vec<Flashcard> =
            cards.into_iter().filter(|c| c.pack_id == pack_id).collect();
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
        self.write_doc(FLASHCARDS, &card.id.to_string(), &card)?;
        Ok(card)
    }

    async fn update_flashcard(
        &self,
        id: Uuid,
        patch: FlashcardPatch,
    ) -> PortResult<Option<Flashcard>> {
        let Some(mut card) = self.read_doc::<Flashcard>(FLASHCARDS, id)? else {
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
        self.write_doc(FLASHCARDS, &id.to_string(), &card)?;
        Ok(Some(card))
    }

    async fn delete_flashcard(&self, id: Uuid) -> PortResult<()> {
        self.remove_doc(FLASHCARDS, id)
    }

    async fn get_account_request(&self, id: Uuid) -> PortResult<Option<AccountRequest>> {
        self.read_doc(ACCOUNT_REQUESTS, id)
    }

    async fn get_all_account_requests(&self) -> PortResult<Vec<AccountRequest>> {
        let mut requests: Vec<AccountRequest> = self.read_all(ACCOUNT_REQUESTS)?;
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
        self.write_doc(ACCOUNT_REQUESTS, &request.id.to_string(), &request)?;
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
        let user = User {
            id: Uuid::new_v4(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            password_hash: password_hash.to_string(),
            role,
            subject: None,
        };
        let bytes = encode(&user)?;

        // The request is consumed and the user created in one transaction.
        // The remove itself is the existence check: of two racing approvals,
        // only one observes the request.
        let txn = self.db.begin_write().map_err(map_store_err)?;
        {
            let mut requests = txn.open_table(ACCOUNT_REQUESTS).map_err(map_store_err)?;
            if requests
                .remove(id.to_string().as_str())
                .map_err(map_store_err)?
                .is_none()
            {
                return Err(PortError::NotFound(format!(
                    "Account request {} not found",
                    id
                )));
            }
            let mut users = txn.open_table(USERS).map_err(map_store_err)?;
            // A name conflict aborts the transaction, leaving the request
            // intact for a retry under a different name.
            if name_taken(&users, None, first_name, last_name)? {
                return Err(name_conflict(first_name, last_name));
            }
            users
                .insert(user.id.to_string().as_str(), bytes.as_slice())
                .map_err(|e| PortError::PartialBatch {
                    completed: 1,
                    reason: e.to_string(),
                })?;
        }
        txn.commit().map_err(map_store_err)?;
        Ok(user)
    }

    async fn reject_account_request(&self, id: Uuid) -> PortResult<()> {
        self.remove_doc(ACCOUNT_REQUESTS, id)
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
        self.write_doc(MESSAGES, &message.id.to_string(), &message)?;
        Ok(message)
    }

    async fn get_messages_between(&self, user_a: Uuid, user_b: Uuid) -> PortResult<Vec<Message>> {
        let messages: Vec<Message> = self.read_all(MESSAGES)?;
        let mut messages: Vec<Message> = messages
            .into_iter()
            .filter(|m| {
                (m.from_user_id == user_a && m.to_user_id == user_b)
                    || (m.from_user_id == user_b && m.to_user_id == user_a)
            })
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
        let messages: Vec<Message> = self.read_all(MESSAGES)?;
        Ok(messages
            .iter()
            .filter(|m| m.to_user_id == user_id && !m.read)
            .count() as u64)
    }

    async fn mark_message_read(&self, id: Uuid) -> PortResult<()> {
        let Some(mut message) = self.read_doc::<Message>(MESSAGES, id)? else {
            return Ok(());
        };
        if message.read {
            return Ok(());
        }
        message.read = true;
        let receipt = MessageRead {
            message_id: message.id,
            user_id: message.to_user_id,
            read_at: Utc::now(),
        };
        let message_bytes = encode(&message)?;
        let receipt_bytes = encode(&receipt)?;

        let txn = self.db.begin_write().map_err(map_store_err)?;
        {
            let mut messages = txn.open_table(MESSAGES).map_err(map_store_err)?;
            messages
                .insert(id.to_string().as_str(), message_bytes.as_slice())
                .map_err(map_store_err)?;
            let mut reads = txn.open_table(MESSAGE_READS).map_err(map_store_err)?;
            reads
                .insert(
                    Uuid::new_v4().to_string().as_str(),
                    receipt_bytes.as_slice(),
                )
                .map_err(|e| PortError::PartialBatch {
                    completed: 1,
                    reason: e.to_string(),
                })?;
        }
        txn.commit().map_err(map_store_err)?;
        Ok(())
    }

    async fn mark_conversation_as_read(
        &self,
        user_id: Uuid,
        other_user_id: Uuid,
    ) -> PortResult<()> {
        let messages: Vec<Message> = self.read_all(MESSAGES)?;
        let unread: Vec<Message> = messages
            .into_iter()
            .filter(|m| m.to_user_id == user_id && m.from_user_id == other_user_id && !m.read)
            .collect();
        if unread.is_empty() {
            return Ok(());
        }

        let read_at = Utc::now();
        let txn = self.db.begin_write().map_err(map_store_err)?;
        let mut completed = 0usize;
        {
            let mut message_table = txn.open_table(MESSAGES).map_err(map_store_err)?;
            let mut read_table = txn.open_table(MESSAGE_READS).map_err(map_store_err)?;
            for mut message in unread {
                message.read = true;
                let receipt = MessageRead {
                    message_id: message.id,
                    user_id,
                    read_at,
                };
                let message_bytes = encode(&message)?;
                let receipt_bytes = encode(&receipt)?;
                message_table
                    .insert(message.id.to_string().as_str(), message_bytes.as_slice())
                    .map_err(|e| PortError::PartialBatch {
                        completed,
                        reason: e.to_string(),
                    })?;
                read_table
                    .insert(
                        Uuid::new_v4().to_string().as_str(),
                        receipt_bytes.as_slice(),
                    )
                    .map_err(|e| PortError::PartialBatch {
                        completed,
                        reason: e.to_string(),
                    })?;
                completed += 1;
            }
        }
        txn.commit().map_err(map_store_err)?;
        Ok(())
    }

    async fn delete_old_messages(&self) -> PortResult<u64> {
        let cutoff = Utc::now() - Duration::days(MESSAGE_RETENTION_DAYS);
        let messages: Vec<Message> = self.read_all(MESSAGES)?;
        let doomed: Vec<String> = messages
            .into_iter()
            .filter(|m| m.created_at < cutoff)
            .map(|m| m.id.to_string())
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin_write().map_err(map_store_err)?;
        let mut removed = 0u64;
        {
            let mut table = txn.open_table(MESSAGES).map_err(map_store_err)?;
            for key in &doomed {
                table
                    .remove(key.as_str())
                    .map_err(|e| PortError::PartialBatch {
                        completed: removed as usize,
                        reason: e.to_string(),
                    })?;
                removed += 1;
            }
        }
        txn.commit().map_err(map_store_err)?;
        Ok(removed)
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
        let dir = tempfile::tempdir().unwrap();
        let adapter = DocumentAdapter::open(&dir.path().join("purge.redb")).unwrap();

        let old = message_at(8);
        let fresh = message_at(6);
        adapter
            .write_doc(MESSAGES, &old.id.to_string(), &old)
            .unwrap();
        adapter
            .write_doc(MESSAGES, &fresh.id.to_string(), &fresh)
            .unwrap();

        let purged = adapter.delete_old_messages().await.unwrap();
        assert_eq!(purged, 1);

        let remaining: Vec<Message> = adapter.read_all(MESSAGES).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, fresh.id);
    }

    #[tokio::test]
    async fn racing_approvals_consume_the_request_once() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = DocumentAdapter::open(&dir.path().join("approve.redb")).unwrap();

        let request = adapter
            .create_account_request(NewAccountRequest {
                first_name: "New".to_string(),
                last_name: "Comer".to_string(),
                password_hash: "hash".to_string(),
                requested_role: Role::Teacher,
            })
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            adapter.approve_account_request(request.id, "New", "Comer", "hash", Role::Teacher),
            adapter.approve_account_request(request.id, "New", "Comer", "hash", Role::Teacher),
        );

        // Exactly one approval wins; the loser sees the request as gone.
        assert!(a.is_ok() != b.is_ok());
        let loser = if a.is_err() { a } else { b };
        assert!(matches!(loser.unwrap_err(), PortError::NotFound(_)));
        assert_eq!(adapter.get_all_users().await.unwrap().len(), 1);
        assert!(adapter
            .get_account_request(request.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn pack_documents_carry_the_deleted_flag() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = DocumentAdapter::open(&dir.path().join("flag.redb")).unwrap();

        let pack = adapter
            .create_pack(NewPack {
                title: "Algebra".to_string(),
                description: String::new(),
                subject: "Maths".to_string(),
                published: false,
                order: 0,
                created_by: Uuid::new_v4(),
            })
            .await
            .unwrap();
        adapter.soft_delete_pack(pack.id).await.unwrap();

        let doc = adapter.read_pack_doc(pack.id).unwrap().unwrap();
        assert!(doc.is_deleted);
        assert!(doc.pack.deleted_at.is_some());

        adapter.restore_pack(pack.id).await.unwrap();
        let doc = adapter.read_pack_doc(pack.id).unwrap().unwrap();
        assert!(!doc.is_deleted);
        assert!(doc.pack.deleted_at.is_none());
    }
}
