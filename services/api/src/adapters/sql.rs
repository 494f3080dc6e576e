//! services/api/src/adapters/sql.rs
//!
//! This module contains the relational adapter, the concrete implementation
//! of the `StorageService` port backed by SQLite through `sqlx`. It relies on
//! explicit foreign keys and native ordering; partial updates are built as
//! dynamic column lists from only the supplied fields.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use studypack_core::domain::{
    AccountRequest, Flashcard, FlashcardPatch, Message, NewAccountRequest, NewFlashcard, NewPack,
    NewUser, Pack, PackPatch, RequestStatus, Role, User, UserPatch, MESSAGE_RETENTION_DAYS,
};
use studypack_core::ports::{is_valid_recipient, PortError, PortResult, StorageService};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A relational adapter that implements the `StorageService` port.
#[derive(Clone)]
pub struct SqlAdapter {
    pool: SqlitePool,
}

impl SqlAdapter {
    /// Connects to the database and runs migrations.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let adapter = Self { pool };
        adapter.run_migrations().await?;
        Ok(adapter)
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn map_sql_err(e: sqlx::Error) -> PortError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() || db.is_foreign_key_violation() => {
            PortError::Constraint(db.to_string())
        }
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn parse_id(raw: &str) -> PortResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| PortError::Unexpected(format!("malformed row id: {}", e)))
}

fn parse_role(raw: &str) -> PortResult<Role> {
    Role::from_str(raw).ok_or_else(|| PortError::Unexpected(format!("unknown role '{}'", raw)))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: String,
    first_name: String,
    last_name: String,
    password_hash: String,
    role: String,
    subject: Option<String>,
}
impl UserRecord {
    fn to_domain(self) -> PortResult<User> {
        Ok(User {
            id: parse_id(&self.id)?,
            first_name: self.first_name,
            last_name: self.last_name,
            password_hash: self.password_hash,
            role: parse_role(&self.role)?,
            subject: self.subject,
        })
    }
}

#[derive(FromRow)]
struct PackRecord {
    id: String,
    title: String,
    description: String,
    subject: String,
    published: bool,
    position: i32,
    views: i64,
    created_by: String,
    deleted_at: Option<DateTime<Utc>>,
}
impl PackRecord {
    fn to_domain(self) -> PortResult<Pack> {
        Ok(Pack {
            id: parse_id(&self.id)?,
            title: self.title,
            description: self.description,
            subject: self.subject,
            published: self.published,
            order: self.position,
            views: self.views,
            created_by: parse_id(&self.created_by)?,
            deleted_at: self.deleted_at,
        })
    }
}

#[derive(FromRow)]
struct FlashcardRecord {
    id: String,
    pack_id: String,
    question: String,
    answer: String,
    position: i32,
}
impl FlashcardRecord {
    fn to_domain(self) -> PortResult<Flashcard> {
        Ok(Flashcard {
            id: parse_id(&self.id)?,
            pack_id: parse_id(&self.pack_id)?,
            question: self.question,
            answer: self.answer,
            order: self.position,
        })
    }
}

#[derive(FromRow)]
struct AccountRequestRecord {
    id: String,
    first_name: String,
    last_name: String,
    password_hash: String,
    requested_role: String,
}
impl AccountRequestRecord {
    fn to_domain(self) -> PortResult<AccountRequest> {
        Ok(AccountRequest {
            id: parse_id(&self.id)?,
            first_name: self.first_name,
            last_name: self.last_name,
            password_hash: self.password_hash,
            requested_role: parse_role(&self.requested_role)?,
            status: RequestStatus::Pending,
        })
    }
}

#[derive(FromRow)]
struct MessageRecord {
    id: String,
    from_user_id: String,
    to_user_id: String,
    content: String,
    created_at: DateTime<Utc>,
    is_read: bool,
}
impl MessageRecord {
    fn to_domain(self) -> PortResult<Message> {
        Ok(Message {
            id: parse_id(&self.id)?,
            from_user_id: parse_id(&self.from_user_id)?,
            to_user_id: parse_id(&self.to_user_id)?,
            content: self.content,
            created_at: self.created_at,
            read: self.is_read,
        })
    }
}

const USER_COLS: &str = "id, first_name, last_name, password_hash, role, subject";
const PACK_COLS: &str =
    "id, title, description, subject, published, position, views, created_by, deleted_at";
const CARD_COLS: &str = "id, pack_id, question, answer, position";
const MESSAGE_COLS: &str = "id, from_user_id, to_user_id, content, created_at, is_read";

//=========================================================================================
// `StorageService` Trait Implementation
//=========================================================================================

#[async_trait]
impl StorageService for SqlAdapter {
    async fn get_user(&self, id: Uuid) -> PortResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sql_err)?;
        record.map(UserRecord::to_domain).transpose()
    }

    async fn get_all_users(&self) -> PortResult<Vec<User>> {
        let records = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users ORDER BY last_name, first_name",
            USER_COLS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sql_err)?;
        records.into_iter().map(UserRecord::to_domain).collect()
    }

    async fn count_users(&self) -> PortResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sql_err)?;
        Ok(count as u64)
    }

    async fn create_user(&self, new: NewUser) -> PortResult<User> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO users (id, first_name, last_name, password_hash, role, subject) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(id.to_string())
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.password_hash)
        .bind(new.role.as_str())
        .bind(&new.subject)
        .execute(&self.pool)
        .await
        .map_err(map_sql_err)?;

        Ok(User {
            id,
            first_name: new.first_name,
            last_name: new.last_name,
            password_hash: new.password_hash,
            role: new.role,
            subject: new.subject,
        })
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> PortResult<Option<User>> {
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE users SET ");
        let mut any = false;
        {
            let mut fields = qb.separated(", ");
            if let Some(v) = &patch.first_name {
                fields.push("first_name = ").push_bind_unseparated(v);
                any = true;
            }
            if let Some(v) = &patch.last_name {
                fields.push("last_name = ").push_bind_unseparated(v);
                any = true;
            }
            if let Some(v) = &patch.password_hash {
                fields.push("password_hash = ").push_bind_unseparated(v);
                any = true;
            }
            if let Some(v) = patch.role {
                fields.push("role = ").push_bind_unseparated(v.as_str());
                any = true;
            }
            if let Some(v) = &patch.subject {
                fields.push("subject = ").push_bind_unseparated(v);
                any = true;
            }
        }
        if any {
            qb.push(" WHERE id = ").push_bind(id.to_string());
            qb.build().execute(&self.pool).await.map_err(map_sql_err)?;
        }
        self.get_user(id).await
    }

    async fn delete_user(&self, id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sql_err)?;
        Ok(())
    }

    async fn get_pack(&self, id: Uuid) -> PortResult<Option<Pack>> {
        let record = sqlx::query_as::<_, PackRecord>(&format!(
            "SELECT {} FROM packs WHERE id = $1",
            PACK_COLS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sql_err)?;
        record.map(PackRecord::to_domain).transpose()
    }

    async fn get_all_packs(&self) -> PortResult<Vec<Pack>> {
        let records = sqlx::query_as::<_, PackRecord>(&format!(
            "SELECT {} FROM packs WHERE deleted_at IS NULL ORDER BY position ASC",
            PACK_COLS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sql_err)?;
        records.into_iter().map(PackRecord::to_domain).collect()
    }

    async fn get_deleted_packs(&self) -> PortResult<Vec<Pack>> {
        let records = sqlx::query_as::<_, PackRecord>(&format!(
            "SELECT {} FROM packs WHERE deleted_at IS NOT NULL ORDER BY deleted_at DESC",
            PACK_COLS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sql_err)?;
        records.into_iter().map(PackRecord::to_domain).collect()
    }

    async fn create_pack(&self, new: NewPack) -> PortResult<Pack> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO packs (id, title, description, subject, published, position, views, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, 0, $7)",
        )
        .bind(id.to_string())
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.subject)
        .bind(new.published)
        .bind(new.order)
        .bind(new.created_by.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sql_err)?;

        Ok(Pack {
            id,
            title: new.title,
            description: new.description,
            subject: new.subject,
            published: new.published,
            order: new.order,
            views: 0,
            created_by: new.created_by,
            deleted_at: None,
        })
    }

    async fn update_pack(&self, id: Uuid, patch: PackPatch) -> PortResult<Option<Pack>> {
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE packs SET ");
        let mut any = false;
        {
            let mut fields = qb.separated(", ");
            if let Some(v) = &patch.title {
                fields.push("title = ").push_bind_unseparated(v);
                any = true;
            }
            if let Some(v) = &patch.description {
                fields.push("description = ").push_bind_unseparated(v);
                any = true;
            }
            if let Some(v) = &patch.subject {
                fields.push("subject = ").push_bind_unseparated(v);
                any = true;
            }
            if let Some(v) = patch.published {
                fields.push("published = ").push_bind_unseparated(v);
                any = true;
            }
            if let Some(v) = patch.order {
                fields.push("position = ").push_bind_unseparated(v);
                any = true;
            }
            if let Some(v) = patch.views {
                fields.push("views = ").push_bind_unseparated(v);
                any = true;
            }
        }
        if any {
            qb.push(" WHERE id = ").push_bind(id.to_string());
            qb.build().execute(&self.pool).await.map_err(map_sql_err)?;
        }
        self.get_pack(id).await
    }

    async fn increment_pack_views(&self, id: Uuid) -> PortResult<Option<Pack>> {
        sqlx::query("UPDATE packs SET views = views + 1 WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sql_err)?;
        self.get_pack(id).await
    }

    async fn soft_delete_pack(&self, id: Uuid) -> PortResult<()> {
        sqlx::query("UPDATE packs SET deleted_at = $1 WHERE id = $2 AND deleted_at IS NULL")
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sql_err)?;
        Ok(())
    }

    async fn restore_pack(&self, id: Uuid) -> PortResult<()> {
        sqlx::query("UPDATE packs SET deleted_at = NULL WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sql_err)?;
        Ok(())
    }

    async fn permanently_delete_pack(&self, id: Uuid) -> PortResult<()> {
        // SQLite does not cascade here, so dependent flashcards are removed
        // in the same transaction as the pack row.
        let mut tx = self.pool.begin().await.map_err(map_sql_err)?;
        sqlx::query("DELETE FROM flashcards WHERE pack_id = $1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(map_sql_err)?;
        sqlx::query("DELETE FROM packs WHERE id = $1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(map_sql_err)?;
        tx.commit().await.map_err(map_sql_err)?;
        Ok(())
    }

    async fn get_flashcard(&self, id: Uuid) -> PortResult<Option<Flashcard>> {
        let record = sqlx::query_as::<_, FlashcardRecord>(&format!(
            "SELECT {} FROM flashcards WHERE id = $1",
            CARD_COLS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sql_err)?;
        record.map(FlashcardRecord::to_domain).transpose()
    }

    async fn get_flashcards_by_pack(&self, pack_id: Uuid) -> PortResult<Vec<Flashcard>> {
        let records = sqlx::query_as::<_, FlashcardRecord>(&format!(
            "SELECT {} FROM flashcards WHERE pack_id = $1 ORDER BY position ASC",
            CARD_COLS
        ))
        .bind(pack_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sql_err)?;
        records.into_iter().map(FlashcardRecord::to_domain).collect()
    }

    async fn create_flashcard(&self, new: NewFlashcard) -> PortResult<Flashcard> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO flashcards (id, pack_id, question, answer, position) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id.to_string())
        .bind(new.pack_id.to_string())
        .bind(&new.question)
        .bind(&new.answer)
        .bind(new.order)
        .execute(&self.pool)
        .await
        .map_err(map_sql_err)?;

        Ok(Flashcard {
            id,
            pack_id: new.pack_id,
            question: new.question,
            answer: new.answer,
            order: new.order,
        })
    }

    async fn update_flashcard(
        &self,
        id: Uuid,
        patch: FlashcardPatch,
    ) -> PortResult<Option<Flashcard>> {
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE flashcards SET ");
        let mut any = false;
        {
            let mut fields = qb.separated(", ");
            if let Some(v) = &patch.question {
                fields.push("question = ").push_bind_unseparated(v);
                any = true;
            }
            if let Some(v) = &patch.answer {
                fields.push("answer = ").push_bind_unseparated(v);
                any = true;
            }
            if let Some(v) = patch.order {
                fields.push("position = ").push_bind_unseparated(v);
                any = true;
            }
        }
        if any {
            qb.push(" WHERE id = ").push_bind(id.to_string());
            qb.build().execute(&self.pool).await.map_err(map_sql_err)?;
        }
        self.get_flashcard(id).await
    }

    async fn delete_flashcard(&self, id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM flashcards WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sql_err)?;
        Ok(())
    }

    async fn get_account_request(&self, id: Uuid) -> PortResult<Option<AccountRequest>> {
        let record = sqlx::query_as::<_, AccountRequestRecord>(
            "SELECT id, first_name, last_name, password_hash, requested_role \
             FROM account_requests WHERE id = $1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sql_err)?;
        record.map(AccountRequestRecord::to_domain).transpose()
    }

    async fn get_all_account_requests(&self) -> PortResult<Vec<AccountRequest>> {
        let records = sqlx::query_as::<_, AccountRequestRecord>(
            "SELECT id, first_name, last_name, password_hash, requested_role \
             FROM account_requests ORDER BY last_name, first_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sql_err)?;
        records
            .into_iter()
            .map(AccountRequestRecord::to_domain)
            .collect()
    }

    async fn create_account_request(&self, new: NewAccountRequest) -> PortResult<AccountRequest> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO account_requests (id, first_name, last_name, password_hash, requested_role, status) \
             VALUES ($1, $2, $3, $4, $5, 'pending')",
        )
        .bind(id.to_string())
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.password_hash)
        .bind(new.requested_role.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sql_err)?;

        Ok(AccountRequest {
            id,
            first_name: new.first_name,
            last_name: new.last_name,
            password_hash: new.password_hash,
            requested_role: new.requested_role,
            status: RequestStatus::Pending,
        })
    }

    async fn approve_account_request(
        &self,
        id: Uuid,
        first_name: &str,
        last_name: &str,
        password_hash: &str,
        role: Role,
    ) -> PortResult<User> {
        let mut tx = self.pool.begin().await.map_err(map_sql_err)?;
        let deleted = sqlx::query("DELETE FROM account_requests WHERE id = $1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(map_sql_err)?;
        if deleted.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Account request {} not found", id)));
        }
        let user_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO users (id, first_name, last_name, password_hash, role, subject) \
             VALUES ($1, $2, $3, $4, $5, NULL)",
        )
        .bind(user_id.to_string())
        .bind(first_name)
        .bind(last_name)
        .bind(password_hash)
        .bind(role.as_str())
        .execute(&mut *tx)
        .await
        .map_err(map_sql_err)?;
        tx.commit().await.map_err(map_sql_err)?;

        Ok(User {
            id: user_id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            password_hash: password_hash.to_string(),
            role,
            subject: None,
        })
    }

    async fn reject_account_request(&self, id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM account_requests WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sql_err)?;
        Ok(())
    }

    async fn create_message(
        &self,
        from_user_id: Uuid,
        to_user_id: Uuid,
        content: &str,
    ) -> PortResult<Message> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        sqlx::query(
            "INSERT INTO messages (id, from_user_id, to_user_id, content, created_at, is_read) \
             VALUES ($1, $2, $3, $4, $5, 0)",
        )
        .bind(id.to_string())
        .bind(from_user_id.to_string())
        .bind(to_user_id.to_string())
        .bind(content)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sql_err)?;

        Ok(Message {
            id,
            from_user_id,
            to_user_id,
            content: content.to_string(),
            created_at,
            read: false,
        })
    }

    async fn get_messages_between(&self, user_a: Uuid, user_b: Uuid) -> PortResult<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {} FROM messages \
             WHERE (from_user_id = $1 AND to_user_id = $2) \
                OR (from_user_id = $2 AND to_user_id = $1) \
             ORDER BY created_at ASC",
            MESSAGE_COLS
        ))
        .bind(user_a.to_string())
        .bind(user_b.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sql_err)?;
        records.into_iter().map(MessageRecord::to_domain).collect()
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
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE to_user_id = $1 AND is_read = 0")
                .bind(user_id.to_string())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sql_err)?;
        Ok(count as u64)
    }

    async fn mark_message_read(&self, id: Uuid) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_sql_err)?;
        let updated =
            sqlx::query("UPDATE messages SET is_read = 1 WHERE id = $1 AND is_read = 0")
                .bind(id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(map_sql_err)?;
        if updated.rows_affected() > 0 {
            let recipient: Option<String> =
                sqlx::query_scalar("SELECT to_user_id FROM messages WHERE id = $1")
                    .bind(id.to_string())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(map_sql_err)?;
            if let Some(to_user_id) = recipient {
                sqlx::query(
                    "INSERT INTO message_reads (message_id, user_id, read_at) VALUES ($1, $2, $3)",
                )
                .bind(id.to_string())
                .bind(to_user_id)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await
                .map_err(map_sql_err)?;
            }
        }
        tx.commit().await.map_err(map_sql_err)?;
        Ok(())
    }

    async fn mark_conversation_as_read(
        &self,
        user_id: Uuid,
        other_user_id: Uuid,
    ) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_sql_err)?;
        let unread: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM messages \
             WHERE to_user_id = $1 AND from_user_id = $2 AND is_read = 0",
        )
        .bind(user_id.to_string())
        .bind(other_user_id.to_string())
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sql_err)?;

        sqlx::query(
            "UPDATE messages SET is_read = 1 \
             WHERE to_user_id = $1 AND from_user_id = $2 AND is_read = 0",
        )
        .bind(user_id.to_string())
        .bind(other_user_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(map_sql_err)?;

        let read_at = Utc::now();
        for message_id in unread {
            sqlx::query(
                "INSERT INTO message_reads (message_id, user_id, read_at) VALUES ($1, $2, $3)",
            )
            .bind(message_id)
            .bind(user_id.to_string())
            .bind(read_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sql_err)?;
        }
        tx.commit().await.map_err(map_sql_err)?;
        Ok(())
    }

    async fn delete_old_messages(&self) -> PortResult<u64> {
        let cutoff = Utc::now() - Duration::days(MESSAGE_RETENTION_DAYS);
        let result = sqlx::query("DELETE FROM messages WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(map_sql_err)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_adapter(dir: &tempfile::TempDir) -> SqlAdapter {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        SqlAdapter::connect(&url).await.unwrap()
    }

    async fn insert_message_at(adapter: &SqlAdapter, age_days: i64) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO messages (id, from_user_id, to_user_id, content, created_at, is_read) \
             VALUES ($1, $2, $3, 'hello', $4, 0)",
        )
        .bind(id.to_string())
        .bind(Uuid::new_v4().to_string())
        .bind(Uuid::new_v4().to_string())
        .bind(Utc::now() - Duration::days(age_days))
        .execute(&adapter.pool)
        .await
        .unwrap();
        id
    }

    #[tokio::test]
    async fn purge_respects_retention_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = test_adapter(&dir).await;

        let old = insert_message_at(&adapter, 8).await;
        let fresh = insert_message_at(&adapter, 6).await;

        let purged = adapter.delete_old_messages().await.unwrap();
        assert_eq!(purged, 1);

        let remaining: Vec<String> = sqlx::query_scalar("SELECT id FROM messages")
            .fetch_all(&adapter.pool)
            .await
            .unwrap();
        assert_eq!(remaining, vec![fresh.to_string()]);
        assert!(!remaining.contains(&old.to_string()));
    }

    #[tokio::test]
    async fn update_with_empty_patch_returns_entity_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = test_adapter(&dir).await;

        let owner = adapter
            .create_user(NewUser {
                first_name: "Pat".to_string(),
                last_name: "Jones".to_string(),
                password_hash: "x".to_string(),
                role: Role::Teacher,
                subject: Some("Maths".to_string()),
            })
            .await
            .unwrap();
        let pack = adapter
            .create_pack(NewPack {
                title: "Algebra".to_string(),
                description: "desc".to_string(),
                subject: "Maths".to_string(),
                published: false,
                order: 3,
                created_by: owner.id,
            })
            .await
            .unwrap();

        let updated = adapter
            .update_pack(pack.id, PackPatch::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "Algebra");
        assert_eq!(updated.order, 3);
        assert_eq!(updated.views, 0);
    }
}
