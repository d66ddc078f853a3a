//! PostgreSQL Store
//!
//! sqlx-backed implementation of the storage traits. Nested collections
//! (participants, reactions, seen receipts, media) live in JSONB columns;
//! plain ID sets use uuid arrays. Optimistic locking is enforced in SQL
//! with `WHERE id = $1 AND version = $2`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use uuid::Uuid;

use crate::error::{ChatError, Result};
use crate::model::{
    Chat, ChatParticipant, ChatType, FriendRequest, FriendRequestStatus, Message, MessageMedia,
    MessageReaction, MessageType, Notification, NotificationType, SeenRecord, User, UserStatus,
};

use super::{
    ChatStore, Entity, FriendRequestStore, MessageStore, NotificationStore, Repository, UserStore,
};

/// PostgreSQL implementation of the persisted store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database and apply pending migrations
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| ChatError::transient(format!("migration failed: {e}")))?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool (used by integration tests)
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Distinguish "stale version" from "row gone" after a CAS miss
    async fn exists(&self, table: &str, id: Uuid) -> Result<bool> {
        let row = sqlx::query(&format!("SELECT 1 FROM {table} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

fn parse_user_status(s: &str) -> UserStatus {
    UserStatus::from_str(s).unwrap_or(UserStatus::Offline)
}

fn parse_chat_type(s: &str) -> Result<ChatType> {
    ChatType::from_str(s).ok_or_else(|| ChatError::transient(format!("unknown chat type: {s}")))
}

fn parse_message_type(s: &str) -> Result<MessageType> {
    MessageType::from_str(s)
        .ok_or_else(|| ChatError::transient(format!("unknown message type: {s}")))
}

fn parse_request_status(s: &str) -> Result<FriendRequestStatus> {
    match s {
        "pending" => Ok(FriendRequestStatus::Pending),
        "accepted" => Ok(FriendRequestStatus::Accepted),
        "rejected" => Ok(FriendRequestStatus::Rejected),
        other => Err(ChatError::transient(format!(
            "unknown friend request status: {other}"
        ))),
    }
}

fn parse_notification_type(s: &str) -> Result<NotificationType> {
    match s {
        "message" => Ok(NotificationType::Message),
        "friend_request" => Ok(NotificationType::FriendRequest),
        "mention" => Ok(NotificationType::Mention),
        "chat_invite" => Ok(NotificationType::ChatInvite),
        "system" => Ok(NotificationType::System),
        other => Err(ChatError::transient(format!(
            "unknown notification type: {other}"
        ))),
    }
}

fn user_from_row(row: &PgRow) -> Result<User> {
    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        status: parse_user_status(row.get("status")),
        last_seen: row.get("last_seen"),
        is_active: row.get("is_active"),
        friends: row.get("friends"),
        blocked_users: row.get("blocked_users"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    })
}

fn chat_from_row(row: &PgRow) -> Result<Chat> {
    let participants: Json<Vec<ChatParticipant>> = row.get("participants");
    Ok(Chat {
        id: row.get("id"),
        chat_type: parse_chat_type(row.get("chat_type"))?,
        name: row.get("name"),
        description: row.get("description"),
        participants: participants.0,
        created_by: row.get("created_by"),
        message_count: row.get("message_count"),
        last_message_id: row.get("last_message_id"),
        last_message_at: row.get("last_message_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    })
}

fn message_from_row(row: &PgRow) -> Result<Message> {
    let media: Option<Json<MessageMedia>> = row.get("media");
    let reactions: Json<Vec<MessageReaction>> = row.get("reactions");
    let seen_by: Json<Vec<SeenRecord>> = row.get("seen_by");
    Ok(Message {
        id: row.get("id"),
        content: row.get("content"),
        message_type: parse_message_type(row.get("message_type"))?,
        media: media.map(|m| m.0),
        chat_id: row.get("chat_id"),
        sender_id: row.get("sender_id"),
        reply_to_message_id: row.get("reply_to_message_id"),
        forwarded_from_user_id: row.get("forwarded_from_user_id"),
        forwarded_from_chat_id: row.get("forwarded_from_chat_id"),
        reactions: reactions.0,
        mentions: row.get("mentions"),
        is_edited: row.get("is_edited"),
        edited_at: row.get("edited_at"),
        original_content: row.get("original_content"),
        delivered_to: row.get("delivered_to"),
        seen_by: seen_by.0,
        delete_at: row.get("delete_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    })
}

fn request_from_row(row: &PgRow) -> Result<FriendRequest> {
    Ok(FriendRequest {
        id: row.get("id"),
        sender_id: row.get("sender_id"),
        receiver_id: row.get("receiver_id"),
        status: parse_request_status(row.get("status"))?,
        message: row.get("message"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        responded_at: row.get("responded_at"),
        version: row.get("version"),
    })
}

fn notification_from_row(row: &PgRow) -> Result<Notification> {
    Ok(Notification {
        id: row.get("id"),
        user_id: row.get("user_id"),
        notification_type: parse_notification_type(row.get("notification_type"))?,
        title: row.get("title"),
        body: row.get("body"),
        data: row.get("data"),
        read: row.get("read"),
        read_at: row.get("read_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    })
}

#[async_trait]
impl Repository<User> for PgStore {
    async fn insert(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, first_name, last_name, status,
                               last_seen, is_active, friends, blocked_users,
                               created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.status.as_str())
        .bind(user.last_seen)
        .bind(user.is_active)
        .bind(&user.friends)
        .bind(&user.blocked_users)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(user.version)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                ChatError::already_exists("user already exists")
            }
            _ => e.into(),
        })?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn update(&self, user: &mut User) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET username = $3, email = $4, first_name = $5, last_name = $6,
                status = $7, last_seen = $8, is_active = $9, friends = $10,
                blocked_users = $11, updated_at = $12, version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(user.id)
        .bind(user.version)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.status.as_str())
        .bind(user.last_seen)
        .bind(user.is_active)
        .bind(&user.friends)
        .bind(&user.blocked_users)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 1 {
            user.set_version(user.version() + 1);
            return Ok(true);
        }
        if self.exists("users", user.id).await? {
            Ok(false)
        } else {
            Err(ChatError::not_found(User::KIND))
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn get_users(&self, ids: &[Uuid]) -> Result<Vec<User>> {
        let rows = sqlx::query("SELECT * FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(user_from_row).collect()
    }
}

#[async_trait]
impl Repository<Chat> for PgStore {
    async fn insert(&self, chat: &Chat) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chats (id, chat_type, name, description, participants,
                               created_by, message_count, last_message_id,
                               last_message_at, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(chat.id)
        .bind(chat.chat_type.as_str())
        .bind(&chat.name)
        .bind(&chat.description)
        .bind(Json(&chat.participants))
        .bind(chat.created_by)
        .bind(chat.message_count)
        .bind(chat.last_message_id)
        .bind(chat.last_message_at)
        .bind(chat.created_at)
        .bind(chat.updated_at)
        .bind(chat.version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Chat>> {
        let row = sqlx::query("SELECT * FROM chats WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(chat_from_row).transpose()
    }

    async fn update(&self, chat: &mut Chat) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE chats
            SET name = $3, description = $4, participants = $5, message_count = $6,
                last_message_id = $7, last_message_at = $8, updated_at = $9,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(chat.id)
        .bind(chat.version)
        .bind(&chat.name)
        .bind(&chat.description)
        .bind(Json(&chat.participants))
        .bind(chat.message_count)
        .bind(chat.last_message_id)
        .bind(chat.last_message_at)
        .bind(chat.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 1 {
            chat.set_version(chat.version() + 1);
            return Ok(true);
        }
        if self.exists("chats", chat.id).await? {
            Ok(false)
        } else {
            Err(ChatError::not_found(Chat::KIND))
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chats WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl ChatStore for PgStore {
    async fn find_private_chat(&self, user_a: Uuid, user_b: Uuid) -> Result<Option<Chat>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM chats
            WHERE chat_type = 'private'
              AND participants @> jsonb_build_array(jsonb_build_object('user_id', $1::uuid))
              AND participants @> jsonb_build_array(jsonb_build_object('user_id', $2::uuid))
            LIMIT 1
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(chat_from_row).transpose()
    }

    async fn chats_for_user(&self, user_id: Uuid) -> Result<Vec<Chat>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM chats
            WHERE participants @> jsonb_build_array(jsonb_build_object('user_id', $1::uuid))
            ORDER BY COALESCE(last_message_at, created_at) DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(chat_from_row).collect()
    }
}

#[async_trait]
impl Repository<Message> for PgStore {
    async fn insert(&self, message: &Message) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, content, message_type, media, chat_id, sender_id,
                                  reply_to_message_id, forwarded_from_user_id,
                                  forwarded_from_chat_id, reactions, mentions, is_edited,
                                  edited_at, original_content, delivered_to, seen_by,
                                  delete_at, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20)
            "#,
        )
        .bind(message.id)
        .bind(&message.content)
        .bind(message.message_type.as_str())
        .bind(message.media.as_ref().map(Json))
        .bind(message.chat_id)
        .bind(message.sender_id)
        .bind(message.reply_to_message_id)
        .bind(message.forwarded_from_user_id)
        .bind(message.forwarded_from_chat_id)
        .bind(Json(&message.reactions))
        .bind(&message.mentions)
        .bind(message.is_edited)
        .bind(message.edited_at)
        .bind(&message.original_content)
        .bind(&message.delivered_to)
        .bind(Json(&message.seen_by))
        .bind(message.delete_at)
        .bind(message.created_at)
        .bind(message.updated_at)
        .bind(message.version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Message>> {
        let row = sqlx::query("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(message_from_row).transpose()
    }

    async fn update(&self, message: &mut Message) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET content = $3, message_type = $4, media = $5, reactions = $6,
                is_edited = $7, edited_at = $8, original_content = $9,
                delivered_to = $10, seen_by = $11, delete_at = $12, updated_at = $13,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(message.id)
        .bind(message.version)
        .bind(&message.content)
        .bind(message.message_type.as_str())
        .bind(message.media.as_ref().map(Json))
        .bind(Json(&message.reactions))
        .bind(message.is_edited)
        .bind(message.edited_at)
        .bind(&message.original_content)
        .bind(&message.delivered_to)
        .bind(Json(&message.seen_by))
        .bind(message.delete_at)
        .bind(message.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 1 {
            message.set_version(message.version() + 1);
            return Ok(true);
        }
        if self.exists("messages", message.id).await? {
            Ok(false)
        } else {
            Err(ChatError::not_found(Message::KIND))
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl MessageStore for PgStore {
    async fn chat_page(
        &self,
        chat_id: Uuid,
        limit: usize,
        before: Option<DateTime<Utc>>,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM messages
            WHERE chat_id = $1
              AND ($2::timestamptz IS NULL OR created_at < $2)
              AND ($3::timestamptz IS NULL OR created_at > $3)
            ORDER BY created_at DESC
            LIMIT $4
            "#,
        )
        .bind(chat_id)
        .bind(before)
        .bind(after)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(message_from_row).collect()
    }

    async fn unread_messages(&self, chat_id: Uuid, user_id: Uuid) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM messages
            WHERE chat_id = $1
              AND sender_id <> $2
              AND NOT seen_by @> jsonb_build_array(jsonb_build_object('user_id', $2::uuid))
            ORDER BY created_at ASC
            "#,
        )
        .bind(chat_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(message_from_row).collect()
    }

    async fn unread_count(&self, chat_id: Uuid, user_id: Uuid) -> Result<u64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count FROM messages
            WHERE chat_id = $1
              AND sender_id <> $2
              AND NOT seen_by @> jsonb_build_array(jsonb_build_object('user_id', $2::uuid))
            "#,
        )
        .bind(chat_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.get("count");
        Ok(count as u64)
    }

    async fn mentions_of(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM messages
            WHERE $1 = ANY(mentions)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(message_from_row).collect()
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM messages WHERE delete_at IS NOT NULL AND delete_at <= $1")
                .bind(now)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Repository<FriendRequest> for PgStore {
    async fn insert(&self, request: &FriendRequest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO friend_requests (id, sender_id, receiver_id, status, message,
                                         created_at, updated_at, responded_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(request.id)
        .bind(request.sender_id)
        .bind(request.receiver_id)
        .bind(request.status.as_str())
        .bind(&request.message)
        .bind(request.created_at)
        .bind(request.updated_at)
        .bind(request.responded_at)
        .bind(request.version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<FriendRequest>> {
        let row = sqlx::query("SELECT * FROM friend_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(request_from_row).transpose()
    }

    async fn update(&self, request: &mut FriendRequest) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE friend_requests
            SET status = $3, message = $4, responded_at = $5, updated_at = $6,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(request.id)
        .bind(request.version)
        .bind(request.status.as_str())
        .bind(&request.message)
        .bind(request.responded_at)
        .bind(request.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 1 {
            request.set_version(request.version() + 1);
            return Ok(true);
        }
        if self.exists("friend_requests", request.id).await? {
            Ok(false)
        } else {
            Err(ChatError::not_found(FriendRequest::KIND))
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM friend_requests WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl FriendRequestStore for PgStore {
    async fn find_between(&self, user_a: Uuid, user_b: Uuid) -> Result<Option<FriendRequest>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM friend_requests
            WHERE status <> 'rejected'
              AND ((sender_id = $1 AND receiver_id = $2)
                OR (sender_id = $2 AND receiver_id = $1))
            LIMIT 1
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(request_from_row).transpose()
    }

    async fn pending_received(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<FriendRequest>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM friend_requests
            WHERE receiver_id = $1 AND status = 'pending'
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(request_from_row).collect()
    }

    async fn pending_sent(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<FriendRequest>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM friend_requests
            WHERE sender_id = $1 AND status = 'pending'
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(request_from_row).collect()
    }

    async fn pending_count(&self, user_id: Uuid) -> Result<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM friend_requests WHERE receiver_id = $1 AND status = 'pending'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.get("count");
        Ok(count as u64)
    }

    async fn history_for(&self, user_id: Uuid) -> Result<Vec<FriendRequest>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM friend_requests
            WHERE sender_id = $1 OR receiver_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(request_from_row).collect()
    }

    async fn delete_rejected_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM friend_requests WHERE status = 'rejected' AND responded_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Repository<Notification> for PgStore {
    async fn insert(&self, notification: &Notification) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, notification_type, title, body, data,
                                       read, read_at, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(notification.notification_type.as_str())
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(&notification.data)
        .bind(notification.read)
        .bind(notification.read_at)
        .bind(notification.created_at)
        .bind(notification.updated_at)
        .bind(notification.version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Notification>> {
        let row = sqlx::query("SELECT * FROM notifications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(notification_from_row).transpose()
    }

    async fn update(&self, notification: &mut Notification) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET read = $3, read_at = $4, updated_at = $5, version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(notification.id)
        .bind(notification.version)
        .bind(notification.read)
        .bind(notification.read_at)
        .bind(notification.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 1 {
            notification.set_version(notification.version() + 1);
            return Ok(true);
        }
        if self.exists("notifications", notification.id).await? {
            Ok(false)
        } else {
            Err(ChatError::not_found(Notification::KIND))
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn for_user(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
        unread_only: bool,
    ) -> Result<Vec<Notification>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM notifications
            WHERE user_id = $1 AND ($2 = FALSE OR read = FALSE)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM notifications WHERE user_id = $1 AND read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.get("count");
        Ok(count as u64)
    }

    async fn mark_all_read(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET read = TRUE, read_at = $2, updated_at = $2, version = version + 1
            WHERE user_id = $1 AND read = FALSE
            "#,
        )
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
