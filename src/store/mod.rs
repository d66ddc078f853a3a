//! Persisted Storage
//!
//! All durable state lives behind the [`Repository`] trait plus one
//! extension trait per entity kind. Services depend only on these traits,
//! so the same logic runs against the in-memory store in tests and the
//! Postgres store in production.
//!
//! # Concurrency Model
//!
//! Every document carries a `version` counter. [`Repository::update`] is a
//! compare-and-swap: it persists the document only if the stored version
//! still matches, and bumps the version on success. Read-modify-write
//! operations go through [`update_with_retry`], which re-reads and re-applies
//! the mutation on CAS failure so concurrent writers never lose updates.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{ChatError, Result};
use crate::model::{Chat, ChatType, FriendRequest, FriendRequestStatus, Message, Notification, User};

/// Number of CAS attempts before a read-modify-write gives up
const MAX_CAS_ATTEMPTS: u32 = 8;

/// A persisted document with identity and an optimistic-lock version
pub trait Entity: Clone + Send + Sync + 'static {
    /// Singular entity kind name used in not-found errors and logs
    const KIND: &'static str;

    fn id(&self) -> Uuid;
    fn version(&self) -> i64;
    fn set_version(&mut self, version: i64);
    /// Refresh the `updated_at` stamp before persisting
    fn touch(&mut self, now: DateTime<Utc>);
}

macro_rules! impl_entity {
    ($ty:ty, $kind:literal) => {
        impl Entity for $ty {
            const KIND: &'static str = $kind;

            fn id(&self) -> Uuid {
                self.id
            }

            fn version(&self) -> i64 {
                self.version
            }

            fn set_version(&mut self, version: i64) {
                self.version = version;
            }

            fn touch(&mut self, now: DateTime<Utc>) {
                self.updated_at = now;
            }
        }
    };
}

impl_entity!(User, "user");
impl_entity!(Chat, "chat");
impl_entity!(Message, "message");
impl_entity!(FriendRequest, "friend request");
impl_entity!(Notification, "notification");

/// Generic CRUD over one entity kind with optimistic locking
#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    /// Insert a new document; fails if the id already exists
    async fn insert(&self, entity: &E) -> Result<()>;

    /// Fetch a document by id
    async fn get(&self, id: Uuid) -> Result<Option<E>>;

    /// Compare-and-swap update
    ///
    /// Persists `entity` only if the stored version still equals
    /// `entity.version()`. On success the version is bumped both in the
    /// store and on `entity`, and `true` is returned. Returns `false` on
    /// version mismatch so the caller can re-read and retry.
    async fn update(&self, entity: &mut E) -> Result<bool>;

    /// Delete by id; returns whether a document was removed
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// Re-read/re-apply loop around [`Repository::update`]
///
/// `apply` returns `Ok(true)` when the document changed and must be
/// persisted, `Ok(false)` for a no-op (the current document is returned
/// without a write). Domain errors from `apply` abort the loop immediately.
pub async fn update_with_retry<E, S, F>(store: &S, id: Uuid, mut apply: F) -> Result<E>
where
    E: Entity,
    S: Repository<E> + ?Sized,
    F: FnMut(&mut E) -> Result<bool> + Send,
{
    for attempt in 0..MAX_CAS_ATTEMPTS {
        let mut entity = store
            .get(id)
            .await?
            .ok_or_else(|| ChatError::not_found(E::KIND))?;
        if !apply(&mut entity)? {
            return Ok(entity);
        }
        entity.touch(Utc::now());
        if store.update(&mut entity).await? {
            return Ok(entity);
        }
        tracing::debug!(entity = E::KIND, %id, attempt, "version conflict, retrying update");
    }
    Err(ChatError::transient("concurrent update contention"))
}

/// User persistence
#[async_trait]
pub trait UserStore: Repository<User> {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        Repository::<User>::get(self, id).await
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        Repository::<User>::insert(self, user).await
    }

    /// Fetch several users at once; missing ids are silently skipped
    async fn get_users(&self, ids: &[Uuid]) -> Result<Vec<User>>;
}

/// Chat persistence
#[async_trait]
pub trait ChatStore: Repository<Chat> {
    async fn get_chat(&self, id: Uuid) -> Result<Option<Chat>> {
        Repository::<Chat>::get(self, id).await
    }

    async fn insert_chat(&self, chat: &Chat) -> Result<()> {
        Repository::<Chat>::insert(self, chat).await
    }

    /// Find the existing private chat between two users, if any
    async fn find_private_chat(&self, user_a: Uuid, user_b: Uuid) -> Result<Option<Chat>>;

    /// All chats the user participates in, most recent activity first
    async fn chats_for_user(&self, user_id: Uuid) -> Result<Vec<Chat>>;
}

/// Message persistence
#[async_trait]
pub trait MessageStore: Repository<Message> {
    async fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        Repository::<Message>::get(self, id).await
    }

    async fn insert_message(&self, message: &Message) -> Result<()> {
        Repository::<Message>::insert(self, message).await
    }

    /// One page of chat history, newest first
    ///
    /// `before` / `after` are exclusive creation-time bounds used as
    /// pagination cursors.
    async fn chat_page(
        &self,
        chat_id: Uuid,
        limit: usize,
        before: Option<DateTime<Utc>>,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>>;

    /// Messages in the chat not yet seen by the user, oldest first,
    /// excluding the user's own messages
    async fn unread_messages(&self, chat_id: Uuid, user_id: Uuid) -> Result<Vec<Message>>;

    /// Count of messages in the chat not yet seen by the user
    async fn unread_count(&self, chat_id: Uuid, user_id: Uuid) -> Result<u64>;

    /// Messages mentioning the user across all chats, newest first
    async fn mentions_of(&self, user_id: Uuid, limit: usize, offset: usize)
        -> Result<Vec<Message>>;

    /// Delete messages whose scheduled expiry has passed; returns the count
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Delete messages created before the cutoff; returns the count
    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Friend request persistence
#[async_trait]
pub trait FriendRequestStore: Repository<FriendRequest> {
    async fn get_friend_request(&self, id: Uuid) -> Result<Option<FriendRequest>> {
        Repository::<FriendRequest>::get(self, id).await
    }

    async fn insert_friend_request(&self, request: &FriendRequest) -> Result<()> {
        Repository::<FriendRequest>::insert(self, request).await
    }

    /// The non-rejected request between two users in either direction, if any
    async fn find_between(&self, user_a: Uuid, user_b: Uuid) -> Result<Option<FriendRequest>>;

    /// One page of pending requests addressed to the user, newest first
    async fn pending_received(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<FriendRequest>>;

    /// One page of pending requests the user has sent, newest first
    async fn pending_sent(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<FriendRequest>>;

    /// Count of pending requests addressed to the user
    async fn pending_count(&self, user_id: Uuid) -> Result<u64>;

    /// Every request the user was involved in, newest first
    async fn history_for(&self, user_id: Uuid) -> Result<Vec<FriendRequest>>;

    /// Delete rejected requests older than the cutoff; returns the count
    async fn delete_rejected_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Notification persistence
#[async_trait]
pub trait NotificationStore: Repository<Notification> {
    async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>> {
        Repository::<Notification>::get(self, id).await
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        Repository::<Notification>::insert(self, notification).await
    }

    /// One page of the user's notifications, newest first
    async fn for_user(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
        unread_only: bool,
    ) -> Result<Vec<Notification>>;

    /// Count of unread notifications for the user
    async fn unread_count(&self, user_id: Uuid) -> Result<u64>;

    /// Mark all of the user's notifications read; returns how many changed
    async fn mark_all_read(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<u64>;

    /// Delete notifications created before the cutoff; returns the count
    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Everything the services need from the persisted store
pub trait Store:
    UserStore + ChatStore + MessageStore + FriendRequestStore + NotificationStore
{
}

impl<T> Store for T where
    T: UserStore + ChatStore + MessageStore + FriendRequestStore + NotificationStore
{
}

/// Canonical ordering helper for private-chat lookups
pub(crate) fn is_private_between(chat: &Chat, user_a: Uuid, user_b: Uuid) -> bool {
    chat.chat_type == ChatType::Private
        && chat.is_participant(user_a)
        && chat.is_participant(user_b)
}

/// True if the request blocks creating a new one between the pair
pub(crate) fn blocks_new_request(request: &FriendRequest) -> bool {
    request.status != FriendRequestStatus::Rejected
}
