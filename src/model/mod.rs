//! Domain Documents
//!
//! Persisted document types shared by every service in the crate:
//! users, chats, messages, friend requests and notifications.
//!
//! Each document carries `created_at`/`updated_at` timestamps and a
//! `version` counter used by the stores for optimistic concurrency;
//! the version is never interpreted by domain logic.

pub mod chat;
pub mod friend_request;
pub mod message;
pub mod notification;
pub mod user;

pub use chat::{Chat, ChatParticipant, ChatType};
pub use friend_request::{FriendRequest, FriendRequestStatus};
pub use message::{
    Message, MessageMedia, MessageReaction, MessageType, SeenRecord, DELETED_MESSAGE_TOMBSTONE,
};
pub use notification::{Notification, NotificationType};
pub use user::{User, UserStatus};
