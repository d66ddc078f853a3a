//! Notification Dispatcher
//!
//! Translates domain events (new message, mention, friend request, chat
//! invite) into persisted per-user notification records. Notifications are
//! created only here; the only mutation afterwards is the one-way
//! unread-to-read transition.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{ChatError, Result};
use crate::model::{Notification, NotificationType, User};
use crate::store::{update_with_retry, NotificationStore, Store};

/// Notification bodies are truncated to this many characters
const BODY_PREVIEW_LEN: usize = 100;

fn preview(content: &str) -> String {
    if content.chars().count() > BODY_PREVIEW_LEN {
        let truncated: String = content.chars().take(BODY_PREVIEW_LEN).collect();
        format!("{truncated}...")
    } else {
        content.to_string()
    }
}

/// Creates, lists and retires per-user notifications
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn Store>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn create(&self, notification: Notification) -> Result<Notification> {
        self.store.insert_notification(&notification).await?;
        tracing::debug!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            kind = notification.notification_type.as_str(),
            "notification created"
        );
        Ok(notification)
    }

    /// Notify a recipient about a new message they have not seen live
    pub async fn notify_new_message(
        &self,
        recipient: Uuid,
        sender: &User,
        chat_id: Uuid,
        message_id: Uuid,
        content: &str,
        chat_name: Option<&str>,
    ) -> Result<Notification> {
        let title = match chat_name {
            Some(name) => format!("New message in {name}"),
            None => format!("New message from {}", sender.full_name()),
        };
        self.create(Notification::new(
            recipient,
            NotificationType::Message,
            title,
            preview(content),
            serde_json::json!({
                "sender_id": sender.id,
                "sender_username": sender.username,
                "sender_full_name": sender.full_name(),
                "chat_id": chat_id,
                "message_id": message_id,
                "chat_name": chat_name,
            }),
        ))
        .await
    }

    /// Notify a user that a message mentioned them
    pub async fn notify_mention(
        &self,
        recipient: Uuid,
        sender: &User,
        chat_id: Uuid,
        message_id: Uuid,
        content: &str,
        chat_name: Option<&str>,
    ) -> Result<Notification> {
        let title = match chat_name {
            Some(name) => format!("You were mentioned in {name}"),
            None => format!("You were mentioned by {}", sender.full_name()),
        };
        self.create(Notification::new(
            recipient,
            NotificationType::Mention,
            title,
            preview(content),
            serde_json::json!({
                "sender_id": sender.id,
                "sender_username": sender.username,
                "sender_full_name": sender.full_name(),
                "chat_id": chat_id,
                "message_id": message_id,
                "chat_name": chat_name,
            }),
        ))
        .await
    }

    /// Notify a user about an incoming friend request
    pub async fn notify_friend_request(
        &self,
        recipient: Uuid,
        sender: &User,
        request_id: Uuid,
        request_message: Option<&str>,
    ) -> Result<Notification> {
        let body = request_message
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} wants to be your friend", sender.full_name()));
        self.create(Notification::new(
            recipient,
            NotificationType::FriendRequest,
            format!("Friend request from {}", sender.full_name()),
            body,
            serde_json::json!({
                "sender_id": sender.id,
                "sender_username": sender.username,
                "sender_full_name": sender.full_name(),
                "friend_request_id": request_id,
                "request_message": request_message,
            }),
        ))
        .await
    }

    /// Notify a user that they were added to a group chat
    pub async fn notify_chat_invite(
        &self,
        recipient: Uuid,
        inviter: &User,
        chat_id: Uuid,
        chat_name: &str,
    ) -> Result<Notification> {
        self.create(Notification::new(
            recipient,
            NotificationType::ChatInvite,
            format!("Invited to {chat_name}"),
            format!("{} invited you to join {chat_name}", inviter.full_name()),
            serde_json::json!({
                "inviter_id": inviter.id,
                "inviter_username": inviter.username,
                "inviter_full_name": inviter.full_name(),
                "chat_id": chat_id,
                "chat_name": chat_name,
            }),
        ))
        .await
    }

    /// One page of the user's notifications, newest first
    pub async fn list(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
        unread_only: bool,
    ) -> Result<Vec<Notification>> {
        self.store.for_user(user_id, limit, offset, unread_only).await
    }

    /// Mark one notification read; owner only, one-way
    pub async fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> Result<Notification> {
        let now = Utc::now();
        update_with_retry(
            self.store.as_ref(),
            notification_id,
            |notification: &mut Notification| {
                if notification.user_id != user_id {
                    return Err(ChatError::not_authorized(
                        "notification belongs to another user",
                    ));
                }
                Ok(notification.mark_read(now))
            },
        )
        .await
    }

    /// Mark everything read; returns how many notifications changed
    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        self.store.mark_all_read(user_id, Utc::now()).await
    }

    /// Unread badge count
    pub async fn unread_count(&self, user_id: Uuid) -> Result<u64> {
        crate::store::NotificationStore::unread_count(self.store.as_ref(), user_id).await
    }

    /// Delete a notification; owner only
    pub async fn delete(&self, notification_id: Uuid, user_id: Uuid) -> Result<bool> {
        let notification = self
            .store
            .get_notification(notification_id)
            .await?
            .ok_or_else(|| ChatError::not_found("notification"))?;
        if notification.user_id != user_id {
            return Err(ChatError::not_authorized(
                "notification belongs to another user",
            ));
        }
        crate::store::Repository::<Notification>::delete(self.store.as_ref(), notification_id)
            .await
    }
}
