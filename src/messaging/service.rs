//! Message Delivery Tracker
//!
//! Message creation, delivery/read acknowledgement, reactions, edits and
//! retention. Delivery and read state must be idempotent: acknowledging
//! twice never produces duplicate records, and the unread count stays
//! consistent with `mark_seen`.
//!
//! History pagination uses timestamp cursors: `before`/`after` message IDs
//! resolve to the referenced message's creation time, then filter strictly
//! on that timestamp. Two messages created in the same instant are not
//! strictly orderable by this scheme; callers needing a total order must
//! not rely on cursor pagination to provide one.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::chat::ChatService;
use crate::error::{ChatError, Result};
use crate::model::{Chat, Message, MessageMedia, MessageType};
use crate::store::{update_with_retry, MessageStore, Store};

/// Input for [`MessageService::send`]
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub content: Option<String>,
    pub message_type: MessageType,
    pub media: Option<MessageMedia>,
    pub reply_to_message_id: Option<Uuid>,
    pub mentions: Vec<Uuid>,
}

impl NewMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }
}

/// Message operations with per-message idempotent delivery state
#[derive(Clone)]
pub struct MessageService {
    store: Arc<dyn Store>,
    chats: ChatService,
}

impl MessageService {
    pub fn new(store: Arc<dyn Store>, chats: ChatService) -> Self {
        Self { store, chats }
    }

    async fn get(&self, message_id: Uuid) -> Result<Message> {
        self.store
            .get_message(message_id)
            .await?
            .ok_or_else(|| ChatError::not_found("message"))
    }

    /// Create a message in a chat
    ///
    /// Membership is enforced here even though callers are expected to
    /// have checked it already. Returns the message and the chat state
    /// after its counters were bumped.
    pub async fn send(
        &self,
        chat_id: Uuid,
        sender_id: Uuid,
        new: NewMessage,
    ) -> Result<(Message, Chat)> {
        let chat = self.chats.get(chat_id).await?;
        if !chat.is_participant(sender_id) {
            return Err(ChatError::not_authorized(
                "you are not a member of this chat",
            ));
        }
        let blank = new
            .content
            .as_deref()
            .map(|c| c.trim().is_empty())
            .unwrap_or(true);
        if blank && new.media.is_none() {
            return Err(ChatError::invalid_input(
                "message needs content or an attachment",
            ));
        }

        let mut message = Message::new(new.content, chat_id, sender_id, new.message_type);
        message.media = new.media;
        message.reply_to_message_id = new.reply_to_message_id;
        message.mentions = new.mentions;
        self.store.insert_message(&message).await?;

        let chat = self
            .chats
            .update_last_message(chat_id, message.id, message.created_at)
            .await?;
        tracing::debug!(message_id = %message.id, %chat_id, "message created");
        Ok((message, chat))
    }

    /// Record delivery to a user; calling twice is a no-op
    pub async fn mark_delivered(&self, message_id: Uuid, user_id: Uuid) -> Result<Message> {
        update_with_retry(self.store.as_ref(), message_id, |message: &mut Message| {
            Ok(message.mark_delivered(user_id))
        })
        .await
    }

    /// Record a read acknowledgement
    ///
    /// Re-marking replaces the prior record with a fresh timestamp; there
    /// is never more than one seen-record per user.
    pub async fn mark_seen(&self, message_id: Uuid, user_id: Uuid) -> Result<Message> {
        let now = Utc::now();
        update_with_retry(self.store.as_ref(), message_id, |message: &mut Message| {
            message.mark_seen(user_id, now);
            Ok(true)
        })
        .await
    }

    /// Add a reaction; re-adding the same `(user, emoji)` pair refreshes
    /// its timestamp instead of duplicating it
    pub async fn add_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> Result<Message> {
        if emoji.trim().is_empty() {
            return Err(ChatError::invalid_input("reaction emoji cannot be blank"));
        }
        let now = Utc::now();
        update_with_retry(self.store.as_ref(), message_id, |message: &mut Message| {
            message.add_reaction(emoji, user_id, now);
            Ok(true)
        })
        .await
    }

    /// Remove a reaction; absent pairs are a no-op
    pub async fn remove_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> Result<Message> {
        update_with_retry(self.store.as_ref(), message_id, |message: &mut Message| {
            Ok(message.remove_reaction(emoji, user_id))
        })
        .await
    }

    /// Edit a message's content, sender only
    pub async fn edit(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        new_content: &str,
    ) -> Result<Message> {
        if new_content.trim().is_empty() {
            return Err(ChatError::invalid_input("message content cannot be blank"));
        }
        let now = Utc::now();
        update_with_retry(self.store.as_ref(), message_id, |message: &mut Message| {
            if message.sender_id != user_id {
                return Err(ChatError::not_authorized(
                    "only the sender can edit a message",
                ));
            }
            message.apply_edit(new_content.to_string(), now);
            Ok(true)
        })
        .await
    }

    /// Soft-delete a message, sender only; irreversible
    ///
    /// The record stays in history as a system-typed tombstone.
    pub async fn soft_delete(&self, message_id: Uuid, user_id: Uuid) -> Result<Message> {
        update_with_retry(self.store.as_ref(), message_id, |message: &mut Message| {
            if message.sender_id != user_id {
                return Err(ChatError::not_authorized(
                    "only the sender can delete a message",
                ));
            }
            message.soft_delete();
            Ok(true)
        })
        .await
    }

    /// One page of chat history, newest first
    ///
    /// Cursor message IDs resolve to their creation timestamps (see the
    /// module docs for the same-instant caveat).
    pub async fn history(
        &self,
        chat_id: Uuid,
        limit: usize,
        before_message_id: Option<Uuid>,
        after_message_id: Option<Uuid>,
    ) -> Result<Vec<Message>> {
        let before = match before_message_id {
            Some(id) => Some(self.get(id).await?.created_at),
            None => None,
        };
        let after = match after_message_id {
            Some(id) => Some(self.get(id).await?.created_at),
            None => None,
        };
        self.store.chat_page(chat_id, limit, before, after).await
    }

    /// Authoritative unread badge count for a user in a chat
    pub async fn unread_count(&self, chat_id: Uuid, user_id: Uuid) -> Result<u64> {
        MessageStore::unread_count(&*self.store, chat_id, user_id).await
    }

    /// Unseen messages for a user in a chat, oldest first
    pub async fn unread_messages(&self, chat_id: Uuid, user_id: Uuid) -> Result<Vec<Message>> {
        self.store.unread_messages(chat_id, user_id).await
    }

    /// One page of messages mentioning the user, newest first, any chat
    pub async fn mentions_of(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>> {
        self.store.mentions_of(user_id, limit, offset).await
    }

    /// Copy a message into another chat
    ///
    /// The forwarder must be a participant of the target chat. The copy
    /// records where it came from and starts with clean delivery state.
    pub async fn forward(
        &self,
        message_id: Uuid,
        target_chat_id: Uuid,
        sender_id: Uuid,
    ) -> Result<(Message, Chat)> {
        let original = self.get(message_id).await?;
        let chat = self.chats.get(target_chat_id).await?;
        if !chat.is_participant(sender_id) {
            return Err(ChatError::not_authorized(
                "you are not a member of this chat",
            ));
        }

        let mut copy = Message::new(
            original.content.clone(),
            target_chat_id,
            sender_id,
            original.message_type,
        );
        copy.media = original.media.clone();
        copy.forwarded_from_user_id = Some(original.sender_id);
        copy.forwarded_from_chat_id = Some(original.chat_id);
        self.store.insert_message(&copy).await?;

        let chat = self
            .chats
            .update_last_message(target_chat_id, copy.id, copy.created_at)
            .await?;
        Ok((copy, chat))
    }

    /// Schedule a message for automatic expiry, sender only
    pub async fn schedule_delete(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        delete_at: chrono::DateTime<Utc>,
    ) -> Result<Message> {
        update_with_retry(self.store.as_ref(), message_id, |message: &mut Message| {
            if message.sender_id != user_id {
                return Err(ChatError::not_authorized(
                    "only the sender can schedule deletion",
                ));
            }
            message.delete_at = Some(delete_at);
            Ok(true)
        })
        .await
    }

    /// Delete all messages whose scheduled expiry has passed
    pub async fn expire_scheduled(&self) -> Result<u64> {
        self.store.delete_expired(Utc::now()).await
    }

    /// Delete all messages older than the retention window
    pub async fn purge_older_than(&self, days: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(days);
        crate::store::MessageStore::delete_created_before(self.store.as_ref(), cutoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DELETED_MESSAGE_TOMBSTONE;
    use crate::store::memory::MemoryStore;
    use assert_matches::assert_matches;

    struct Fixture {
        service: MessageService,
        chats: ChatService,
        chat: Chat,
        alice: Uuid,
        bob: Uuid,
    }

    async fn fixture() -> Fixture {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let chats = ChatService::new(store.clone());
        let service = MessageService::new(store, chats.clone());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let chat = chats
            .create_group_chat(alice, &[bob], "team", None)
            .await
            .unwrap();
        Fixture {
            service,
            chats,
            chat,
            alice,
            bob,
        }
    }

    #[tokio::test]
    async fn test_send_bumps_chat_counters() {
        let f = fixture().await;
        let (message, chat) = f
            .service
            .send(f.chat.id, f.alice, NewMessage::text("hello"))
            .await
            .unwrap();
        assert_eq!(chat.message_count, 1);
        assert_eq!(chat.last_message_id, Some(message.id));
        assert_eq!(chat.last_message_at, Some(message.created_at));
    }

    #[tokio::test]
    async fn test_send_by_non_member_rejected() {
        let f = fixture().await;
        let err = f
            .service
            .send(f.chat.id, Uuid::new_v4(), NewMessage::text("hi"))
            .await
            .unwrap_err();
        assert_matches!(err, ChatError::NotAuthorized { .. });
    }

    #[tokio::test]
    async fn test_mentions_feed_spans_chats() {
        let f = fixture().await;
        let other = f
            .chats
            .create_group_chat(f.alice, &[f.bob], "side", None)
            .await
            .unwrap();

        let mut tagged = NewMessage::text("ping bob");
        tagged.mentions = vec![f.bob];
        let (first, _) = f.service.send(f.chat.id, f.alice, tagged).await.unwrap();

        f.service
            .send(f.chat.id, f.alice, NewMessage::text("plain"))
            .await
            .unwrap();

        let mut tagged_again = NewMessage::text("bob again");
        tagged_again.mentions = vec![f.bob];
        let (second, _) = f
            .service
            .send(other.id, f.alice, tagged_again)
            .await
            .unwrap();

        let feed = f.service.mentions_of(f.bob, 10, 0).await.unwrap();
        let ids: Vec<Uuid> = feed.iter().map(|m| m.id).collect();
        assert_eq!(feed.len(), 2);
        assert!(ids.contains(&first.id));
        assert!(ids.contains(&second.id));

        assert_eq!(f.service.mentions_of(f.bob, 1, 1).await.unwrap().len(), 1);
        assert!(f.service.mentions_of(f.alice, 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_blank_without_media_rejected() {
        let f = fixture().await;
        let err = f
            .service
            .send(f.chat.id, f.alice, NewMessage::text("   "))
            .await
            .unwrap_err();
        assert_matches!(err, ChatError::InvalidInput { .. });
    }

    #[tokio::test]
    async fn test_mark_seen_twice_keeps_one_record() {
        let f = fixture().await;
        let (message, _) = f
            .service
            .send(f.chat.id, f.alice, NewMessage::text("hello"))
            .await
            .unwrap();

        f.service.mark_seen(message.id, f.bob).await.unwrap();
        let message = f.service.mark_seen(message.id, f.bob).await.unwrap();
        assert_eq!(message.seen_by.len(), 1);
        assert_eq!(message.seen_by[0].user_id, f.bob);
    }

    #[tokio::test]
    async fn test_unread_count_tracks_mark_seen() {
        let f = fixture().await;
        let mut ids = Vec::new();
        for i in 0..4 {
            let (message, _) = f
                .service
                .send(f.chat.id, f.alice, NewMessage::text(format!("m{i}")))
                .await
                .unwrap();
            ids.push(message.id);
        }
        assert_eq!(f.service.unread_count(f.chat.id, f.bob).await.unwrap(), 4);
        // sender owes nothing
        assert_eq!(f.service.unread_count(f.chat.id, f.alice).await.unwrap(), 0);

        for id in &ids {
            f.service.mark_seen(*id, f.bob).await.unwrap();
        }
        assert_eq!(f.service.unread_count(f.chat.id, f.bob).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reaction_idempotence_and_removal() {
        let f = fixture().await;
        let (message, _) = f
            .service
            .send(f.chat.id, f.alice, NewMessage::text("hello"))
            .await
            .unwrap();

        f.service.add_reaction(message.id, f.bob, "👍").await.unwrap();
        let message2 = f.service.add_reaction(message.id, f.bob, "👍").await.unwrap();
        assert_eq!(message2.reactions.len(), 1);

        let message3 = f
            .service
            .remove_reaction(message.id, f.bob, "👍")
            .await
            .unwrap();
        assert!(message3.reactions.is_empty());
    }

    #[tokio::test]
    async fn test_edit_sender_only_preserves_original() {
        let f = fixture().await;
        let (message, _) = f
            .service
            .send(f.chat.id, f.alice, NewMessage::text("draft"))
            .await
            .unwrap();

        let err = f.service.edit(message.id, f.bob, "hijack").await.unwrap_err();
        assert_matches!(err, ChatError::NotAuthorized { .. });

        f.service.edit(message.id, f.alice, "first").await.unwrap();
        let edited = f.service.edit(message.id, f.alice, "second").await.unwrap();
        assert_eq!(edited.original_content.as_deref(), Some("draft"));
        assert_eq!(edited.content.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_soft_delete_leaves_tombstone_in_history() {
        let f = fixture().await;
        let (m1, _) = f
            .service
            .send(f.chat.id, f.alice, NewMessage::text("first"))
            .await
            .unwrap();
        let (_m2, _) = f
            .service
            .send(f.chat.id, f.alice, NewMessage::text("second"))
            .await
            .unwrap();

        let deleted = f.service.soft_delete(m1.id, f.alice).await.unwrap();
        assert_eq!(deleted.content.as_deref(), Some(DELETED_MESSAGE_TOMBSTONE));
        assert_eq!(deleted.message_type, MessageType::System);
        assert!(deleted.media.is_none());

        // tombstone still occupies its slot in history
        let page = f.service.history(f.chat.id, 10, None, None).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[1].id, m1.id);
    }

    #[tokio::test]
    async fn test_history_cursors() {
        let f = fixture().await;
        let mut ids = Vec::new();
        for i in 0..3 {
            let (mut message, _) = f
                .service
                .send(f.chat.id, f.alice, NewMessage::text(format!("m{i}")))
                .await
                .unwrap();
            // spread creation times so the cursors are unambiguous
            message.created_at = Utc::now() + Duration::seconds(i);
            let store = &f.service.store;
            while !crate::store::Repository::<Message>::update(store.as_ref(), &mut message)
                .await
                .unwrap()
            {}
            ids.push(message.id);
        }

        let older = f
            .service
            .history(f.chat.id, 10, Some(ids[2]), None)
            .await
            .unwrap();
        assert_eq!(older.iter().map(|m| m.id).collect::<Vec<_>>(), vec![ids[1], ids[0]]);

        let newer = f
            .service
            .history(f.chat.id, 10, None, Some(ids[0]))
            .await
            .unwrap();
        assert_eq!(newer.iter().map(|m| m.id).collect::<Vec<_>>(), vec![ids[2], ids[1]]);
    }

    #[tokio::test]
    async fn test_forward_records_provenance() {
        let f = fixture().await;
        let (original, _) = f
            .service
            .send(f.chat.id, f.alice, NewMessage::text("forward me"))
            .await
            .unwrap();
        let other = f
            .chats
            .create_group_chat(f.bob, &[], "other", None)
            .await
            .unwrap();

        let (copy, chat) = f
            .service
            .forward(original.id, other.id, f.bob)
            .await
            .unwrap();
        assert_eq!(copy.content.as_deref(), Some("forward me"));
        assert_eq!(copy.forwarded_from_user_id, Some(f.alice));
        assert_eq!(copy.forwarded_from_chat_id, Some(f.chat.id));
        assert!(copy.seen_by.is_empty());
        assert_eq!(chat.message_count, 1);

        let err = f
            .service
            .forward(original.id, other.id, f.alice)
            .await
            .unwrap_err();
        assert_matches!(err, ChatError::NotAuthorized { .. });
    }

    #[tokio::test]
    async fn test_scheduled_expiry() {
        let f = fixture().await;
        let (message, _) = f
            .service
            .send(f.chat.id, f.alice, NewMessage::text("ephemeral"))
            .await
            .unwrap();

        f.service
            .schedule_delete(message.id, f.alice, Utc::now() - Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(f.service.expire_scheduled().await.unwrap(), 1);
        // idempotent: nothing left to delete
        assert_eq!(f.service.expire_scheduled().await.unwrap(), 0);
    }
}
