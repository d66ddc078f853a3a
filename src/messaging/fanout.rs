//! Message Fan-out
//!
//! After a message is created, fan-out delivers it to live subscribers via
//! the per-chat broadcast channel and falls back to persisted notifications
//! for participants who are not currently subscribed. Mentioned users get a
//! dedicated mention notification on top.
//!
//! The subscription index is advisory: when it cannot be read, every
//! participant is treated as unsubscribed and notified.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::Result;
use crate::model::{Chat, Message};
use crate::notifications::NotificationService;
use crate::realtime::{ChatEvent, EventBroadcast, SubscriptionIndex};
use crate::store::{Store, UserStore};

/// What a fan-out pass did, for logging and tests
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FanoutOutcome {
    /// Live receivers the broadcast reached
    pub live_receivers: usize,
    /// Message notifications created for unsubscribed participants
    pub notified: usize,
    /// Mention notifications created
    pub mentions_notified: usize,
}

/// Routes created messages to live subscribers and notifications
#[derive(Clone)]
pub struct Fanout {
    store: Arc<dyn Store>,
    subscriptions: SubscriptionIndex,
    broadcast: EventBroadcast,
    notifications: NotificationService,
}

impl Fanout {
    pub fn new(
        store: Arc<dyn Store>,
        subscriptions: SubscriptionIndex,
        broadcast: EventBroadcast,
        notifications: NotificationService,
    ) -> Self {
        Self {
            store,
            subscriptions,
            broadcast,
            notifications,
        }
    }

    /// Fan a freshly created message out to its chat
    pub async fn message_created(&self, chat: &Chat, message: &Message) -> Result<FanoutOutcome> {
        let subscribers: Vec<Uuid> = self.subscriptions.subscribers(chat.id).await;

        let live_receivers = self
            .broadcast
            .publish(chat.id, ChatEvent::MessageCreated(message.clone()));

        let sender = match self.store.get_user(message.sender_id).await? {
            Some(sender) => sender,
            None => {
                tracing::warn!(sender_id = %message.sender_id, "sender record missing, skipping notifications");
                return Ok(FanoutOutcome {
                    live_receivers,
                    ..FanoutOutcome::default()
                });
            }
        };

        let content = message.content.clone().unwrap_or_default();
        let chat_name = chat.name.as_deref();
        let mut outcome = FanoutOutcome {
            live_receivers,
            ..FanoutOutcome::default()
        };

        for participant in &chat.participants {
            if participant.user_id == message.sender_id
                || subscribers.contains(&participant.user_id)
            {
                continue;
            }
            self.notifications
                .notify_new_message(
                    participant.user_id,
                    &sender,
                    chat.id,
                    message.id,
                    &content,
                    chat_name,
                )
                .await?;
            outcome.notified += 1;
        }

        for &mentioned in &message.mentions {
            if mentioned == message.sender_id || !chat.is_participant(mentioned) {
                continue;
            }
            self.notifications
                .notify_mention(mentioned, &sender, chat.id, message.id, &content, chat_name)
                .await?;
            outcome.mentions_notified += 1;
        }

        tracing::debug!(
            chat_id = %chat.id,
            message_id = %message.id,
            live = outcome.live_receivers,
            notified = outcome.notified,
            mentions = outcome.mentions_notified,
            "message fanned out"
        );
        Ok(outcome)
    }

    /// Fan out an update (edit, reaction, soft delete) to live subscribers
    ///
    /// Updates never create notifications; offline users catch up through
    /// history.
    pub fn message_updated(&self, chat_id: Uuid, message: &Message) -> usize {
        self.broadcast
            .publish(chat_id, ChatEvent::MessageUpdated(message.clone()))
    }
}
