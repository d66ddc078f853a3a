//! Chat Event Broadcasting
//!
//! Per-chat `tokio::sync::broadcast` channels for live event delivery.
//! Each chat gets its own channel to prevent cross-talk between chats.
//! Publishing to a chat with no live receivers is a silent no-op.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::model::{Message, UserStatus};

/// Per-channel buffer size before slow receivers start lagging
const CHANNEL_CAPACITY: usize = 100;

/// Events fanned out to live chat subscribers
///
/// The message variants are published by the fan-out pipeline. `Typing`
/// and `PresenceChanged` are connection-scoped: the websocket layer
/// holding the connections publishes them to the chats it knows the
/// user is viewing, through [`EventBroadcast::publish`].
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A new message landed in the chat
    MessageCreated(Message),
    /// An existing message changed (edit, reaction, soft delete)
    MessageUpdated(Message),
    /// A participant is typing
    Typing { chat_id: Uuid, user_id: Uuid },
    /// A participant's presence changed
    PresenceChanged {
        user_id: Uuid,
        status: UserStatus,
        at: DateTime<Utc>,
    },
}

/// Registry of per-chat broadcast channels
#[derive(Clone, Default)]
pub struct EventBroadcast {
    channels: Arc<Mutex<HashMap<Uuid, broadcast::Sender<ChatEvent>>>>,
}

impl EventBroadcast {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the broadcast sender for a chat
    pub fn sender(&self, chat_id: Uuid) -> broadcast::Sender<ChatEvent> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(chat_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Subscribe to a chat's event stream
    pub fn subscribe(&self, chat_id: Uuid) -> broadcast::Receiver<ChatEvent> {
        self.sender(chat_id).subscribe()
    }

    /// Publish an event to a chat's subscribers
    ///
    /// Returns the number of live receivers the event reached.
    pub fn publish(&self, chat_id: Uuid, event: ChatEvent) -> usize {
        let sender = {
            let channels = self.channels.lock().unwrap();
            channels.get(&chat_id).cloned()
        };
        match sender {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Number of live receivers on a chat's channel
    pub fn receiver_count(&self, chat_id: Uuid) -> usize {
        self.channels
            .lock()
            .unwrap()
            .get(&chat_id)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    /// Drop channels with no live receivers
    pub fn cleanup_inactive_channels(&self) {
        self.channels
            .lock()
            .unwrap()
            .retain(|_, sender| sender.receiver_count() > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageType;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let broadcast = EventBroadcast::new();
        let chat_id = Uuid::new_v4();
        let mut rx = broadcast.subscribe(chat_id);

        let msg = Message::new(
            Some("hi".into()),
            chat_id,
            Uuid::new_v4(),
            MessageType::Text,
        );
        let reached = broadcast.publish(chat_id, ChatEvent::MessageCreated(msg.clone()));
        assert_eq!(reached, 1);

        match rx.recv().await.unwrap() {
            ChatEvent::MessageCreated(received) => assert_eq!(received.id, msg.id),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let broadcast = EventBroadcast::new();
        let reached = broadcast.publish(
            Uuid::new_v4(),
            ChatEvent::Typing {
                chat_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
            },
        );
        assert_eq!(reached, 0);
    }

    #[tokio::test]
    async fn test_channels_are_isolated_per_chat() {
        let broadcast = EventBroadcast::new();
        let chat_a = Uuid::new_v4();
        let chat_b = Uuid::new_v4();
        let _rx_a = broadcast.subscribe(chat_a);
        let mut rx_b = broadcast.subscribe(chat_b);

        broadcast.publish(
            chat_a,
            ChatEvent::Typing {
                chat_id: chat_a,
                user_id: Uuid::new_v4(),
            },
        );
        assert!(matches!(
            rx_b.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_cleanup_drops_orphaned_channels() {
        let broadcast = EventBroadcast::new();
        let chat_id = Uuid::new_v4();
        {
            let _rx = broadcast.subscribe(chat_id);
            assert_eq!(broadcast.receiver_count(chat_id), 1);
        }
        broadcast.cleanup_inactive_channels();
        assert_eq!(broadcast.receiver_count(chat_id), 0);
        assert!(broadcast.channels.lock().unwrap().is_empty());
    }
}
