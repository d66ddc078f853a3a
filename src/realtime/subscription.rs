//! Chat Subscription Index
//!
//! Tracks, per chat, which users should receive fan-out events. The index
//! is independent of the persisted participant list and may lag it; it is
//! refreshed opportunistically as clients attach to a chat session.
//! Access-control decisions never consult this index alone.
//!
//! Transient failures degrade to the empty subscriber set so message
//! sending keeps working without live fan-out.

use std::sync::Arc;

use uuid::Uuid;

use crate::ephemeral::EphemeralStore;

fn subscribers_key(chat_id: Uuid) -> String {
    format!("subscribers:chat:{chat_id}")
}

/// Per-chat fan-out target set
#[derive(Clone)]
pub struct SubscriptionIndex {
    ephemeral: Arc<dyn EphemeralStore>,
}

impl SubscriptionIndex {
    pub fn new(ephemeral: Arc<dyn EphemeralStore>) -> Self {
        Self { ephemeral }
    }

    /// Add a user to the chat's fan-out set
    pub async fn subscribe(&self, chat_id: Uuid, user_id: Uuid) {
        if let Err(e) = self
            .ephemeral
            .set_add(&subscribers_key(chat_id), &user_id.to_string(), None)
            .await
        {
            tracing::warn!(%chat_id, %user_id, error = %e, "subscribe dropped, ephemeral store unavailable");
        }
    }

    /// Remove a user from the chat's fan-out set
    pub async fn unsubscribe(&self, chat_id: Uuid, user_id: Uuid) {
        if let Err(e) = self
            .ephemeral
            .set_remove(&subscribers_key(chat_id), &user_id.to_string())
            .await
        {
            tracing::warn!(%chat_id, %user_id, error = %e, "unsubscribe dropped, ephemeral store unavailable");
        }
    }

    /// The chat's current fan-out targets; empty when unavailable
    ///
    /// Malformed entries are skipped rather than failing the read.
    pub async fn subscribers(&self, chat_id: Uuid) -> Vec<Uuid> {
        match self.ephemeral.set_members(&subscribers_key(chat_id)).await {
            Ok(members) => members
                .iter()
                .filter_map(|raw| Uuid::parse_str(raw).ok())
                .collect(),
            Err(e) => {
                tracing::warn!(%chat_id, error = %e, "subscriber read failed, reporting empty set");
                Vec::new()
            }
        }
    }

    /// Whether the user is currently in the chat's fan-out set
    pub async fn is_subscribed(&self, chat_id: Uuid, user_id: Uuid) -> bool {
        self.subscribers(chat_id).await.contains(&user_id)
    }
}
