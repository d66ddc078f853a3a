//! Session Registry
//!
//! Tracks the live connection identifiers of each user in a TTL'd set.
//! The set's expiry clock is refreshed on every add, so an idle user's
//! sessions age out together. A user counts as connected while the set is
//! non-empty.
//!
//! All operations are best-effort: an unavailable ephemeral store drops
//! writes with a warning and makes reads report an empty set.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::Settings;
use crate::ephemeral::EphemeralStore;

fn sessions_key(user_id: Uuid) -> String {
    format!("sessions:user:{user_id}")
}

/// Per-user live session set
#[derive(Clone)]
pub struct SessionRegistry {
    ephemeral: Arc<dyn EphemeralStore>,
    session_ttl: std::time::Duration,
    max_sessions_per_user: usize,
}

impl SessionRegistry {
    pub fn new(ephemeral: Arc<dyn EphemeralStore>, settings: &Settings) -> Self {
        Self {
            ephemeral,
            session_ttl: settings.session_ttl,
            max_sessions_per_user: settings.max_sessions_per_user,
        }
    }

    /// Register a session and refresh the set's expiry clock
    pub async fn add_session(&self, user_id: Uuid, session_id: &str) {
        if let Err(e) = self
            .ephemeral
            .set_add(&sessions_key(user_id), session_id, Some(self.session_ttl))
            .await
        {
            tracing::warn!(%user_id, session_id, error = %e, "session registration dropped, ephemeral store unavailable");
        }
    }

    /// Unregister a session
    pub async fn remove_session(&self, user_id: Uuid, session_id: &str) {
        if let Err(e) = self
            .ephemeral
            .set_remove(&sessions_key(user_id), session_id)
            .await
        {
            tracing::warn!(%user_id, session_id, error = %e, "session removal dropped, ephemeral store unavailable");
        }
    }

    /// The user's live session identifiers; empty when unavailable
    pub async fn sessions(&self, user_id: Uuid) -> Vec<String> {
        match self.ephemeral.set_members(&sessions_key(user_id)).await {
            Ok(members) => members,
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "session read failed, reporting no sessions");
                Vec::new()
            }
        }
    }

    /// Whether the user has any live connection
    pub async fn is_connected(&self, user_id: Uuid) -> bool {
        !self.sessions(user_id).await.is_empty()
    }

    /// Whether the user has hit the configured connection cap
    ///
    /// Checked by the connection-accept collaborator before registering a
    /// new session.
    pub async fn at_capacity(&self, user_id: Uuid) -> bool {
        self.sessions(user_id).await.len() >= self.max_sessions_per_user
    }
}
