//! Presence Tracking
//!
//! Best-effort online status per user. The live signal is a TTL'd key in
//! the ephemeral store; a missing or expired key reads as offline. Each
//! presence change is also mirrored into the user document (`status` and
//! `last_seen`) so "last seen" survives the ephemeral key expiring.
//!
//! When the ephemeral store is down, reads degrade to `Offline` and writes
//! are dropped with a warning; the persisted mirror write still surfaces
//! its errors because the user document has no fallback.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::config::Settings;
use crate::ephemeral::EphemeralStore;
use crate::error::Result;
use crate::model::{User, UserStatus};
use crate::store::{update_with_retry, Store};

fn presence_key(user_id: Uuid) -> String {
    format!("presence:user:{user_id}")
}

/// Best-effort presence signal with a persisted last-seen mirror
#[derive(Clone)]
pub struct PresenceTracker {
    ephemeral: Arc<dyn EphemeralStore>,
    store: Arc<dyn Store>,
    presence_ttl: std::time::Duration,
}

impl PresenceTracker {
    pub fn new(
        ephemeral: Arc<dyn EphemeralStore>,
        store: Arc<dyn Store>,
        settings: &Settings,
    ) -> Self {
        Self {
            ephemeral,
            store,
            presence_ttl: settings.presence_ttl,
        }
    }

    /// Record the user's presence and refresh the expiry clock
    ///
    /// The ephemeral write is best-effort; the user-document mirror is not.
    pub async fn set_presence(&self, user_id: Uuid, status: UserStatus) -> Result<()> {
        if let Err(e) = self
            .ephemeral
            .set_with_expiry(&presence_key(user_id), status.as_str(), self.presence_ttl)
            .await
        {
            tracing::warn!(%user_id, error = %e, "presence write dropped, ephemeral store unavailable");
        }

        let now = Utc::now();
        update_with_retry(self.store.as_ref(), user_id, |user: &mut User| {
            user.status = status;
            user.last_seen = now;
            Ok(true)
        })
        .await?;
        Ok(())
    }

    /// Current presence; expired, missing or unreadable keys read as offline
    pub async fn get_presence(&self, user_id: Uuid) -> UserStatus {
        match self.ephemeral.get(&presence_key(user_id)).await {
            Ok(Some(raw)) => UserStatus::from_str(&raw).unwrap_or(UserStatus::Offline),
            Ok(None) => UserStatus::Offline,
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "presence read failed, reporting offline");
                UserStatus::Offline
            }
        }
    }

    /// Drop the live presence key, typically on explicit logout
    ///
    /// The persisted mirror is set to offline in the same call.
    pub async fn clear_presence(&self, user_id: Uuid) -> Result<()> {
        if let Err(e) = self.ephemeral.delete(&presence_key(user_id)).await {
            tracing::warn!(%user_id, error = %e, "presence delete dropped, ephemeral store unavailable");
        }
        let now = Utc::now();
        update_with_retry(self.store.as_ref(), user_id, |user: &mut User| {
            user.status = UserStatus::Offline;
            user.last_seen = now;
            Ok(true)
        })
        .await?;
        Ok(())
    }
}
