//! User Document
//!
//! Account identity plus the social edges this core is responsible for:
//! the friend set and the block list. Presence lives in the ephemeral
//! store; the `status`/`last_seen` fields here are the persisted mirror.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User online status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Online,
    #[default]
    Offline,
    Away,
    Busy,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Online => "online",
            UserStatus::Offline => "offline",
            UserStatus::Away => "away",
            UserStatus::Busy => "busy",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "online" => Some(UserStatus::Online),
            "offline" => Some(UserStatus::Offline),
            "away" => Some(UserStatus::Away),
            "busy" => Some(UserStatus::Busy),
            _ => None,
        }
    }
}

/// A registered user
///
/// Invariant: a user's own ID never appears in `friends` or
/// `blocked_users`; the friend service enforces this on every mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Persisted mirror of the ephemeral presence signal
    pub status: UserStatus,
    pub last_seen: DateTime<Utc>,
    /// Soft-disable flag; users are never hard-deleted
    pub is_active: bool,
    /// User IDs this user is friends with (references, not ownership)
    pub friends: Vec<Uuid>,
    /// User IDs this user has blocked (directional)
    pub blocked_users: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: i64,
}

impl User {
    /// Create a new active user
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username: username.into().to_lowercase(),
            email: email.into().to_lowercase(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            status: UserStatus::Offline,
            last_seen: now,
            is_active: true,
            friends: Vec::new(),
            blocked_users: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Full display name
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn is_friend(&self, other: Uuid) -> bool {
        self.friends.contains(&other)
    }

    pub fn has_blocked(&self, other: Uuid) -> bool {
        self.blocked_users.contains(&other)
    }
}
