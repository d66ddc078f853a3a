//! Chat Document
//!
//! A chat owns its participant list exclusively; no other entity mutates
//! participants except through the membership service. A private chat has
//! exactly two participants, fixed at creation. Group chats carry
//! per-participant role, mute flag and read cursor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Chat room type, immutable after creation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    Private,
    Group,
}

impl ChatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatType::Private => "private",
            ChatType::Group => "group",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "private" => Some(ChatType::Private),
            "group" => Some(ChatType::Group),
            _ => None,
        }
    }
}

/// Per-participant state inside a chat document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatParticipant {
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
    pub is_admin: bool,
    pub is_muted: bool,
    /// Read cursor; advanced by the client, not validated for monotonicity
    pub last_read_message_id: Option<Uuid>,
    pub last_read_at: Option<DateTime<Utc>>,
}

impl ChatParticipant {
    /// A regular (non-admin) participant joining now
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            joined_at: Utc::now(),
            is_admin: false,
            is_muted: false,
            last_read_message_id: None,
            last_read_at: None,
        }
    }

    /// An admin participant joining now
    pub fn admin(user_id: Uuid) -> Self {
        Self {
            is_admin: true,
            ..Self::new(user_id)
        }
    }
}

/// A chat room document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chat {
    pub id: Uuid,
    pub chat_type: ChatType,
    /// Group name; `None` for private chats
    pub name: Option<String>,
    pub description: Option<String>,
    pub participants: Vec<ChatParticipant>,
    pub created_by: Uuid,
    /// Denormalized counters, bumped on every accepted message
    pub message_count: i64,
    pub last_message_id: Option<Uuid>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: i64,
}

impl Chat {
    /// Create a private chat between two users, both non-admin
    pub fn private(user_a: Uuid, user_b: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            chat_type: ChatType::Private,
            name: None,
            description: None,
            participants: vec![ChatParticipant::new(user_a), ChatParticipant::new(user_b)],
            created_by: user_a,
            message_count: 0,
            last_message_id: None,
            last_message_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Create a group chat; only the creator is admin
    pub fn group(
        creator: Uuid,
        participants: Vec<ChatParticipant>,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            chat_type: ChatType::Group,
            name: Some(name.into()),
            description,
            participants,
            created_by: creator,
            message_count: 0,
            last_message_id: None,
            last_message_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Look up a participant by user ID
    pub fn participant(&self, user_id: Uuid) -> Option<&ChatParticipant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn participant_mut(&mut self, user_id: Uuid) -> Option<&mut ChatParticipant> {
        self.participants.iter_mut().find(|p| p.user_id == user_id)
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participants.iter().any(|p| p.user_id == user_id)
    }

    pub fn is_admin(&self, user_id: Uuid) -> bool {
        self.participant(user_id).map(|p| p.is_admin).unwrap_or(false)
    }

    /// Number of participants currently holding the admin role
    pub fn admin_count(&self) -> usize {
        self.participants.iter().filter(|p| p.is_admin).count()
    }
}
