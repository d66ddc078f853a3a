//! Friend Request Document
//!
//! A request moves Pending -> Accepted or Pending -> Rejected and never
//! leaves a terminal state. Rejected requests are retained for sweep-based
//! cleanup rather than deleted inline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FriendRequestStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

impl FriendRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FriendRequestStatus::Pending => "pending",
            FriendRequestStatus::Accepted => "accepted",
            FriendRequestStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, FriendRequestStatus::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FriendRequest {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub status: FriendRequestStatus,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: i64,
}

impl FriendRequest {
    pub fn new(sender_id: Uuid, receiver_id: Uuid, message: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            status: FriendRequestStatus::Pending,
            message,
            created_at: now,
            updated_at: now,
            responded_at: None,
            version: 0,
        }
    }

    /// True if the request sits between the two users in either direction
    pub fn involves(&self, a: Uuid, b: Uuid) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }
}
