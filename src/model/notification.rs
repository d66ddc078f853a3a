//! Notification Document

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Message,
    FriendRequest,
    Mention,
    ChatInvite,
    System,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Message => "message",
            NotificationType::FriendRequest => "friend_request",
            NotificationType::Mention => "mention",
            NotificationType::ChatInvite => "chat_invite",
            NotificationType::System => "system",
        }
    }
}

/// A per-user notification; `read` flips one way only
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub body: String,
    /// Free-form payload referencing the triggering entity
    pub data: serde_json::Value,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: i64,
}

impl Notification {
    pub fn new(
        user_id: Uuid,
        notification_type: NotificationType,
        title: String,
        body: String,
        data: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            notification_type,
            title,
            body,
            data,
            read: false,
            read_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Mark as read; returns whether anything changed
    pub fn mark_read(&mut self, at: DateTime<Utc>) -> bool {
        if self.read {
            return false;
        }
        self.read = true;
        self.read_at = Some(at);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_read_is_one_way() {
        let mut n = Notification::new(
            Uuid::new_v4(),
            NotificationType::System,
            "t".into(),
            "b".into(),
            serde_json::json!({}),
        );
        let first = Utc::now();
        assert!(n.mark_read(first));
        assert!(!n.mark_read(Utc::now()));
        assert_eq!(n.read_at, Some(first));
    }
}
