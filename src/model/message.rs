//! Message Document
//!
//! Message payloads are immutable at creation except for edits (which keep
//! `original_content` from the first edit) and soft deletion (which replaces
//! the content with a tombstone and reclassifies the message as a system
//! message, preserving its position in history).
//!
//! Delivery state is tracked per message: a `delivered_to` set and a
//! `seen_by` list with at most one entry per user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Content shown in place of a soft-deleted message
pub const DELETED_MESSAGE_TOMBSTONE: &str = "This message was deleted";

/// Message content types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Video,
    Audio,
    Document,
    VoiceNote,
    Location,
    System,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Video => "video",
            MessageType::Audio => "audio",
            MessageType::Document => "document",
            MessageType::VoiceNote => "voice_note",
            MessageType::Location => "location",
            MessageType::System => "system",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(MessageType::Text),
            "image" => Some(MessageType::Image),
            "video" => Some(MessageType::Video),
            "audio" => Some(MessageType::Audio),
            "document" => Some(MessageType::Document),
            "voice_note" => Some(MessageType::VoiceNote),
            "location" => Some(MessageType::Location),
            "system" => Some(MessageType::System),
            _ => None,
        }
    }
}

/// A single emoji reaction; at most one per `(user, emoji)` pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageReaction {
    pub emoji: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Media attachment metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageMedia {
    pub file_url: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub thumbnail_url: Option<String>,
    /// Duration in seconds for audio/video
    pub duration: Option<i64>,
}

/// A seen acknowledgement; at most one per user, re-marking replaces it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeenRecord {
    pub user_id: Uuid,
    pub seen_at: DateTime<Utc>,
}

/// A chat message document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub content: Option<String>,
    pub message_type: MessageType,
    pub media: Option<MessageMedia>,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub reply_to_message_id: Option<Uuid>,
    pub forwarded_from_user_id: Option<Uuid>,
    pub forwarded_from_chat_id: Option<Uuid>,
    pub reactions: Vec<MessageReaction>,
    pub mentions: Vec<Uuid>,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    /// Content before the first edit; set once, never overwritten
    pub original_content: Option<String>,
    pub delivered_to: Vec<Uuid>,
    pub seen_by: Vec<SeenRecord>,
    /// Scheduled expiry; the retention sweep deletes past-due messages
    pub delete_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: i64,
}

impl Message {
    /// Create a new message
    pub fn new(
        content: Option<String>,
        chat_id: Uuid,
        sender_id: Uuid,
        message_type: MessageType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            content,
            message_type,
            media: None,
            chat_id,
            sender_id,
            reply_to_message_id: None,
            forwarded_from_user_id: None,
            forwarded_from_chat_id: None,
            reactions: Vec::new(),
            mentions: Vec::new(),
            is_edited: false,
            edited_at: None,
            original_content: None,
            delivered_to: Vec::new(),
            seen_by: Vec::new(),
            delete_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Add a user to the delivered set; returns whether anything changed
    pub fn mark_delivered(&mut self, user_id: Uuid) -> bool {
        if self.delivered_to.contains(&user_id) {
            return false;
        }
        self.delivered_to.push(user_id);
        true
    }

    /// Record a seen acknowledgement, replacing any prior record for the user
    pub fn mark_seen(&mut self, user_id: Uuid, at: DateTime<Utc>) {
        self.seen_by.retain(|s| s.user_id != user_id);
        self.seen_by.push(SeenRecord {
            user_id,
            seen_at: at,
        });
    }

    pub fn seen_by_user(&self, user_id: Uuid) -> bool {
        self.seen_by.iter().any(|s| s.user_id == user_id)
    }

    /// Add a reaction, replacing any prior reaction for the same pair
    pub fn add_reaction(&mut self, emoji: &str, user_id: Uuid, at: DateTime<Utc>) {
        self.reactions
            .retain(|r| !(r.emoji == emoji && r.user_id == user_id));
        self.reactions.push(MessageReaction {
            emoji: emoji.to_string(),
            user_id,
            created_at: at,
        });
    }

    /// Remove a reaction; returns whether one was removed
    pub fn remove_reaction(&mut self, emoji: &str, user_id: Uuid) -> bool {
        let before = self.reactions.len();
        self.reactions
            .retain(|r| !(r.emoji == emoji && r.user_id == user_id));
        self.reactions.len() < before
    }

    /// Replace the content, preserving `original_content` on the first edit
    pub fn apply_edit(&mut self, new_content: String, at: DateTime<Utc>) {
        if !self.is_edited {
            self.original_content = self.content.clone();
        }
        self.content = Some(new_content);
        self.is_edited = true;
        self.edited_at = Some(at);
    }

    /// Replace the payload with the tombstone; irreversible
    pub fn soft_delete(&mut self) {
        self.content = Some(DELETED_MESSAGE_TOMBSTONE.to_string());
        self.message_type = MessageType::System;
        self.media = None;
    }
}
