//! Chat Membership & Role Authority
//!
//! The single source of truth for "who can act on this chat". Every
//! mutation is a read-modify-write on one chat document, run through
//! [`update_with_retry`] so concurrent admin actions on the same chat never
//! lose an update.
//!
//! Private chats are closed: their two-participant list is fixed at
//! creation and no membership operation applies to them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{ChatError, Result};
use crate::model::{Chat, ChatParticipant, ChatType};
use crate::store::{update_with_retry, ChatStore, Store};

/// Membership and role operations over chat documents
#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn Store>,
}

impl ChatService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Fetch a chat or fail `NotFound`
    pub async fn get(&self, chat_id: Uuid) -> Result<Chat> {
        self.store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| ChatError::not_found("chat"))
    }

    /// All chats the user participates in, most recent activity first
    pub async fn chats_for(&self, user_id: Uuid) -> Result<Vec<Chat>> {
        self.store.chats_for_user(user_id).await
    }

    /// Participant list accessor
    pub async fn participants(&self, chat_id: Uuid) -> Result<Vec<ChatParticipant>> {
        Ok(self.get(chat_id).await?.participants)
    }

    /// Create (or return) the private chat between two users
    ///
    /// Idempotent: repeated calls for the same pair, in either order,
    /// return the same chat.
    pub async fn create_private_chat(&self, user_a: Uuid, user_b: Uuid) -> Result<Chat> {
        if user_a == user_b {
            return Err(ChatError::invalid_input(
                "cannot create a private chat with yourself",
            ));
        }
        if let Some(existing) = self.store.find_private_chat(user_a, user_b).await? {
            return Ok(existing);
        }
        let chat = Chat::private(user_a, user_b);
        self.store.insert_chat(&chat).await?;
        tracing::info!(chat_id = %chat.id, "created private chat");
        Ok(chat)
    }

    /// Create a group chat; only the creator is admin
    ///
    /// `participant_ids` is deduplicated and the creator is always
    /// included, whether or not the caller listed them.
    pub async fn create_group_chat(
        &self,
        creator: Uuid,
        participant_ids: &[Uuid],
        name: &str,
        description: Option<String>,
    ) -> Result<Chat> {
        if name.trim().is_empty() {
            return Err(ChatError::invalid_input("group chat name cannot be blank"));
        }
        let mut participants = vec![ChatParticipant::admin(creator)];
        for &user_id in participant_ids {
            if user_id != creator && !participants.iter().any(|p| p.user_id == user_id) {
                participants.push(ChatParticipant::new(user_id));
            }
        }
        let chat = Chat::group(creator, participants, name.trim(), description);
        self.store.insert_chat(&chat).await?;
        tracing::info!(chat_id = %chat.id, participants = chat.participants.len(), "created group chat");
        Ok(chat)
    }

    /// Add a user to a group chat, admins only
    pub async fn add_participant(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        requested_by: Uuid,
    ) -> Result<Chat> {
        update_with_retry(self.store.as_ref(), chat_id, |chat: &mut Chat| {
            if chat.chat_type == ChatType::Private {
                return Err(ChatError::not_authorized("private chats are closed"));
            }
            if !chat.is_admin(requested_by) {
                return Err(ChatError::not_authorized(
                    "only admins can add participants",
                ));
            }
            if chat.is_participant(user_id) {
                return Err(ChatError::AlreadyMember);
            }
            chat.participants.push(ChatParticipant::new(user_id));
            Ok(true)
        })
        .await
    }

    /// Remove a participant; allowed for admins and for self-leave
    ///
    /// If the departing user was the sole admin, the longest-tenured
    /// remaining participant is promoted in the same write so the group is
    /// never left without an admin.
    pub async fn remove_participant(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        requested_by: Uuid,
    ) -> Result<Chat> {
        update_with_retry(self.store.as_ref(), chat_id, |chat: &mut Chat| {
            if chat.chat_type == ChatType::Private {
                return Err(ChatError::not_authorized("private chats are closed"));
            }
            if requested_by != user_id && !chat.is_admin(requested_by) {
                return Err(ChatError::not_authorized(
                    "only admins can remove other participants",
                ));
            }
            if !chat.is_participant(user_id) {
                return Err(ChatError::not_found("participant"));
            }
            let was_admin = chat.is_admin(user_id);
            chat.participants.retain(|p| p.user_id != user_id);
            if was_admin && chat.admin_count() == 0 {
                if let Some(successor) = chat
                    .participants
                    .iter_mut()
                    .min_by_key(|p| p.joined_at)
                {
                    tracing::info!(%chat_id, successor = %successor.user_id, "promoting successor admin");
                    successor.is_admin = true;
                }
            }
            Ok(true)
        })
        .await
    }

    /// Grant or revoke admin, admins only
    ///
    /// Demoting the last remaining admin is rejected; the group must keep
    /// at least one.
    pub async fn set_admin(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        is_admin: bool,
        requested_by: Uuid,
    ) -> Result<Chat> {
        update_with_retry(self.store.as_ref(), chat_id, |chat: &mut Chat| {
            if chat.chat_type == ChatType::Private {
                return Err(ChatError::not_authorized("private chats are closed"));
            }
            if !chat.is_admin(requested_by) {
                return Err(ChatError::not_authorized("only admins can change roles"));
            }
            if !is_admin && chat.is_admin(user_id) && chat.admin_count() == 1 {
                return Err(ChatError::invalid_state(
                    "cannot demote the only admin of a group chat",
                ));
            }
            let participant = chat
                .participant_mut(user_id)
                .ok_or_else(|| ChatError::not_found("participant"))?;
            if participant.is_admin == is_admin {
                return Ok(false);
            }
            participant.is_admin = is_admin;
            Ok(true)
        })
        .await
    }

    /// Mute or unmute a participant, admins only
    pub async fn set_muted(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        is_muted: bool,
        requested_by: Uuid,
    ) -> Result<Chat> {
        update_with_retry(self.store.as_ref(), chat_id, |chat: &mut Chat| {
            if !chat.is_admin(requested_by) {
                return Err(ChatError::not_authorized(
                    "only admins can mute participants",
                ));
            }
            let participant = chat
                .participant_mut(user_id)
                .ok_or_else(|| ChatError::not_found("participant"))?;
            if participant.is_muted == is_muted {
                return Ok(false);
            }
            participant.is_muted = is_muted;
            Ok(true)
        })
        .await
    }

    /// Advance the participant's read cursor
    ///
    /// Out-of-order updates are accepted as-is; monotonicity is the
    /// caller's responsibility.
    pub async fn update_read_cursor(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        message_id: Uuid,
    ) -> Result<Chat> {
        let now = Utc::now();
        update_with_retry(self.store.as_ref(), chat_id, |chat: &mut Chat| {
            let participant = chat
                .participant_mut(user_id)
                .ok_or_else(|| ChatError::not_found("participant"))?;
            participant.last_read_message_id = Some(message_id);
            participant.last_read_at = Some(now);
            Ok(true)
        })
        .await
    }

    /// Rename or re-describe a group chat, admins only
    pub async fn update_info(
        &self,
        chat_id: Uuid,
        actor: Uuid,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<Chat> {
        if let Some(ref name) = name {
            if name.trim().is_empty() {
                return Err(ChatError::invalid_input("group chat name cannot be blank"));
            }
        }
        update_with_retry(self.store.as_ref(), chat_id, |chat: &mut Chat| {
            if chat.chat_type == ChatType::Private {
                return Err(ChatError::not_authorized("private chats have no info"));
            }
            if !chat.is_admin(actor) {
                return Err(ChatError::not_authorized("only admins can edit chat info"));
            }
            let mut changed = false;
            if let Some(ref name) = name {
                chat.name = Some(name.trim().to_string());
                changed = true;
            }
            if let Some(ref description) = description {
                chat.description = Some(description.clone());
                changed = true;
            }
            Ok(changed)
        })
        .await
    }

    /// Bump the chat's denormalized message counters
    ///
    /// Invoked by the message pipeline after every accepted message.
    pub async fn update_last_message(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Chat> {
        update_with_retry(self.store.as_ref(), chat_id, |chat: &mut Chat| {
            chat.message_count += 1;
            chat.last_message_id = Some(message_id);
            chat.last_message_at = Some(at);
            Ok(true)
        })
        .await
    }

    /// Whether the user is a participant; `false` for unknown chats
    pub async fn is_participant(&self, chat_id: Uuid, user_id: Uuid) -> Result<bool> {
        Ok(self
            .store
            .get_chat(chat_id)
            .await?
            .map(|chat| chat.is_participant(user_id))
            .unwrap_or(false))
    }

    /// Whether the user is an admin; `false` for unknown chats
    pub async fn is_admin(&self, chat_id: Uuid, user_id: Uuid) -> Result<bool> {
        Ok(self
            .store
            .get_chat(chat_id)
            .await?
            .map(|chat| chat.is_admin(user_id))
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use assert_matches::assert_matches;

    fn service() -> ChatService {
        ChatService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_private_chat_is_idempotent_both_orders() {
        let service = service();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let first = service.create_private_chat(a, b).await.unwrap();
        let second = service.create_private_chat(b, a).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.participants.len(), 2);
        assert!(!first.is_admin(a) && !first.is_admin(b));
    }

    #[tokio::test]
    async fn test_private_chat_with_self_rejected() {
        let service = service();
        let a = Uuid::new_v4();
        let err = service.create_private_chat(a, a).await.unwrap_err();
        assert_matches!(err, ChatError::InvalidInput { .. });
    }

    #[tokio::test]
    async fn test_group_chat_dedupes_and_includes_creator() {
        let service = service();
        let creator = Uuid::new_v4();
        let other = Uuid::new_v4();
        let chat = service
            .create_group_chat(creator, &[other, other, creator], "team", None)
            .await
            .unwrap();
        assert_eq!(chat.participants.len(), 2);
        assert!(chat.is_admin(creator));
        assert!(!chat.is_admin(other));
    }

    #[tokio::test]
    async fn test_group_chat_blank_name_rejected() {
        let service = service();
        let err = service
            .create_group_chat(Uuid::new_v4(), &[], "   ", None)
            .await
            .unwrap_err();
        assert_matches!(err, ChatError::InvalidInput { .. });
    }

    #[tokio::test]
    async fn test_add_participant_requires_admin() {
        let service = service();
        let creator = Uuid::new_v4();
        let member = Uuid::new_v4();
        let newcomer = Uuid::new_v4();
        let chat = service
            .create_group_chat(creator, &[member], "team", None)
            .await
            .unwrap();

        let err = service
            .add_participant(chat.id, newcomer, member)
            .await
            .unwrap_err();
        assert_matches!(err, ChatError::NotAuthorized { .. });

        let chat = service
            .add_participant(chat.id, newcomer, creator)
            .await
            .unwrap();
        assert!(chat.is_participant(newcomer));
    }

    #[tokio::test]
    async fn test_add_existing_participant_fails_already_member() {
        let service = service();
        let creator = Uuid::new_v4();
        let member = Uuid::new_v4();
        let chat = service
            .create_group_chat(creator, &[member], "team", None)
            .await
            .unwrap();
        let err = service
            .add_participant(chat.id, member, creator)
            .await
            .unwrap_err();
        assert_matches!(err, ChatError::AlreadyMember);
    }

    #[tokio::test]
    async fn test_private_chats_are_closed() {
        let service = service();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let chat = service.create_private_chat(a, b).await.unwrap();
        let err = service
            .add_participant(chat.id, Uuid::new_v4(), a)
            .await
            .unwrap_err();
        assert_matches!(err, ChatError::NotAuthorized { .. });
    }

    #[tokio::test]
    async fn test_self_leave_allowed_without_role() {
        let service = service();
        let creator = Uuid::new_v4();
        let member = Uuid::new_v4();
        let chat = service
            .create_group_chat(creator, &[member], "team", None)
            .await
            .unwrap();

        let chat = service
            .remove_participant(chat.id, member, member)
            .await
            .unwrap();
        assert!(!chat.is_participant(member));
    }

    #[tokio::test]
    async fn test_remove_by_non_admin_stranger_rejected() {
        let service = service();
        let creator = Uuid::new_v4();
        let member = Uuid::new_v4();
        let other = Uuid::new_v4();
        let chat = service
            .create_group_chat(creator, &[member, other], "team", None)
            .await
            .unwrap();
        let err = service
            .remove_participant(chat.id, member, other)
            .await
            .unwrap_err();
        assert_matches!(err, ChatError::NotAuthorized { .. });
    }

    #[tokio::test]
    async fn test_sole_admin_leave_promotes_successor() {
        let service = service();
        let creator = Uuid::new_v4();
        let member = Uuid::new_v4();
        let chat = service
            .create_group_chat(creator, &[member], "team", None)
            .await
            .unwrap();

        let chat = service
            .remove_participant(chat.id, creator, creator)
            .await
            .unwrap();
        assert!(chat.is_admin(member));
        assert_eq!(chat.admin_count(), 1);
    }

    #[tokio::test]
    async fn test_demoting_sole_admin_rejected() {
        let service = service();
        let creator = Uuid::new_v4();
        let member = Uuid::new_v4();
        let chat = service
            .create_group_chat(creator, &[member], "team", None)
            .await
            .unwrap();
        let err = service
            .set_admin(chat.id, creator, false, creator)
            .await
            .unwrap_err();
        assert_matches!(err, ChatError::InvalidState { .. });

        // promoting a second admin first makes the demotion legal
        service
            .set_admin(chat.id, member, true, creator)
            .await
            .unwrap();
        let chat = service
            .set_admin(chat.id, creator, false, creator)
            .await
            .unwrap();
        assert!(!chat.is_admin(creator));
    }

    #[tokio::test]
    async fn test_concurrent_adds_both_land() {
        let store = Arc::new(MemoryStore::new());
        let service = ChatService::new(store);
        let creator = Uuid::new_v4();
        let chat = service
            .create_group_chat(creator, &[], "team", None)
            .await
            .unwrap();

        let (x, y) = (Uuid::new_v4(), Uuid::new_v4());
        let (ra, rb) = tokio::join!(
            service.add_participant(chat.id, x, creator),
            service.add_participant(chat.id, y, creator),
        );
        ra.unwrap();
        rb.unwrap();

        let chat = service.get(chat.id).await.unwrap();
        assert!(chat.is_participant(x));
        assert!(chat.is_participant(y));
        assert_eq!(chat.participants.len(), 3);
    }

    #[tokio::test]
    async fn test_queries_return_false_for_unknown_chat() {
        let service = service();
        let user = Uuid::new_v4();
        assert!(!service.is_participant(Uuid::new_v4(), user).await.unwrap());
        assert!(!service.is_admin(Uuid::new_v4(), user).await.unwrap());
    }

    #[tokio::test]
    async fn test_read_cursor_updates() {
        let service = service();
        let creator = Uuid::new_v4();
        let chat = service
            .create_group_chat(creator, &[], "team", None)
            .await
            .unwrap();
        let message_id = Uuid::new_v4();
        let chat = service
            .update_read_cursor(chat.id, creator, message_id)
            .await
            .unwrap();
        let participant = chat.participant(creator).unwrap();
        assert_eq!(participant.last_read_message_id, Some(message_id));
        assert!(participant.last_read_at.is_some());
    }

    #[tokio::test]
    async fn test_update_info_admin_only() {
        let service = service();
        let creator = Uuid::new_v4();
        let member = Uuid::new_v4();
        let chat = service
            .create_group_chat(creator, &[member], "team", None)
            .await
            .unwrap();

        let err = service
            .update_info(chat.id, member, Some("renamed".into()), None)
            .await
            .unwrap_err();
        assert_matches!(err, ChatError::NotAuthorized { .. });

        let chat = service
            .update_info(chat.id, creator, Some("renamed".into()), Some("desc".into()))
            .await
            .unwrap();
        assert_eq!(chat.name.as_deref(), Some("renamed"));
        assert_eq!(chat.description.as_deref(), Some("desc"));
    }
}
