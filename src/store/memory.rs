//! In-Memory Store
//!
//! HashMap-backed implementation of the storage traits. Used by the test
//! suite and by deployments without a `DATABASE_URL`. CAS semantics match
//! the Postgres store exactly, including version bumps on successful
//! updates, so concurrency tests against this store are meaningful.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ChatError, Result};
use crate::model::{Chat, FriendRequest, FriendRequestStatus, Message, Notification, User};

use super::{
    blocks_new_request, is_private_between, ChatStore, Entity, FriendRequestStore, MessageStore,
    NotificationStore, Repository, UserStore,
};

/// In-memory implementation of the persisted store
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    chats: RwLock<HashMap<Uuid, Chat>>,
    messages: RwLock<HashMap<Uuid, Message>>,
    friend_requests: RwLock<HashMap<Uuid, FriendRequest>>,
    notifications: RwLock<HashMap<Uuid, Notification>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

macro_rules! impl_memory_repository {
    ($entity:ty, $field:ident) => {
        #[async_trait]
        impl Repository<$entity> for MemoryStore {
            async fn insert(&self, entity: &$entity) -> Result<()> {
                let mut map = self.$field.write().await;
                if map.contains_key(&entity.id()) {
                    return Err(ChatError::already_exists(format!(
                        "{} already exists",
                        <$entity as Entity>::KIND
                    )));
                }
                map.insert(entity.id(), entity.clone());
                Ok(())
            }

            async fn get(&self, id: Uuid) -> Result<Option<$entity>> {
                Ok(self.$field.read().await.get(&id).cloned())
            }

            async fn update(&self, entity: &mut $entity) -> Result<bool> {
                let mut map = self.$field.write().await;
                match map.get(&entity.id()) {
                    Some(stored) if stored.version() == entity.version() => {
                        entity.set_version(entity.version() + 1);
                        map.insert(entity.id(), entity.clone());
                        Ok(true)
                    }
                    Some(_) => Ok(false),
                    None => Err(ChatError::not_found(<$entity as Entity>::KIND)),
                }
            }

            async fn delete(&self, id: Uuid) -> Result<bool> {
                Ok(self.$field.write().await.remove(&id).is_some())
            }
        }
    };
}

impl_memory_repository!(User, users);
impl_memory_repository!(Chat, chats);
impl_memory_repository!(Message, messages);
impl_memory_repository!(FriendRequest, friend_requests);
impl_memory_repository!(Notification, notifications);

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_users(&self, ids: &[Uuid]) -> Result<Vec<User>> {
        let map = self.users.read().await;
        Ok(ids.iter().filter_map(|id| map.get(id).cloned()).collect())
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn find_private_chat(&self, user_a: Uuid, user_b: Uuid) -> Result<Option<Chat>> {
        let map = self.chats.read().await;
        Ok(map
            .values()
            .find(|chat| is_private_between(chat, user_a, user_b))
            .cloned())
    }

    async fn chats_for_user(&self, user_id: Uuid) -> Result<Vec<Chat>> {
        let map = self.chats.read().await;
        let mut chats: Vec<Chat> = map
            .values()
            .filter(|chat| chat.is_participant(user_id))
            .cloned()
            .collect();
        chats.sort_by_key(|chat| {
            std::cmp::Reverse(chat.last_message_at.unwrap_or(chat.created_at))
        });
        Ok(chats)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn chat_page(
        &self,
        chat_id: Uuid,
        limit: usize,
        before: Option<DateTime<Utc>>,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>> {
        let map = self.messages.read().await;
        let mut page: Vec<Message> = map
            .values()
            .filter(|msg| msg.chat_id == chat_id)
            .filter(|msg| before.map_or(true, |b| msg.created_at < b))
            .filter(|msg| after.map_or(true, |a| msg.created_at > a))
            .cloned()
            .collect();
        page.sort_by_key(|msg| std::cmp::Reverse(msg.created_at));
        page.truncate(limit);
        Ok(page)
    }

    async fn unread_messages(&self, chat_id: Uuid, user_id: Uuid) -> Result<Vec<Message>> {
        let map = self.messages.read().await;
        let mut unread: Vec<Message> = map
            .values()
            .filter(|msg| {
                msg.chat_id == chat_id && msg.sender_id != user_id && !msg.seen_by_user(user_id)
            })
            .cloned()
            .collect();
        unread.sort_by_key(|msg| msg.created_at);
        Ok(unread)
    }

    async fn unread_count(&self, chat_id: Uuid, user_id: Uuid) -> Result<u64> {
        let map = self.messages.read().await;
        Ok(map
            .values()
            .filter(|msg| {
                msg.chat_id == chat_id && msg.sender_id != user_id && !msg.seen_by_user(user_id)
            })
            .count() as u64)
    }

    async fn mentions_of(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>> {
        let map = self.messages.read().await;
        let mut mentioned: Vec<Message> = map
            .values()
            .filter(|msg| msg.mentions.contains(&user_id))
            .cloned()
            .collect();
        mentioned.sort_by_key(|msg| std::cmp::Reverse(msg.created_at));
        Ok(mentioned.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut map = self.messages.write().await;
        let before = map.len();
        map.retain(|_, msg| !msg.delete_at.is_some_and(|at| at <= now));
        Ok((before - map.len()) as u64)
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut map = self.messages.write().await;
        let before = map.len();
        map.retain(|_, msg| msg.created_at >= cutoff);
        Ok((before - map.len()) as u64)
    }
}

#[async_trait]
impl FriendRequestStore for MemoryStore {
    async fn find_between(&self, user_a: Uuid, user_b: Uuid) -> Result<Option<FriendRequest>> {
        let map = self.friend_requests.read().await;
        Ok(map
            .values()
            .find(|req| req.involves(user_a, user_b) && blocks_new_request(req))
            .cloned())
    }

    async fn pending_received(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<FriendRequest>> {
        let map = self.friend_requests.read().await;
        let mut pending: Vec<FriendRequest> = map
            .values()
            .filter(|req| {
                req.receiver_id == user_id && req.status == FriendRequestStatus::Pending
            })
            .cloned()
            .collect();
        pending.sort_by_key(|req| std::cmp::Reverse(req.created_at));
        Ok(pending.into_iter().skip(offset).take(limit).collect())
    }

    async fn pending_sent(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<FriendRequest>> {
        let map = self.friend_requests.read().await;
        let mut pending: Vec<FriendRequest> = map
            .values()
            .filter(|req| req.sender_id == user_id && req.status == FriendRequestStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|req| std::cmp::Reverse(req.created_at));
        Ok(pending.into_iter().skip(offset).take(limit).collect())
    }

    async fn pending_count(&self, user_id: Uuid) -> Result<u64> {
        let map = self.friend_requests.read().await;
        Ok(map
            .values()
            .filter(|req| {
                req.receiver_id == user_id && req.status == FriendRequestStatus::Pending
            })
            .count() as u64)
    }

    async fn history_for(&self, user_id: Uuid) -> Result<Vec<FriendRequest>> {
        let map = self.friend_requests.read().await;
        let mut history: Vec<FriendRequest> = map
            .values()
            .filter(|req| req.sender_id == user_id || req.receiver_id == user_id)
            .cloned()
            .collect();
        history.sort_by_key(|req| std::cmp::Reverse(req.created_at));
        Ok(history)
    }

    async fn delete_rejected_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut map = self.friend_requests.write().await;
        let before = map.len();
        map.retain(|_, req| {
            !(req.status == FriendRequestStatus::Rejected
                && req.responded_at.is_some_and(|at| at < cutoff))
        });
        Ok((before - map.len()) as u64)
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn for_user(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
        unread_only: bool,
    ) -> Result<Vec<Notification>> {
        let map = self.notifications.read().await;
        let mut list: Vec<Notification> = map
            .values()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.read))
            .cloned()
            .collect();
        list.sort_by_key(|n| std::cmp::Reverse(n.created_at));
        Ok(list.into_iter().skip(offset).take(limit).collect())
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<u64> {
        let map = self.notifications.read().await;
        Ok(map
            .values()
            .filter(|n| n.user_id == user_id && !n.read)
            .count() as u64)
    }

    async fn mark_all_read(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<u64> {
        let mut map = self.notifications.write().await;
        let mut changed = 0u64;
        for notification in map.values_mut() {
            if notification.user_id == user_id && notification.mark_read(at) {
                notification.updated_at = at;
                notification.version += 1;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut map = self.notifications.write().await;
        let before = map.len();
        map.retain(|_, n| n.created_at >= cutoff);
        Ok((before - map.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChatType, MessageType};
    use crate::store::update_with_retry;

    #[tokio::test]
    async fn test_insert_and_get_roundtrip() {
        let store = MemoryStore::new();
        let user = User::new("Alice", "alice@example.com", "Alice", "A");
        store.insert_user(&user).await.unwrap();
        let fetched = store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(fetched.username, "alice");
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = MemoryStore::new();
        let user = User::new("bob", "bob@example.com", "Bob", "B");
        store.insert_user(&user).await.unwrap();
        let err = store.insert_user(&user).await.unwrap_err();
        assert_eq!(err.code(), "already_exists");
    }

    #[tokio::test]
    async fn test_update_cas_rejects_stale_version() {
        let store = MemoryStore::new();
        let user = User::new("carol", "carol@example.com", "Carol", "C");
        store.insert_user(&user).await.unwrap();

        let mut copy_a = store.get_user(user.id).await.unwrap().unwrap();
        let mut copy_b = store.get_user(user.id).await.unwrap().unwrap();

        copy_a.first_name = "Caroline".into();
        assert!(Repository::<User>::update(&store, &mut copy_a).await.unwrap());
        assert_eq!(copy_a.version, 1);

        copy_b.first_name = "Carolyn".into();
        assert!(!Repository::<User>::update(&store, &mut copy_b).await.unwrap());

        let stored = store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.first_name, "Caroline");
    }

    #[tokio::test]
    async fn test_update_with_retry_survives_interleaving() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let creator = Uuid::new_v4();
        let chat = Chat::group(
            creator,
            vec![crate::model::ChatParticipant::admin(creator)],
            "team",
            None,
        );
        store.insert_chat(&chat).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let chat_id = chat.id;
            handles.push(tokio::spawn(async move {
                update_with_retry(store.as_ref(), chat_id, |chat: &mut Chat| {
                    chat.message_count += 1;
                    Ok(true)
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = store.get_chat(chat.id).await.unwrap().unwrap();
        assert_eq!(stored.message_count, 8);
        assert_eq!(stored.chat_type, ChatType::Group);
    }

    #[tokio::test]
    async fn test_find_private_chat() {
        let store = MemoryStore::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let chat = Chat::private(a, b);
        store.insert_chat(&chat).await.unwrap();

        assert!(store.find_private_chat(a, b).await.unwrap().is_some());
        assert!(store.find_private_chat(b, a).await.unwrap().is_some());
        assert!(store.find_private_chat(a, c).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_chat_page_orders_newest_first() {
        let store = MemoryStore::new();
        let chat_id = Uuid::new_v4();
        let sender = Uuid::new_v4();
        let mut ids = Vec::new();
        for i in 0..5 {
            let mut msg = Message::new(
                Some(format!("msg {i}")),
                chat_id,
                sender,
                MessageType::Text,
            );
            msg.created_at = Utc::now() + chrono::Duration::seconds(i);
            store.insert_message(&msg).await.unwrap();
            ids.push(msg.id);
        }
        let page = store.chat_page(chat_id, 3, None, None).await.unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].id, ids[4]);
        assert_eq!(page[2].id, ids[2]);
    }

    #[tokio::test]
    async fn test_unread_count_skips_own_and_seen() {
        let store = MemoryStore::new();
        let chat_id = Uuid::new_v4();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let own = Message::new(Some("mine".into()), chat_id, alice, MessageType::Text);
        store.insert_message(&own).await.unwrap();

        let mut seen = Message::new(Some("seen".into()), chat_id, bob, MessageType::Text);
        seen.mark_seen(alice, Utc::now());
        store.insert_message(&seen).await.unwrap();

        let unseen = Message::new(Some("new".into()), chat_id, bob, MessageType::Text);
        store.insert_message(&unseen).await.unwrap();

        assert_eq!(
            MessageStore::unread_count(&store, chat_id, alice).await.unwrap(),
            1
        );
        let unread = store.unread_messages(chat_id, alice).await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, unseen.id);
    }

    #[tokio::test]
    async fn test_delete_expired_messages() {
        let store = MemoryStore::new();
        let chat_id = Uuid::new_v4();
        let sender = Uuid::new_v4();

        let mut expiring = Message::new(Some("soon".into()), chat_id, sender, MessageType::Text);
        expiring.delete_at = Some(Utc::now() - chrono::Duration::minutes(1));
        store.insert_message(&expiring).await.unwrap();

        let keeper = Message::new(Some("keep".into()), chat_id, sender, MessageType::Text);
        store.insert_message(&keeper).await.unwrap();

        assert_eq!(store.delete_expired(Utc::now()).await.unwrap(), 1);
        assert!(store.get_message(expiring.id).await.unwrap().is_none());
        assert!(store.get_message(keeper.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_mentions_of_filters_and_paginates() {
        let store = MemoryStore::new();
        let sender = Uuid::new_v4();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        for i in 0..3 {
            let mut msg = Message::new(
                Some(format!("hey @alice {i}")),
                Uuid::new_v4(),
                sender,
                MessageType::Text,
            );
            msg.mentions.push(alice);
            msg.created_at = Utc::now() + chrono::Duration::seconds(i);
            store.insert_message(&msg).await.unwrap();
        }
        let other = Message::new(Some("no tag".into()), Uuid::new_v4(), sender, MessageType::Text);
        store.insert_message(&other).await.unwrap();

        let all = store.mentions_of(alice, 10, 0).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        let second_page = store.mentions_of(alice, 2, 2).await.unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].id, all[2].id);

        assert!(store.mentions_of(bob, 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_requests_do_not_block_new_ones() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut req = FriendRequest::new(a, b, None);
        req.status = FriendRequestStatus::Rejected;
        store.insert_friend_request(&req).await.unwrap();

        assert!(store.find_between(a, b).await.unwrap().is_none());
        assert_eq!(store.history_for(a).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_all_read_counts_changes() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        for _ in 0..3 {
            let n = Notification::new(
                user,
                crate::model::NotificationType::System,
                "t".into(),
                "b".into(),
                serde_json::json!({}),
            );
            store.insert_notification(&n).await.unwrap();
        }
        assert_eq!(store.mark_all_read(user, Utc::now()).await.unwrap(), 3);
        assert_eq!(store.mark_all_read(user, Utc::now()).await.unwrap(), 0);
        assert_eq!(NotificationStore::unread_count(&store, user).await.unwrap(), 0);
    }
}
