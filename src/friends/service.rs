//! Friend-Relationship Authority
//!
//! Bidirectional friend graph plus directional block lists, gating who may
//! message, invite or friend-request whom.
//!
//! Accepting a request is two writes (status flip, then both friend-set
//! insertions). The friend-set insertions are idempotent CAS-retried set
//! adds, and re-accepting an already-accepted request by its receiver
//! re-runs them, so a retry after a partial failure completes the friend
//! graph instead of leaving it half-updated.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{ChatError, Result};
use crate::model::{FriendRequest, FriendRequestStatus, User};
use crate::store::{update_with_retry, FriendRequestStore, Store, UserStore};

/// Friend graph and block list operations
#[derive(Clone)]
pub struct FriendService {
    store: Arc<dyn Store>,
}

impl FriendService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn get_user(&self, user_id: Uuid) -> Result<User> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| ChatError::not_found("user"))
    }

    /// Whether two users are friends; `false` for unknown users
    pub async fn are_friends(&self, user_a: Uuid, user_b: Uuid) -> Result<bool> {
        Ok(self
            .store
            .get_user(user_a)
            .await?
            .map(|user| user.is_friend(user_b))
            .unwrap_or(false))
    }

    /// Whether `blocker` has blocked `target` (directional)
    pub async fn is_blocked(&self, blocker: Uuid, target: Uuid) -> Result<bool> {
        Ok(self
            .store
            .get_user(blocker)
            .await?
            .map(|user| user.has_blocked(target))
            .unwrap_or(false))
    }

    /// Send a friend request
    ///
    /// Denial reasons are user-facing strings, checked in a fixed order:
    /// self-request, deactivated sender, already friends, blocks in either
    /// direction, then an existing non-rejected request in either direction.
    pub async fn send_request(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        message: Option<String>,
    ) -> Result<FriendRequest> {
        if sender_id == receiver_id {
            return Err(ChatError::invalid_input(
                "Cannot send friend request to yourself",
            ));
        }
        let sender = self.get_user(sender_id).await?;
        let receiver = self.get_user(receiver_id).await?;

        if !sender.is_active {
            return Err(ChatError::not_authorized("User account is inactive"));
        }
        if sender.is_friend(receiver_id) {
            return Err(ChatError::already_exists("Users are already friends"));
        }
        if sender.has_blocked(receiver_id) {
            return Err(ChatError::not_authorized("You have blocked this user"));
        }
        if receiver.has_blocked(sender_id) {
            return Err(ChatError::not_authorized("This user has blocked you"));
        }
        if let Some(existing) = self.store.find_between(sender_id, receiver_id).await? {
            let reason = match existing.status {
                FriendRequestStatus::Accepted => "Users are already friends",
                FriendRequestStatus::Pending if existing.sender_id == sender_id => {
                    "You already sent a friend request to this user"
                }
                _ => "This user already sent you a friend request",
            };
            return Err(ChatError::already_exists(reason));
        }

        let request = FriendRequest::new(sender_id, receiver_id, message);
        self.store.insert_friend_request(&request).await?;
        tracing::info!(request_id = %request.id, %sender_id, %receiver_id, "friend request sent");
        Ok(request)
    }

    /// Accept a friend request, receiver only
    ///
    /// Safe to retry: an already-accepted request re-runs the friend-set
    /// completion and succeeds.
    pub async fn accept_request(&self, request_id: Uuid, user_id: Uuid) -> Result<FriendRequest> {
        let now = Utc::now();
        let request = update_with_retry(
            self.store.as_ref(),
            request_id,
            |request: &mut FriendRequest| {
                if request.receiver_id != user_id {
                    return Err(ChatError::not_authorized(
                        "only the receiver can accept a friend request",
                    ));
                }
                match request.status {
                    FriendRequestStatus::Pending => {
                        request.status = FriendRequestStatus::Accepted;
                        request.responded_at = Some(now);
                        Ok(true)
                    }
                    // retry path: finish the friend-set side below
                    FriendRequestStatus::Accepted => Ok(false),
                    FriendRequestStatus::Rejected => Err(ChatError::invalid_state(
                        "friend request was already rejected",
                    )),
                }
            },
        )
        .await?;

        self.add_friend(request.sender_id, request.receiver_id)
            .await?;
        self.add_friend(request.receiver_id, request.sender_id)
            .await?;
        tracing::info!(request_id = %request.id, "friend request accepted");
        Ok(request)
    }

    /// Idempotent one-sided friend-set insertion
    async fn add_friend(&self, user_id: Uuid, friend_id: Uuid) -> Result<()> {
        update_with_retry(self.store.as_ref(), user_id, |user: &mut User| {
            if user.id == friend_id || user.is_friend(friend_id) {
                return Ok(false);
            }
            user.friends.push(friend_id);
            Ok(true)
        })
        .await?;
        Ok(())
    }

    /// Reject a friend request, receiver only, pending only
    pub async fn reject_request(&self, request_id: Uuid, user_id: Uuid) -> Result<FriendRequest> {
        let now = Utc::now();
        update_with_retry(
            self.store.as_ref(),
            request_id,
            |request: &mut FriendRequest| {
                if request.receiver_id != user_id {
                    return Err(ChatError::not_authorized(
                        "only the receiver can reject a friend request",
                    ));
                }
                if request.status != FriendRequestStatus::Pending {
                    return Err(ChatError::invalid_state(
                        "friend request is no longer pending",
                    ));
                }
                request.status = FriendRequestStatus::Rejected;
                request.responded_at = Some(now);
                Ok(true)
            },
        )
        .await
    }

    /// Withdraw a pending friend request, sender only
    ///
    /// The request document is removed so a fresh request between the pair
    /// is allowed immediately.
    pub async fn cancel_request(&self, request_id: Uuid, user_id: Uuid) -> Result<()> {
        let request = self
            .store
            .get_friend_request(request_id)
            .await?
            .ok_or_else(|| ChatError::not_found("friend request"))?;
        if request.sender_id != user_id {
            return Err(ChatError::not_authorized(
                "only the sender can cancel a friend request",
            ));
        }
        if request.status != FriendRequestStatus::Pending {
            return Err(ChatError::invalid_state(
                "friend request is no longer pending",
            ));
        }
        crate::store::Repository::<FriendRequest>::delete(self.store.as_ref(), request_id).await?;
        tracing::info!(%request_id, "friend request cancelled");
        Ok(())
    }

    /// Block a user: adds to the block list and unfriends one-directionally
    ///
    /// The blocked user may still list the blocker as a friend until they
    /// unfriend or block back.
    pub async fn block_user(&self, blocker_id: Uuid, target_id: Uuid) -> Result<()> {
        if blocker_id == target_id {
            return Err(ChatError::invalid_input("Cannot block yourself"));
        }
        // target must exist so a typo'd ID is not silently recorded
        self.get_user(target_id).await?;
        update_with_retry(self.store.as_ref(), blocker_id, |user: &mut User| {
            let mut changed = false;
            if !user.has_blocked(target_id) {
                user.blocked_users.push(target_id);
                changed = true;
            }
            let before = user.friends.len();
            user.friends.retain(|&f| f != target_id);
            Ok(changed || user.friends.len() < before)
        })
        .await?;
        tracing::info!(%blocker_id, %target_id, "user blocked");
        Ok(())
    }

    /// Remove a user from the block list
    pub async fn unblock_user(&self, blocker_id: Uuid, target_id: Uuid) -> Result<()> {
        update_with_retry(self.store.as_ref(), blocker_id, |user: &mut User| {
            let before = user.blocked_users.len();
            user.blocked_users.retain(|&b| b != target_id);
            Ok(user.blocked_users.len() < before)
        })
        .await?;
        Ok(())
    }

    /// The user's friends as full user records
    pub async fn friends_of(&self, user_id: Uuid) -> Result<Vec<User>> {
        let user = self.get_user(user_id).await?;
        self.store.get_users(&user.friends).await
    }

    /// The users blocked by the given user, as full records
    pub async fn blocked_by(&self, user_id: Uuid) -> Result<Vec<User>> {
        let user = self.get_user(user_id).await?;
        self.store.get_users(&user.blocked_users).await
    }

    /// One page of pending requests addressed to the user
    pub async fn pending_received(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<FriendRequest>> {
        self.store.pending_received(user_id, limit, offset).await
    }

    /// One page of pending requests the user has sent
    pub async fn pending_sent(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<FriendRequest>> {
        self.store.pending_sent(user_id, limit, offset).await
    }

    /// Badge count of incoming pending requests
    pub async fn pending_count(&self, user_id: Uuid) -> Result<u64> {
        self.store.pending_count(user_id).await
    }

    /// Every request the user was involved in, newest first
    pub async fn request_history(&self, user_id: Uuid) -> Result<Vec<FriendRequest>> {
        self.store.history_for(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::{Repository, UserStore};
    use assert_matches::assert_matches;

    async fn setup() -> (FriendService, Arc<MemoryStore>, User, User) {
        let store = Arc::new(MemoryStore::new());
        let alice = User::new("alice", "alice@example.com", "Alice", "A");
        let bob = User::new("bob", "bob@example.com", "Bob", "B");
        store.insert_user(&alice).await.unwrap();
        store.insert_user(&bob).await.unwrap();
        (FriendService::new(store.clone()), store, alice, bob)
    }

    #[tokio::test]
    async fn test_accept_establishes_mutual_friendship() {
        let (service, _, alice, bob) = setup().await;
        let request = service.send_request(alice.id, bob.id, None).await.unwrap();
        service.accept_request(request.id, bob.id).await.unwrap();

        assert!(service.are_friends(alice.id, bob.id).await.unwrap());
        assert!(service.are_friends(bob.id, alice.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_self_request_rejected() {
        let (service, _, alice, _) = setup().await;
        let err = service
            .send_request(alice.id, alice.id, None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid input: Cannot send friend request to yourself");
    }

    #[tokio::test]
    async fn test_request_exclusivity_both_directions() {
        let (service, _, alice, bob) = setup().await;
        service.send_request(alice.id, bob.id, None).await.unwrap();

        let err = service.send_request(alice.id, bob.id, None).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "You already sent a friend request to this user"
        );
        let err = service.send_request(bob.id, alice.id, None).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "This user already sent you a friend request"
        );
    }

    #[tokio::test]
    async fn test_rejection_reopens_the_pair() {
        let (service, _, alice, bob) = setup().await;
        let request = service.send_request(alice.id, bob.id, None).await.unwrap();
        service.reject_request(request.id, bob.id).await.unwrap();

        // a fresh request in the opposite direction is allowed again
        service.send_request(bob.id, alice.id, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_accept_requires_receiver_and_pending() {
        let (service, _, alice, bob) = setup().await;
        let request = service.send_request(alice.id, bob.id, None).await.unwrap();

        let err = service.accept_request(request.id, alice.id).await.unwrap_err();
        assert_matches!(err, ChatError::NotAuthorized { .. });

        service.reject_request(request.id, bob.id).await.unwrap();
        let err = service.accept_request(request.id, bob.id).await.unwrap_err();
        assert_matches!(err, ChatError::InvalidState { .. });
    }

    #[tokio::test]
    async fn test_accept_retry_completes_friend_graph() {
        let (service, store, alice, bob) = setup().await;
        let request = service.send_request(alice.id, bob.id, None).await.unwrap();
        service.accept_request(request.id, bob.id).await.unwrap();

        // simulate a partial failure: bob's side of the graph went missing
        update_with_retry(store.as_ref(), bob.id, |user: &mut User| {
            user.friends.clear();
            Ok(true)
        })
        .await
        .unwrap();
        assert!(!service.are_friends(bob.id, alice.id).await.unwrap());

        // retried accept on the already-accepted request repairs it
        service.accept_request(request.id, bob.id).await.unwrap();
        assert!(service.are_friends(bob.id, alice.id).await.unwrap());
        assert!(service.are_friends(alice.id, bob.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_is_sender_only_and_reopens() {
        let (service, _, alice, bob) = setup().await;
        let request = service.send_request(alice.id, bob.id, None).await.unwrap();

        let err = service.cancel_request(request.id, bob.id).await.unwrap_err();
        assert_matches!(err, ChatError::NotAuthorized { .. });

        service.cancel_request(request.id, alice.id).await.unwrap();
        service.send_request(alice.id, bob.id, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_block_gates_requests_with_exact_reason() {
        let (service, _, alice, bob) = setup().await;
        service.block_user(alice.id, bob.id).await.unwrap();

        let err = service.send_request(bob.id, alice.id, None).await.unwrap_err();
        assert_eq!(err.to_string(), "not authorized: This user has blocked you");

        let err = service.send_request(alice.id, bob.id, None).await.unwrap_err();
        assert_eq!(err.to_string(), "not authorized: You have blocked this user");
    }

    #[tokio::test]
    async fn test_block_unfriends_one_direction_only() {
        let (service, _, alice, bob) = setup().await;
        let request = service.send_request(alice.id, bob.id, None).await.unwrap();
        service.accept_request(request.id, bob.id).await.unwrap();

        service.block_user(alice.id, bob.id).await.unwrap();
        assert!(!service.are_friends(alice.id, bob.id).await.unwrap());
        // bob still lists alice until he independently unfriends
        assert!(service.are_friends(bob.id, alice.id).await.unwrap());
        assert!(service.is_blocked(alice.id, bob.id).await.unwrap());
        assert!(!service.is_blocked(bob.id, alice.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_unblock_restores_nothing_but_the_gate() {
        let (service, _, alice, bob) = setup().await;
        service.block_user(alice.id, bob.id).await.unwrap();
        service.unblock_user(alice.id, bob.id).await.unwrap();

        assert!(!service.is_blocked(alice.id, bob.id).await.unwrap());
        assert!(!service.are_friends(alice.id, bob.id).await.unwrap());
        service.send_request(alice.id, bob.id, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_deactivated_sender_cannot_send_request() {
        let (service, store, mut alice, bob) = setup().await;
        alice.is_active = false;
        assert!(Repository::<User>::update(store.as_ref(), &mut alice)
            .await
            .unwrap());

        let err = service
            .send_request(alice.id, bob.id, None)
            .await
            .unwrap_err();
        assert_matches!(err, ChatError::NotAuthorized { ref message } if message == "User account is inactive");
    }

    #[tokio::test]
    async fn test_pending_queries_and_history() {
        let (service, store, alice, bob) = setup().await;
        let carol = User::new("carol", "carol@example.com", "Carol", "C");
        store.insert_user(&carol).await.unwrap();

        service.send_request(alice.id, bob.id, None).await.unwrap();
        let r2 = service.send_request(carol.id, bob.id, None).await.unwrap();

        assert_eq!(service.pending_count(bob.id).await.unwrap(), 2);
        assert_eq!(service.pending_received(bob.id, 10, 0).await.unwrap().len(), 2);
        assert_eq!(service.pending_received(bob.id, 10, 1).await.unwrap().len(), 1);
        assert_eq!(service.pending_received(bob.id, 1, 0).await.unwrap().len(), 1);
        assert_eq!(service.pending_sent(alice.id, 10, 0).await.unwrap().len(), 1);

        service.accept_request(r2.id, bob.id).await.unwrap();
        assert_eq!(service.pending_count(bob.id).await.unwrap(), 1);
        assert_eq!(service.request_history(bob.id).await.unwrap().len(), 2);

        let friends = service.friends_of(bob.id).await.unwrap();
        assert_eq!(friends.len(), 1);
        assert_eq!(friends[0].username, "carol");
    }
}
