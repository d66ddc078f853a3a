//! Real-time State
//!
//! Presence, live sessions, chat subscriptions and event broadcasting.
//! Everything here is advisory, fast-changing state layered over the
//! ephemeral store; authoritative access control always goes through
//! [`crate::chat::ChatService`].

pub mod broadcast;
pub mod presence;
pub mod sessions;
pub mod subscription;

pub use broadcast::{ChatEvent, EventBroadcast};
pub use presence::PresenceTracker;
pub use sessions::SessionRegistry;
pub use subscription::SubscriptionIndex;
