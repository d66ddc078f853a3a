//! Application Wiring
//!
//! Assembles the stores and services into one bundle the API layer can
//! hold. Two constructors: [`App::in_memory`] for tests and single-node
//! setups without a database, [`App::connect`] for the Postgres backend.

use std::sync::Arc;

use uuid::Uuid;

use crate::chat::ChatService;
use crate::config::Settings;
use crate::ephemeral::memory::MemoryEphemeralStore;
use crate::ephemeral::EphemeralStore;
use crate::error::{ChatError, Result};
use crate::friends::FriendService;
use crate::messaging::fanout::FanoutOutcome;
use crate::messaging::{Fanout, MessageService, NewMessage};
use crate::model::Message;
use crate::notifications::NotificationService;
use crate::realtime::{EventBroadcast, PresenceTracker, SessionRegistry, SubscriptionIndex};
use crate::retention::Sweeper;
use crate::store::memory::MemoryStore;
use crate::store::postgres::PgStore;
use crate::store::Store;

/// All services wired over a shared store pair
#[derive(Clone)]
pub struct App {
    pub settings: Settings,
    pub store: Arc<dyn Store>,
    pub chats: ChatService,
    pub messages: MessageService,
    pub friends: FriendService,
    pub notifications: NotificationService,
    pub presence: PresenceTracker,
    pub sessions: SessionRegistry,
    pub subscriptions: SubscriptionIndex,
    pub broadcast: EventBroadcast,
    pub fanout: Fanout,
    pub sweeper: Sweeper,
}

impl App {
    /// Wire everything over in-memory stores
    pub fn in_memory(settings: Settings) -> Self {
        Self::assemble(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryEphemeralStore::new()),
            settings,
        )
    }

    /// Wire everything over the Postgres store
    ///
    /// Requires `Settings::database_url`; the ephemeral half stays
    /// in-process.
    pub async fn connect(settings: Settings) -> Result<Self> {
        let url = settings
            .database_url
            .clone()
            .ok_or_else(|| ChatError::invalid_input("DATABASE_URL is not set"))?;
        let store = Arc::new(PgStore::connect(&url).await?);
        tracing::info!("connected to postgres store");
        Ok(Self::assemble(
            store,
            Arc::new(MemoryEphemeralStore::new()),
            settings,
        ))
    }

    fn assemble(
        store: Arc<dyn Store>,
        ephemeral: Arc<dyn EphemeralStore>,
        settings: Settings,
    ) -> Self {
        let chats = ChatService::new(store.clone());
        let messages = MessageService::new(store.clone(), chats.clone());
        let friends = FriendService::new(store.clone());
        let notifications = NotificationService::new(store.clone());
        let presence = PresenceTracker::new(ephemeral.clone(), store.clone(), &settings);
        let sessions = SessionRegistry::new(ephemeral.clone(), &settings);
        let subscriptions = SubscriptionIndex::new(ephemeral);
        let broadcast = EventBroadcast::new();
        let fanout = Fanout::new(
            store.clone(),
            subscriptions.clone(),
            broadcast.clone(),
            notifications.clone(),
        );
        let sweeper = Sweeper::new(store.clone(), &settings);
        Self {
            settings,
            store,
            chats,
            messages,
            friends,
            notifications,
            presence,
            sessions,
            subscriptions,
            broadcast,
            fanout,
            sweeper,
        }
    }

    /// Send a message and fan it out in one call
    pub async fn send_message(
        &self,
        chat_id: Uuid,
        sender_id: Uuid,
        new: NewMessage,
    ) -> Result<(Message, FanoutOutcome)> {
        let (message, chat) = self.messages.send(chat_id, sender_id, new).await?;
        let outcome = self.fanout.message_created(&chat, &message).await?;
        Ok((message, outcome))
    }
}
