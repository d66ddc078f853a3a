//! ChatX Core
//!
//! The presence, fan-out and chat-membership consistency core of a
//! real-time messaging backend. This crate owns the state that must stay
//! correct under concurrent access: who belongs to which chat and with
//! what role, which messages were delivered to and seen by whom, who is
//! online over which connections, and who is subscribed to which chat's
//! event stream.
//!
//! # Module Structure
//!
//! - **`model`** - the persisted documents: users, chats, messages,
//!   friend requests, notifications
//! - **`store`** - the durable storage traits with in-memory and
//!   PostgreSQL backends, built around per-document optimistic locking
//! - **`ephemeral`** - TTL'd key/value and set storage for presence,
//!   sessions and subscriber sets
//! - **`chat`**, **`messaging`**, **`friends`**, **`notifications`** -
//!   the domain services layered over the stores
//! - **`realtime`** - presence tracking, session registry, subscription
//!   index and per-chat event broadcasting
//! - **`retention`** - periodic cleanup sweeps
//! - **`app`** - wiring of all of the above into one bundle
//!
//! # Concurrency
//!
//! Every persisted document carries a version counter. Mutations are
//! read-modify-write loops with compare-and-swap persistence, so two
//! concurrent admin actions on the same chat both land instead of one
//! silently clobbering the other.
//!
//! # Usage
//!
//! ```rust,no_run
//! use chatx::{App, NewMessage, Settings};
//!
//! # async fn example() -> chatx::Result<()> {
//! let app = App::in_memory(Settings::from_env());
//!
//! let alice = uuid::Uuid::new_v4();
//! let bob = uuid::Uuid::new_v4();
//! let chat = app.chats.create_private_chat(alice, bob).await?;
//! let (message, outcome) = app
//!     .send_message(chat.id, alice, NewMessage::text("hello"))
//!     .await?;
//! println!("reached {} live receivers", outcome.live_receivers);
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod chat;
pub mod config;
pub mod ephemeral;
pub mod error;
pub mod friends;
pub mod messaging;
pub mod model;
pub mod notifications;
pub mod realtime;
pub mod retention;
pub mod store;

pub use app::App;
pub use config::Settings;
pub use error::{ChatError, Result};
pub use messaging::NewMessage;

/// Initialize tracing with an `RUST_LOG`-driven filter
///
/// Call once at startup; repeated calls are ignored.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
