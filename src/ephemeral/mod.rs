//! Ephemeral Storage
//!
//! Presence records, session registrations and chat subscriber sets are
//! fast-changing, loss-tolerant state. They live behind [`EphemeralStore`],
//! a small string-keyed interface with TTL support, kept separate from the
//! durable [`crate::store`] traits.
//!
//! Callers treat this store as advisory: a transient failure here degrades
//! to "offline" or "no subscribers" instead of failing the operation.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// TTL'd key/value plus keyed string sets
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Store a value under `key`, replacing any prior value and resetting
    /// the expiry clock
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Fetch the value under `key`; expired entries read as absent
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remove `key` if present
    async fn delete(&self, key: &str) -> Result<()>;

    /// Add `member` to the set under `key`
    ///
    /// When `ttl` is given the whole set's expiry clock is reset; `None`
    /// leaves the set without expiry.
    async fn set_add(&self, key: &str, member: &str, ttl: Option<Duration>) -> Result<()>;

    /// Remove `member` from the set under `key`
    async fn set_remove(&self, key: &str, member: &str) -> Result<()>;

    /// All members of the set under `key`; expired or missing sets read
    /// as empty
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;
}
