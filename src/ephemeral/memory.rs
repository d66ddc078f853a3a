//! In-Memory Ephemeral Store
//!
//! HashMap-backed TTL store. Expiry is lazy: entries past their deadline
//! are dropped on access rather than by a background task.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;

use super::EphemeralStore;

struct ValueEntry {
    value: String,
    expires_at: Instant,
}

struct SetEntry {
    members: HashSet<String>,
    expires_at: Option<Instant>,
}

/// In-memory implementation of the ephemeral store
#[derive(Default)]
pub struct MemoryEphemeralStore {
    values: RwLock<HashMap<String, ValueEntry>>,
    sets: RwLock<HashMap<String, SetEntry>>,
}

impl MemoryEphemeralStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EphemeralStore for MemoryEphemeralStore {
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut values = self.values.write().await;
        values.insert(
            key.to_string(),
            ValueEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        {
            let values = self.values.read().await;
            match values.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Entry exists but has expired; drop it under the write lock
        let mut values = self.values.write().await;
        if values.get(key).is_some_and(|e| e.expires_at <= now) {
            values.remove(key);
        }
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.values.write().await.remove(key);
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Option<Duration>) -> Result<()> {
        let now = Instant::now();
        let mut sets = self.sets.write().await;
        let entry = sets.entry(key.to_string()).or_insert_with(|| SetEntry {
            members: HashSet::new(),
            expires_at: None,
        });
        if entry.expires_at.is_some_and(|at| at <= now) {
            entry.members.clear();
            entry.expires_at = None;
        }
        entry.members.insert(member.to_string());
        if let Some(ttl) = ttl {
            entry.expires_at = Some(now + ttl);
        }
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        let mut sets = self.sets.write().await;
        if let Some(entry) = sets.get_mut(key) {
            entry.members.remove(member);
            if entry.members.is_empty() {
                sets.remove(key);
            }
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let now = Instant::now();
        let sets = self.sets.read().await;
        match sets.get(key) {
            Some(entry) if !entry.expires_at.is_some_and(|at| at <= now) => {
                Ok(entry.members.iter().cloned().collect())
            }
            _ => Ok(Vec::new()),
        }
    }
}
