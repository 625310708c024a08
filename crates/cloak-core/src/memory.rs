//! # In-Memory Token Store
//!
//! Process-local backend. TTLs are tracked against an injected clock so
//! expiry is deterministic under test.

use crate::clock::{deadline_after, SharedClock, SystemClock};
use crate::error::CloakResult;
use crate::record::TokenRecord;
use crate::store::TokenStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Entry {
    record: TokenRecord,
    evict_at: DateTime<Utc>,
}

pub struct MemoryTokenStore {
    entries: RwLock<HashMap<String, Entry>>,
    clock: SharedClock,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of entries held, including ones whose TTL has lapsed but
    /// have not been touched since
    pub async fn raw_len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, key: &str) -> CloakResult<Option<TokenRecord>> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.evict_at > now => Ok(Some(entry.record.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, record: &TokenRecord, ttl_secs: u64) -> CloakResult<()> {
        let evict_at = deadline_after(self.clock.now(), ttl_secs)?;
        self.entries.write().await.insert(
            key.to_string(),
            Entry {
                record: record.clone(),
                evict_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CloakResult<bool> {
        let now = self.clock.now();
        Ok(self
            .entries
            .write()
            .await
            .remove(key)
            .is_some_and(|entry| entry.evict_at > now))
    }

    async fn list_keys(&self, prefix: &str) -> CloakResult<Vec<String>> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.evict_at > now);
        Ok(entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete_all(&self, keys: &[String]) -> CloakResult<u64> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let removed = keys
            .iter()
            .filter_map(|key| entries.remove(key))
            .filter(|entry| entry.evict_at > now)
            .count();
        Ok(removed as u64)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
