//! # Token Store Trait
//!
//! Storage contract shared by every backend.
//! Implementations: in-memory, Redis, REST key-value service, JSON file.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TokenStore (trait)                      │
//! │  ├── get() / set(ttl) / delete()                            │
//! │  ├── list_keys() / delete_all()                             │
//! │  └── health_check()                                         │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!      ┌──────────────┬──────┴───────┬──────────────┐
//!      │              │              │              │
//!  ┌───┴────┐   ┌─────┴────┐   ┌─────┴────┐   ┌─────┴────┐
//!  │ Memory │   │  Redis   │   │ KV REST  │   │   File   │
//!  └────────┘   └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! Records are always written whole; there are no partial-field updates.
//! `set` overwrites and restarts the TTL countdown.

use crate::error::CloakResult;
use crate::record::TokenRecord;
use async_trait::async_trait;
use std::sync::Arc;

/// Key/record storage with per-key expiry.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Read a record, `None` if absent or its TTL has elapsed.
    async fn get(&self, key: &str) -> CloakResult<Option<TokenRecord>>;

    /// Write a record, replacing any previous value and resetting its TTL.
    async fn set(&self, key: &str, record: &TokenRecord, ttl_secs: u64) -> CloakResult<()>;

    /// Remove a key. Returns whether it was present.
    async fn delete(&self, key: &str) -> CloakResult<bool>;

    /// List every live key starting with `prefix`.
    async fn list_keys(&self, prefix: &str) -> CloakResult<Vec<String>>;

    /// Remove many keys at once. Returns how many were present.
    async fn delete_all(&self, keys: &[String]) -> CloakResult<u64>;

    /// Probe backend connectivity.
    async fn health_check(&self) -> CloakResult<()> {
        Ok(())
    }

    /// Backend name (for logging and diagnostics).
    fn backend_name(&self) -> &'static str;
}

/// Type alias for a shared store (dynamic dispatch)
pub type BoxedTokenStore = Arc<dyn TokenStore>;

/// Key layout for tokens under a fixed prefix, e.g. `param:abc123`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    prefix: String,
}

impl Namespace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn key(&self, token: &str) -> String {
        format!("{}:{}", self.prefix, token)
    }

    /// Prefix that every key in this namespace starts with
    pub fn key_prefix(&self) -> String {
        format!("{}:", self.prefix)
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new("param")
    }
}
