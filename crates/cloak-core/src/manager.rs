//! # Token Lifecycle Manager
//!
//! Owns the token state machine:
//!
//! ```text
//! CREATED ──bind_session──▶ CREATED
//!    │
//!    ├──complete──▶ COMPLETED (completed=true, expires_at=now, ttl=1s) ──▶ REMOVED
//!    └──expire────▶ EXPIRED   (expires_at=now, ttl=1s)                 ──▶ REMOVED
//! ```
//!
//! Every operation runs the [`ExpirySweeper`] first. The store is injected at
//! construction; the manager holds no connection state of its own.

use crate::clock::{deadline_after, SharedClock, SystemClock};
use crate::error::{CloakError, CloakResult};
use crate::record::{IssuedToken, TokenRecord, TokenStatus};
use crate::store::{BoxedTokenStore, Namespace};
use crate::sweeper::ExpirySweeper;
use crate::token::{generate_token, looks_like_token};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, instrument, warn};

/// Upper bound for either TTL setting (one week)
pub const MAX_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Tunables for the lifecycle manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    /// Key prefix for token records
    pub namespace: String,

    /// Validity window of a fresh token, also its storage TTL
    pub token_ttl_secs: u64,

    /// Storage TTL applied once a token is completed or expired
    pub terminal_ttl_secs: u64,

    /// Serialize mutations of the same token inside this process.
    ///
    /// Without it two concurrent `complete` calls can both observe
    /// `completed == false` and both succeed.
    pub serialize_mutations: bool,

    /// Allow `bind_session` on completed or expired records
    pub allow_rebind_terminated: bool,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            namespace: "param".to_string(),
            token_ttl_secs: 30 * 60,
            terminal_ttl_secs: 1,
            serialize_mutations: true,
            allow_rebind_terminated: true,
        }
    }
}

impl ManagerSettings {
    /// Reject settings that would mint dead tokens or widen the key pattern.
    pub fn validate(&self) -> CloakResult<()> {
        if self.namespace.is_empty() || self.namespace.contains(['*', '?', '[', ']', ':']) {
            return Err(CloakError::Configuration(format!(
                "namespace {:?} must be non-empty and free of glob characters and ':'",
                self.namespace
            )));
        }
        for (name, ttl) in [
            ("token_ttl_secs", self.token_ttl_secs),
            ("terminal_ttl_secs", self.terminal_ttl_secs),
        ] {
            if !(1..=MAX_TTL_SECS).contains(&ttl) {
                return Err(CloakError::Configuration(format!(
                    "{} must be between 1 and {}, got {}",
                    name, MAX_TTL_SECS, ttl
                )));
            }
        }
        Ok(())
    }
}

/// What a delete call removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Targeted delete; `found` is false when the key was already gone
    Single { found: bool },
    /// Namespace-wide reset
    All { removed: u64 },
}

/// Per-token async mutexes. Idle slots are dropped on the next acquisition.
#[derive(Default)]
struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry(key.to_string()).or_default().clone()
        };
        slot.lock_owned().await
    }
}

#[derive(Clone)]
pub struct TokenManager {
    store: BoxedTokenStore,
    sweeper: ExpirySweeper,
    namespace: Namespace,
    clock: SharedClock,
    settings: ManagerSettings,
    locks: Arc<KeyedLocks>,
}

impl TokenManager {
    pub fn new(store: BoxedTokenStore, settings: ManagerSettings) -> Self {
        Self::with_clock(store, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(store: BoxedTokenStore, settings: ManagerSettings, clock: SharedClock) -> Self {
        let namespace = Namespace::new(settings.namespace.clone());
        let sweeper = ExpirySweeper::new(store.clone(), namespace.clone(), clock.clone());
        Self {
            store,
            sweeper,
            namespace,
            clock,
            settings,
            locks: Arc::new(KeyedLocks::default()),
        }
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    pub async fn health_check(&self) -> CloakResult<()> {
        self.store.health_check().await
    }

    /// Mint a token bound to `session_id`.
    #[instrument(skip(self))]
    pub async fn create(&self, session_id: &str) -> CloakResult<IssuedToken> {
        let session_id = required("sessionId", Some(session_id))?;
        self.sweeper.sweep().await;

        let now = self.clock.now();
        let expires_at = deadline_after(now, self.settings.token_ttl_secs)?;
        let token = generate_token();
        let record = TokenRecord::new(session_id, now, expires_at - now);

        self.store
            .set(&self.namespace.key(&token), &record, self.settings.token_ttl_secs)
            .await?;

        info!("Created token for session {}", session_id);

        Ok(IssuedToken {
            token,
            session_id: record.session_id,
            expires_at: record.expires_at,
        })
    }

    /// Rebind the checkout session of an existing token.
    #[instrument(skip(self))]
    pub async fn bind_session(&self, token: &str, session_id: &str) -> CloakResult<()> {
        let token = required("token", Some(token))?;
        let session_id = required("sessionId", Some(session_id))?;
        self.sweeper.sweep().await;
        let _guard = self.guard(token).await;

        let key = self.namespace.key(token);
        let mut record = self.load(token).await?.ok_or_else(|| not_found(token))?;

        if !self.settings.allow_rebind_terminated {
            if record.completed {
                return Err(CloakError::Conflict {
                    token: token.to_string(),
                });
            }
            if record.is_expired_at(self.clock.now()) {
                return Err(CloakError::Expired {
                    token: token.to_string(),
                });
            }
        }

        record.session_id = session_id.to_string();
        self.store
            .set(&key, &record, self.settings.token_ttl_secs)
            .await?;

        debug!("Bound token to session {}", session_id);
        Ok(())
    }

    /// Consume the token. Fails with not-found, conflict, or expired, checked
    /// in that order.
    #[instrument(skip(self))]
    pub async fn complete(&self, token: &str) -> CloakResult<()> {
        let token = required("token", Some(token))?;
        self.sweeper.sweep().await;
        let _guard = self.guard(token).await;

        let mut record = self.load(token).await?.ok_or_else(|| not_found(token))?;

        if record.completed {
            warn!("Rejected second completion");
            return Err(CloakError::Conflict {
                token: token.to_string(),
            });
        }

        let now = self.clock.now();
        if record.is_expired_at(now) {
            return Err(CloakError::Expired {
                token: token.to_string(),
            });
        }

        record.completed = true;
        record.expires_at = now;
        self.store
            .set(&self.namespace.key(token), &record, self.settings.terminal_ttl_secs)
            .await?;

        info!("Completed token for session {}", record.session_id);
        Ok(())
    }

    /// Force the token's deadline to now. Safe to repeat.
    #[instrument(skip(self))]
    pub async fn expire(&self, token: &str) -> CloakResult<()> {
        let token = required("token", Some(token))?;
        self.sweeper.sweep().await;
        let _guard = self.guard(token).await;

        let mut record = self.load(token).await?.ok_or_else(|| not_found(token))?;

        record.expires_at = self.clock.now();
        self.store
            .set(&self.namespace.key(token), &record, self.settings.terminal_ttl_secs)
            .await?;

        info!("Expired token for session {}", record.session_id);
        Ok(())
    }

    /// Report the validity of a token. Unknown tokens yield the absent shape.
    #[instrument(skip(self))]
    pub async fn query(&self, token: &str) -> CloakResult<TokenStatus> {
        let token = required("token", Some(token))?;
        self.sweeper.sweep().await;

        let status = match self.load(token).await? {
            Some(record) => TokenStatus::from_record(&record, self.clock.now()),
            None => TokenStatus::absent(),
        };

        Ok(status)
    }

    /// Delete one token, or every token in the namespace when `token` is `None`.
    /// A blank token is a validation error, never a namespace reset.
    #[instrument(skip(self))]
    pub async fn delete(&self, token: Option<&str>) -> CloakResult<DeleteOutcome> {
        match token {
            Some(token) => {
                let token = required("token", Some(token))?;
                self.sweeper.sweep().await;
                let _guard = self.guard(token).await;
                let found = looks_like_token(token)
                    && self.store.delete(&self.namespace.key(token)).await?;
                Ok(DeleteOutcome::Single { found })
            }
            None => {
                let keys = self.store.list_keys(&self.namespace.key_prefix()).await?;
                let removed = if keys.is_empty() {
                    0
                } else {
                    self.store.delete_all(&keys).await?
                };
                info!("Reset {} tokens", removed);
                Ok(DeleteOutcome::All { removed })
            }
        }
    }

    async fn load(&self, token: &str) -> CloakResult<Option<TokenRecord>> {
        if !looks_like_token(token) {
            return Ok(None);
        }
        self.store.get(&self.namespace.key(token)).await
    }

    async fn guard(&self, token: &str) -> Option<OwnedMutexGuard<()>> {
        if self.settings.serialize_mutations {
            Some(self.locks.acquire(token).await)
        } else {
            None
        }
    }
}

fn required<'a>(field: &str, value: Option<&'a str>) -> CloakResult<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CloakError::validation(format!("Missing {}", field)))
}

fn not_found(token: &str) -> CloakError {
    CloakError::NotFound {
        token: token.to_string(),
    }
}
