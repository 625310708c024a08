//! # cloak-store
//!
//! Storage adapters for the cloak-link token service.
//!
//! Every adapter implements [`cloak_core::TokenStore`], so the lifecycle
//! manager never knows which one it is talking to:
//!
//! 1. **RedisTokenStore** - Redis via a managed connection
//!    - Native per-key TTL (`SETEX`)
//!    - Best for: multi-instance deployments
//!
//! 2. **KvRestTokenStore** - managed key-value service over HTTPS
//!    - Same command set as Redis, sent as JSON
//!    - Best for: serverless hosts without raw TCP
//!
//! 3. **FileTokenStore** - one JSON document on local disk
//!    - Best for: single-instance and development setups
//!
//! The in-memory store lives in `cloak-core` and is selected with
//! `CLOAK_STORE_BACKEND=memory`.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cloak_store::{connect, StoreConfig};
//!
//! let store = connect(&StoreConfig::from_env()?).await?;
//! store.health_check().await?;
//! ```

pub mod cache;
pub mod config;
pub mod file;
pub mod kv;

// Re-exports
pub use cache::RedisTokenStore;
pub use config::{StoreBackend, StoreConfig};
pub use file::FileTokenStore;
pub use kv::KvRestTokenStore;

use cloak_core::{BoxedTokenStore, CloakError, CloakResult, MemoryTokenStore};
use std::sync::Arc;
use tracing::info;

/// Build the store selected by `config`
pub async fn connect(config: &StoreConfig) -> CloakResult<BoxedTokenStore> {
    config.validate()?;
    info!("Token store backend: {}", config.backend);

    let store: BoxedTokenStore = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryTokenStore::new()),
        StoreBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| CloakError::Configuration("REDIS_URL not set".to_string()))?;
            Arc::new(RedisTokenStore::connect(url).await?)
        }
        StoreBackend::Kv => {
            let (url, token) = config
                .kv_url
                .as_deref()
                .zip(config.kv_token.as_deref())
                .ok_or_else(|| {
                    CloakError::Configuration("KV_REST_API_URL/KV_REST_API_TOKEN not set".to_string())
                })?;
            Arc::new(KvRestTokenStore::new(url, token)?)
        }
        StoreBackend::File => Arc::new(FileTokenStore::open(&config.file_path).await?),
    };

    Ok(store)
}
