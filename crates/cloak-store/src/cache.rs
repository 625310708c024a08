//! # Redis Token Store
//!
//! Records are JSON strings written with `SETEX`, so Redis evicts them on
//! its own once the TTL runs out.

use async_trait::async_trait;
use cloak_core::{CloakError, CloakResult, TokenRecord, TokenStore};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info};

/// Redis-backed store.
///
/// Holds one `ConnectionManager`, which reconnects on failure. Each operation
/// clones it and drops the clone when done.
#[derive(Clone)]
pub struct RedisTokenStore {
    conn: ConnectionManager,
}

impl RedisTokenStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Open a client and establish the managed connection
    pub async fn connect(url: &str) -> CloakResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| CloakError::Configuration(format!("Invalid REDIS_URL: {}", e)))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(CloakError::backend)?;
        info!("Connected to Redis");
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn get(&self, key: &str) -> CloakResult<Option<TokenRecord>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await.map_err(CloakError::backend)?;
        raw.map(|raw| TokenRecord::from_json(&raw))
            .transpose()
            .map_err(CloakError::from)
    }

    async fn set(&self, key: &str, record: &TokenRecord, ttl_secs: u64) -> CloakResult<()> {
        let mut conn = self.conn.clone();
        let value = record.to_json()?;
        let _: () = conn
            .set_ex(key, value, ttl_secs.max(1))
            .await
            .map_err(CloakError::backend)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CloakResult<bool> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(key).await.map_err(CloakError::backend)?;
        Ok(removed > 0)
    }

    async fn list_keys(&self, prefix: &str) -> CloakResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn
            .keys(format!("{}*", prefix))
            .await
            .map_err(CloakError::backend)?;
        Ok(keys)
    }

    async fn delete_all(&self, keys: &[String]) -> CloakResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(keys).await.map_err(CloakError::backend)?;
        debug!("Deleted {} keys from Redis", removed);
        Ok(removed)
    }

    async fn health_check(&self) -> CloakResult<()> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(CloakError::backend)?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(CloakError::Backend(format!("Unexpected PING reply: {}", pong)))
        }
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
    }

    #[tokio::test]
    async fn test_invalid_url_is_configuration_error() {
        let result = RedisTokenStore::connect("not a url").await;
        assert!(matches!(result, Err(CloakError::Configuration(_))));
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_set_get_delete() {
        let store = RedisTokenStore::connect(&redis_url()).await.unwrap();
        store.health_check().await.unwrap();

        let record = TokenRecord::new("s1", Utc::now(), Duration::minutes(30));
        store.set("cloaktest:a", &record, 5).await.unwrap();
        assert_eq!(store.get("cloaktest:a").await.unwrap(), Some(record));

        let keys = store.list_keys("cloaktest:").await.unwrap();
        assert!(keys.contains(&"cloaktest:a".to_string()));

        assert!(store.delete("cloaktest:a").await.unwrap());
        assert_eq!(store.get("cloaktest:a").await.unwrap(), None);
        assert_eq!(store.delete_all(&[]).await.unwrap(), 0);
    }
}
