//! # File Token Store
//!
//! Keeps every record in one JSON document on disk:
//!
//! ```json
//! { "param:abc": { "record": { "sessionId": "...", ... }, "evictAt": 1714564800000 } }
//! ```
//!
//! Each operation loads the document, applies the change and rewrites it
//! through a temp file and rename, all under one async mutex. Lapsed entries
//! are dropped whenever the document is rewritten.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cloak_core::{deadline_after, CloakError, CloakResult, SharedClock, SystemClock, TokenRecord, TokenStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileEntry {
    record: TokenRecord,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    evict_at: DateTime<Utc>,
}

type Document = BTreeMap<String, FileEntry>;

pub struct FileTokenStore {
    path: PathBuf,
    lock: Mutex<()>,
    clock: SharedClock,
}

impl FileTokenStore {
    pub async fn open(path: impl Into<PathBuf>) -> CloakResult<Self> {
        Self::open_with_clock(path, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock(path: impl Into<PathBuf>, clock: SharedClock) -> CloakResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(CloakError::backend)?;
        }
        info!("Using token file {}", path.display());
        Ok(Self {
            path,
            lock: Mutex::new(()),
            clock,
        })
    }

    async fn load(&self) -> CloakResult<Document> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) if raw.trim().is_empty() => Ok(Document::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Document::new()),
            Err(e) => Err(CloakError::backend(e)),
        }
    }

    async fn persist(&self, mut doc: Document) -> CloakResult<()> {
        let now = self.clock.now();
        doc.retain(|_, entry| entry.evict_at > now);

        let raw = serde_json::to_vec_pretty(&doc)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, raw)
            .await
            .map_err(CloakError::backend)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(CloakError::backend)?;
        Ok(())
    }

    fn is_live(&self, entry: &FileEntry) -> bool {
        entry.evict_at > self.clock.now()
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self, key: &str) -> CloakResult<Option<TokenRecord>> {
        let _lock = self.lock.lock().await;
        let doc = self.load().await?;
        Ok(doc
            .get(key)
            .filter(|entry| self.is_live(entry))
            .map(|entry| entry.record.clone()))
    }

    async fn set(&self, key: &str, record: &TokenRecord, ttl_secs: u64) -> CloakResult<()> {
        let _lock = self.lock.lock().await;
        let mut doc = self.load().await?;
        doc.insert(
            key.to_string(),
            FileEntry {
                record: record.clone(),
                evict_at: deadline_after(self.clock.now(), ttl_secs)?,
            },
        );
        self.persist(doc).await
    }

    async fn delete(&self, key: &str) -> CloakResult<bool> {
        let _lock = self.lock.lock().await;
        let mut doc = self.load().await?;
        let found = doc.remove(key).is_some_and(|entry| self.is_live(&entry));
        self.persist(doc).await?;
        Ok(found)
    }

    async fn list_keys(&self, prefix: &str) -> CloakResult<Vec<String>> {
        let _lock = self.lock.lock().await;
        let doc = self.load().await?;
        Ok(doc
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && self.is_live(entry))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn delete_all(&self, keys: &[String]) -> CloakResult<u64> {
        let _lock = self.lock.lock().await;
        let mut doc = self.load().await?;
        let removed = keys
            .iter()
            .filter_map(|key| doc.remove(key))
            .filter(|entry| self.is_live(entry))
            .count() as u64;
        self.persist(doc).await?;
        debug!("Deleted {} keys from {}", removed, self.path.display());
        Ok(removed)
    }

    async fn health_check(&self) -> CloakResult<()> {
        let _lock = self.lock.lock().await;
        self.load().await.map(|_| ())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
