//! # REST Key-Value Token Store
//!
//! Adapter for managed key-value services that expose Redis commands over
//! HTTPS (Upstash, Vercel KV). Each command is a JSON array posted to the
//! base URL:
//!
//! ```text
//! POST {base_url}
//! Authorization: Bearer {token}
//!
//! ["SET", "param:abc", "{...}", "EX", "1800"]   →   {"result": "OK"}
//! ```
//!
//! Failures come back as `{"error": "..."}`.

use async_trait::async_trait;
use cloak_core::{CloakError, CloakResult, TokenRecord, TokenStore};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, instrument};

#[derive(Debug, Deserialize)]
struct CommandResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

pub struct KvRestTokenStore {
    client: Client,
    base_url: String,
    token: String,
}

impl KvRestTokenStore {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> CloakResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| CloakError::Configuration(format!("HTTP client: {}", e)))?;

        let base_url: String = base_url.into();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    #[instrument(skip(self, parts), fields(command = %parts.first().map(String::as_str).unwrap_or("")))]
    async fn command(&self, parts: &[String]) -> CloakResult<Value> {
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.token)
            .json(parts)
            .send()
            .await
            .map_err(CloakError::backend)?;

        let status = response.status();
        let body = response.text().await.map_err(CloakError::backend)?;

        let parsed: CommandResponse = serde_json::from_str(&body).map_err(|e| {
            CloakError::Backend(format!("Unreadable KV response (HTTP {}): {}", status, e))
        })?;

        if let Some(message) = parsed.error {
            error!("KV command failed: status={}, error={}", status, message);
            return Err(CloakError::Backend(message));
        }
        if !status.is_success() {
            return Err(CloakError::Backend(format!("HTTP {}", status)));
        }

        Ok(parsed.result)
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

fn as_count(value: &Value) -> u64 {
    value.as_u64().unwrap_or(0)
}

#[async_trait]
impl TokenStore for KvRestTokenStore {
    async fn get(&self, key: &str) -> CloakResult<Option<TokenRecord>> {
        match self.command(&args(["GET", key])).await? {
            Value::Null => Ok(None),
            Value::String(raw) => Ok(Some(TokenRecord::from_json(&raw)?)),
            other => Err(CloakError::Serialization(format!(
                "Unexpected GET result: {}",
                other
            ))),
        }
    }

    async fn set(&self, key: &str, record: &TokenRecord, ttl_secs: u64) -> CloakResult<()> {
        let value = record.to_json()?;
        let ttl = ttl_secs.max(1).to_string();
        self.command(&args(["SET", key, value.as_str(), "EX", ttl.as_str()])).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CloakResult<bool> {
        let result = self.command(&args(["DEL", key])).await?;
        Ok(as_count(&result) > 0)
    }

    async fn list_keys(&self, prefix: &str) -> CloakResult<Vec<String>> {
        let pattern = format!("{}*", prefix);
        let result = self.command(&args(["KEYS", pattern.as_str()])).await?;
        let keys: Vec<String> = serde_json::from_value(result)?;
        Ok(keys)
    }

    async fn delete_all(&self, keys: &[String]) -> CloakResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut command = Vec::with_capacity(keys.len() + 1);
        command.push("DEL".to_string());
        command.extend(keys.iter().cloned());

        let removed = as_count(&self.command(&command).await?);
        debug!("Deleted {} keys from KV", removed);
        Ok(removed)
    }

    async fn health_check(&self) -> CloakResult<()> {
        match self.command(&args(["PING"])).await? {
            Value::String(pong) if pong == "PONG" => Ok(()),
            other => Err(CloakError::Backend(format!(
                "Unexpected PING reply: {}",
                other
            ))),
        }
    }

    fn backend_name(&self) -> &'static str {
        "kv"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_command(server: &MockServer, command: Value, response: Value) {
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer kv_token"))
            .and(body_json(command))
            .respond_with(ResponseTemplate::new(200).set_body_json(response))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_get_present_and_absent() {
        let server = MockServer::start().await;
        let record = TokenRecord::new("s1", Utc::now(), Duration::minutes(30));

        mock_command(
            &server,
            json!(["GET", "param:a"]),
            json!({ "result": record.to_json().unwrap() }),
        )
        .await;
        mock_command(&server, json!(["GET", "param:b"]), json!({ "result": null })).await;

        let store = KvRestTokenStore::new(server.uri(), "kv_token").unwrap();
        let fetched = store.get("param:a").await.unwrap().unwrap();

        assert_eq!(fetched.session_id, "s1");
        assert_eq!(
            fetched.expires_at.timestamp_millis(),
            record.expires_at.timestamp_millis()
        );
        assert!(store.get("param:b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_sends_ttl() {
        let server = MockServer::start().await;
        let record = TokenRecord::new("s1", Utc::now(), Duration::minutes(30));

        mock_command(
            &server,
            json!(["SET", "param:a", record.to_json().unwrap(), "EX", "1800"]),
            json!({ "result": "OK" }),
        )
        .await;

        let store = KvRestTokenStore::new(server.uri(), "kv_token").unwrap();
        store.set("param:a", &record, 1800).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_and_delete_all() {
        let server = MockServer::start().await;

        mock_command(
            &server,
            json!(["KEYS", "param:*"]),
            json!({ "result": ["param:a", "param:b"] }),
        )
        .await;
        mock_command(
            &server,
            json!(["DEL", "param:a", "param:b"]),
            json!({ "result": 2 }),
        )
        .await;

        let store = KvRestTokenStore::new(server.uri(), "kv_token").unwrap();
        let keys = store.list_keys("param:").await.unwrap();
        assert_eq!(keys, vec!["param:a", "param:b"]);
        assert_eq!(store.delete_all(&keys).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_error_response_is_backend_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "error": "Unauthorized" })),
            )
            .mount(&server)
            .await;

        let store = KvRestTokenStore::new(server.uri(), "kv_token").unwrap();
        let err = store.delete("param:a").await.unwrap_err();

        assert!(err.is_backend());
        assert!(err.to_string().contains("Unauthorized"));
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        mock_command(&server, json!(["PING"]), json!({ "result": "PONG" })).await;

        let store = KvRestTokenStore::new(server.uri(), "kv_token").unwrap();
        store.health_check().await.unwrap();
    }
}
