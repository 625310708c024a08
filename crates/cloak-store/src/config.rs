//! # Store Configuration
//!
//! Backend selection and connection settings.
//! Secrets are loaded from environment variables.

use cloak_core::CloakError;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Which storage adapter to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process-local map, lost on restart
    Memory,
    /// Redis (or any RESP-compatible cache)
    Redis,
    /// Managed key-value service speaking the REST command protocol
    Kv,
    /// JSON file on local disk
    File,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Redis => "redis",
            StoreBackend::Kv => "kv",
            StoreBackend::File => "file",
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreBackend {
    type Err = CloakError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "redis" => Ok(StoreBackend::Redis),
            "kv" | "kv-rest" | "upstash" => Ok(StoreBackend::Kv),
            "file" => Ok(StoreBackend::File),
            other => Err(CloakError::Configuration(format!(
                "Unknown store backend: {}",
                other
            ))),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Redis connection URL (redis://...)
    pub redis_url: Option<String>,

    /// REST key-value endpoint
    pub kv_url: Option<String>,

    /// REST key-value bearer token
    pub kv_token: Option<String>,

    /// Path of the JSON file for the file backend
    pub file_path: PathBuf,
}

impl StoreConfig {
    /// Load configuration from environment variables.
    ///
    /// `CLOAK_STORE_BACKEND` picks the backend explicitly. When unset, the
    /// backend is inferred: `REDIS_URL` selects Redis, `KV_REST_API_URL` with
    /// `KV_REST_API_TOKEN` selects the REST service, otherwise the file store
    /// at `CLOAK_STORE_FILE` (default `data/cloak-tokens.json`).
    pub fn from_env() -> Result<Self, CloakError> {
        dotenvy::dotenv().ok();

        let redis_url = non_empty_var("REDIS_URL");
        let kv_url = non_empty_var("KV_REST_API_URL");
        let kv_token = non_empty_var("KV_REST_API_TOKEN");
        let file_path = non_empty_var("CLOAK_STORE_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(default_file_path);

        let backend = match non_empty_var("CLOAK_STORE_BACKEND") {
            Some(name) => name.parse()?,
            None if redis_url.is_some() => StoreBackend::Redis,
            None if kv_url.is_some() && kv_token.is_some() => StoreBackend::Kv,
            None => StoreBackend::File,
        };

        let config = Self {
            backend,
            redis_url,
            kv_url,
            kv_token,
            file_path,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn memory() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: None,
            kv_url: None,
            kv_token: None,
            file_path: default_file_path(),
        }
    }

    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            backend: StoreBackend::Redis,
            redis_url: Some(url.into()),
            ..Self::memory()
        }
    }

    pub fn kv(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            backend: StoreBackend::Kv,
            kv_url: Some(url.into()),
            kv_token: Some(token.into()),
            ..Self::memory()
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: StoreBackend::File,
            file_path: path.into(),
            ..Self::memory()
        }
    }

    /// Check that the selected backend has what it needs
    pub fn validate(&self) -> Result<(), CloakError> {
        match self.backend {
            StoreBackend::Redis => {
                let url = self.redis_url.as_deref().ok_or_else(|| {
                    CloakError::Configuration("REDIS_URL not set".to_string())
                })?;
                if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                    return Err(CloakError::Configuration(
                        "REDIS_URL must start with redis:// or rediss://".to_string(),
                    ));
                }
            }
            StoreBackend::Kv => {
                let url = self.kv_url.as_deref().ok_or_else(|| {
                    CloakError::Configuration("KV_REST_API_URL not set".to_string())
                })?;
                if !url.starts_with("https://") && !url.starts_with("http://") {
                    return Err(CloakError::Configuration(
                        "KV_REST_API_URL must be an http(s) URL".to_string(),
                    ));
                }
                if self.kv_token.is_none() {
                    return Err(CloakError::Configuration(
                        "KV_REST_API_TOKEN not set".to_string(),
                    ));
                }
            }
            StoreBackend::Memory | StoreBackend::File => {}
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::memory()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn default_file_path() -> PathBuf {
    PathBuf::from("data/cloak-tokens.json")
}
