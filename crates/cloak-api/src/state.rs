//! # Application State
//!
//! Shared state for the Axum application.
//! Contains the token manager, link builder, and configuration.

use anyhow::Context;
use cloak_core::{BoxedTokenStore, CloakedLinks, ManagerSettings, TokenManager};
use cloak_store::StoreConfig;
use std::sync::Arc;

/// Minimum length accepted for `CLOAKING_AUTH_TOKEN`
pub const MIN_AUTH_TOKEN_LEN: usize = 32;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Public origin used in cloaked URLs
    pub base_url: String,
    /// Environment (development, staging, production)
    pub environment: String,
    /// Bearer token guarding `/cloak`; the endpoint refuses every call when unset
    pub auth_token: Option<String>,
    /// Storage backend
    pub store: StoreConfig,
    /// Lifecycle tunables
    pub manager: ManagerSettings,
}

impl AppConfig {
    /// Load from environment variables, layered over `config/cloak.toml` if present
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let auth_token = std::env::var("CLOAKING_AUTH_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());
        if let Some(token) = &auth_token {
            if token.len() < MIN_AUTH_TOKEN_LEN {
                anyhow::bail!(
                    "CLOAKING_AUTH_TOKEN must be at least {} characters",
                    MIN_AUTH_TOKEN_LEN
                );
            }
        }

        let mut manager = load_manager_settings()?;
        apply_manager_env(&mut manager)?;
        manager
            .validate()
            .context("Invalid manager settings")?;

        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            base_url: std::env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            environment: std::env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            auth_token,
            store: StoreConfig::from_env()?,
            manager,
        })
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid socket address {}:{}", self.host, self.port))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            base_url: "http://localhost:8080".to_string(),
            environment: "development".to_string(),
            auth_token: None,
            store: StoreConfig::memory(),
            manager: ManagerSettings::default(),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Token lifecycle manager
    pub manager: TokenManager,
    /// Cloaked URL builder
    pub links: CloakedLinks,
    /// Application config
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Connect the configured store and build the state
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let store = cloak_store::connect(&config.store)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize token store: {}", e))?;
        Ok(Self::with_store(config, store))
    }

    /// Build the state around an already constructed store
    pub fn with_store(config: AppConfig, store: BoxedTokenStore) -> Self {
        let manager = TokenManager::new(store, config.manager.clone());
        Self::with_manager(config, manager)
    }

    pub fn with_manager(config: AppConfig, manager: TokenManager) -> Self {
        Self {
            manager,
            links: CloakedLinks::new(&config.base_url),
            config: Arc::new(config),
        }
    }
}

/// Load manager settings from config file
fn load_manager_settings() -> anyhow::Result<ManagerSettings> {
    let config_paths = [
        "config/cloak.toml",
        "../config/cloak.toml",
        "../../config/cloak.toml",
    ];

    for path in config_paths {
        if let Ok(content) = std::fs::read_to_string(path) {
            let settings: ManagerSettings = toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path))?;
            tracing::info!("Loaded manager settings from {}", path);
            return Ok(settings);
        }
    }

    Ok(ManagerSettings::default())
}

fn apply_manager_env(settings: &mut ManagerSettings) -> anyhow::Result<()> {
    if let Ok(namespace) = std::env::var("CLOAK_NAMESPACE") {
        settings.namespace = namespace;
    }
    if let Ok(ttl) = std::env::var("CLOAK_TOKEN_TTL_SECS") {
        settings.token_ttl_secs = ttl
            .parse()
            .with_context(|| format!("Invalid CLOAK_TOKEN_TTL_SECS: {}", ttl))?;
    }
    if let Ok(flag) = std::env::var("CLOAK_SERIALIZE_MUTATIONS") {
        settings.serialize_mutations = parse_flag(&flag)?;
    }
    if let Ok(flag) = std::env::var("CLOAK_ALLOW_REBIND_TERMINATED") {
        settings.allow_rebind_terminated = parse_flag(&flag)?;
    }
    Ok(())
}

fn parse_flag(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("Invalid boolean flag: {}", other),
    }
}
