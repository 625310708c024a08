//! # Cloak-Link RS
//!
//! Single-use token service that hides checkout URLs behind cloaked links.
//!
//! ## Usage
//!
//! ```bash
//! # Pick a backend (redis, kv, file, memory)
//! export REDIS_URL=redis://localhost:6379
//! export CLOAKING_AUTH_TOKEN=$(openssl rand -hex 32)
//!
//! # Run the server
//! cloak-server
//! ```

use cloak_api::{routes, state::AppConfig, state::AppState};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = AppConfig::from_env()?;
    let addr = config.socket_addr()?;
    let is_prod = config.is_production();

    info!("Environment: {}", config.environment);
    if config.auth_token.is_none() {
        warn!("CLOAKING_AUTH_TOKEN not set, /cloak will reject every request");
    }

    let state = AppState::new(config).await?;

    match state.manager.health_check().await {
        Ok(()) => info!("Token store ready: {}", state.manager.backend_name()),
        Err(e) => warn!("Token store not reachable yet: {}", e),
    }
    info!(
        "Token window: {}s, namespace: {}",
        state.manager.settings().token_ttl_secs,
        state.manager.settings().namespace
    );

    let app = routes::create_router(state);

    info!("Cloak-Link starting on http://{}", addr);

    if !is_prod {
        info!("Health: http://{}/health", addr);
        info!("Tokens: POST/GET/DELETE http://{}/tokens", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
