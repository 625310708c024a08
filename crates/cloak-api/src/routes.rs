//! # Routes
//!
//! Axum router configuration for the token API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - Tokens:
///   - POST   /tokens - create / bind_session / complete / expire
///   - GET    /tokens?token= - query status
///   - DELETE /tokens[?token=] - reset one or all
///   - /api/used-params - same handlers under the legacy path
///
/// - Cloaking:
///   - POST /cloak - mint a token and return cloaked URLs (bearer auth)
///
/// - Diagnostics:
///   - GET /health
///   - GET /env-status
pub fn create_router(state: AppState) -> Router {
    // The view pages call these endpoints from the browser
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let token_routes = get(handlers::query_token)
        .post(handlers::mutate_token)
        .delete(handlers::delete_tokens);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .route("/env-status", get(handlers::env_status))
        .route("/tokens", token_routes.clone())
        .route("/api/used-params", token_routes)
        .route("/cloak", post(handlers::cloak_checkout))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
