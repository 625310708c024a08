//! # Request Handlers
//!
//! Axum request handlers for the token API.
//! Lifecycle errors keep their own status code; storage failures are logged
//! and flattened into a generic invalid-request response.

use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, SecondsFormat, Utc};
use cloak_core::{CloakError, DeleteOutcome, TokenStatus};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Body of `POST /tokens`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenActionRequest {
    /// One of `create`, `bind_session`, `complete`, `expire`
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default, alias = "fhfh")]
    pub token: Option<String>,
    #[serde(default, alias = "stripeSessionId")]
    pub session_id: Option<String>,
    /// Legacy shorthand for `action: "complete"`
    #[serde(default)]
    pub payment_completed: bool,
}

/// Resolved mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenAction {
    Create,
    BindSession,
    Complete,
    Expire,
}

impl TokenActionRequest {
    /// Resolve the action. `paymentCompleted` wins over everything except
    /// `create` and `bind_session`.
    pub fn resolve(&self) -> Option<TokenAction> {
        match self.action.as_deref() {
            Some("create") => Some(TokenAction::Create),
            Some("bind_session") | Some("update_session") => Some(TokenAction::BindSession),
            _ if self.payment_completed => Some(TokenAction::Complete),
            Some("complete") => Some(TokenAction::Complete),
            Some("expire") => Some(TokenAction::Expire),
            _ => None,
        }
    }
}

/// Query string accepted by `GET` and `DELETE /tokens`
#[derive(Debug, Default, Deserialize)]
pub struct TokenParams {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub fhfh: Option<String>,
}

impl TokenParams {
    /// A present but blank token stays `Some` so it is rejected, not
    /// mistaken for a namespace reset.
    fn token(&self) -> Option<&str> {
        self.token.as_deref().or(self.fhfh.as_deref())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedResponse {
    pub token: String,
    /// Same value as `token`, for clients written against the old field name
    pub fhfh: String,
    pub expires_at: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedResponse {
    pub is_used: bool,
    pub is_expired: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<u64>,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            removed: None,
        }
    }
}

/// Body of `GET /tokens`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub is_used: bool,
    pub is_expired: bool,
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    pub time_remaining_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<TokenStatus> for StatusResponse {
    fn from(status: TokenStatus) -> Self {
        let message = status
            .is_absent()
            .then(|| "Token not found or expired".to_string());
        Self {
            is_used: status.is_used,
            is_expired: status.is_expired,
            is_valid: status.is_valid,
            session_id: status.session_id,
            created_at: status.created_at.map(iso8601),
            expires_at: status.expires_at.map(iso8601),
            time_remaining_ms: status.time_remaining_ms,
            message,
        }
    }
}

/// Body of `POST /cloak`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloakRequest {
    #[serde(default, alias = "stripeSessionId")]
    pub session_id: Option<String>,
    /// Provider checkout URL to hide behind the loading page
    #[serde(default)]
    pub checkout_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloakResponse {
    pub token: String,
    pub expires_at: String,
    /// Loading page URL that forwards to the checkout
    pub url: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// Error response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_used: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_expired: Option<bool>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16, kind: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code,
            kind: kind.into(),
            is_used: None,
            is_expired: None,
        }
    }

    fn with_flags(mut self, is_used: bool, is_expired: bool) -> Self {
        self.is_used = Some(is_used);
        self.is_expired = Some(is_expired);
        self
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn invalid_request() -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new("Invalid request", 400, "InvalidRequest")),
    )
}

fn cloak_error_to_response(err: CloakError) -> ApiError {
    if err.is_backend() {
        error!("Token store failure: {}", err);
        return invalid_request();
    }

    let code = err.status_code();
    let body = ErrorResponse::new(err.to_string(), code, err.kind());
    let body = match err {
        CloakError::NotFound { .. } | CloakError::Expired { .. } => body.with_flags(false, true),
        CloakError::Conflict { .. } => body.with_flags(true, false),
        _ => body,
    };
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(body),
    )
}

fn iso8601(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Constant-time comparison of a presented credential against the expected one
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let unauthorized = || {
        let err = CloakError::Unauthorized;
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new(err.to_string(), 401, err.kind())),
        )
    };

    let expected = state.config.auth_token.as_deref().ok_or_else(|| {
        warn!("Rejected /cloak call: CLOAKING_AUTH_TOKEN is not configured");
        unauthorized()
    })?;

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(unauthorized)?;

    if constant_time_compare(presented, expected) {
        Ok(())
    } else {
        Err(unauthorized())
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint, including a live backend probe
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let backend = state.manager.backend_name();
    match state.manager.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "healthy",
                "service": "cloak-link",
                "version": env!("CARGO_PKG_VERSION"),
                "backend": backend,
            })),
        ),
        Err(e) => {
            error!("Backend health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "unhealthy",
                    "service": "cloak-link",
                    "version": env!("CARGO_PKG_VERSION"),
                    "backend": backend,
                })),
            )
        }
    }
}

/// Which secrets are configured, by presence and length only
pub async fn env_status(State(state): State<AppState>) -> impl IntoResponse {
    let config = &state.config;
    Json(serde_json::json!({
        "status": "success",
        "environment": {
            "environment": config.environment,
            "cloakingAuthTokenExists": config.auth_token.is_some(),
            "cloakingAuthTokenLength": config.auth_token.as_ref().map_or(0, String::len),
            "storeBackend": config.store.backend.as_str(),
            "redisUrlExists": config.store.redis_url.is_some(),
            "kvRestApiUrlExists": config.store.kv_url.is_some(),
            "kvRestApiTokenExists": config.store.kv_token.is_some(),
        }
    }))
}

/// `POST /tokens`: create, bind_session, complete, expire
#[instrument(skip(state, payload))]
pub async fn mutate_token(
    State(state): State<AppState>,
    payload: Result<Json<TokenActionRequest>, JsonRejection>,
) -> Result<axum::response::Response, ApiError> {
    let Json(request) = payload.map_err(|e| {
        warn!("Rejected token request body: {}", e);
        invalid_request()
    })?;

    let action = request.resolve().ok_or_else(|| {
        cloak_error_to_response(CloakError::validation("Invalid action"))
    })?;

    let token = request.token.as_deref().unwrap_or_default();
    let session_id = request.session_id.as_deref().unwrap_or_default();

    let response = match action {
        TokenAction::Create => {
            let issued = state
                .manager
                .create(session_id)
                .await
                .map_err(cloak_error_to_response)?;
            (
                StatusCode::CREATED,
                Json(CreatedResponse {
                    fhfh: issued.token.clone(),
                    token: issued.token,
                    expires_at: iso8601(issued.expires_at),
                    message: "Token created successfully".to_string(),
                }),
            )
                .into_response()
        }
        TokenAction::BindSession => {
            state
                .manager
                .bind_session(token, session_id)
                .await
                .map_err(cloak_error_to_response)?;
            Json(MessageResponse::new("Session ID updated successfully")).into_response()
        }
        TokenAction::Complete => {
            state
                .manager
                .complete(token)
                .await
                .map_err(cloak_error_to_response)?;
            Json(CompletedResponse {
                is_used: false,
                is_expired: false,
                message: "Payment completed successfully".to_string(),
            })
            .into_response()
        }
        TokenAction::Expire => {
            state
                .manager
                .expire(token)
                .await
                .map_err(cloak_error_to_response)?;
            Json(MessageResponse::new("Token expired successfully")).into_response()
        }
    };

    info!("Token action {:?} succeeded", action);
    Ok(response)
}

/// `GET /tokens?token=...`
#[instrument(skip(state, params))]
pub async fn query_token(
    State(state): State<AppState>,
    params: Result<Query<TokenParams>, axum::extract::rejection::QueryRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Query(params) = params.map_err(|_| invalid_request())?;
    let token = params.token().unwrap_or_default();

    let status = state
        .manager
        .query(token)
        .await
        .map_err(cloak_error_to_response)?;

    Ok(Json(status.into()))
}

/// `DELETE /tokens[?token=...]`; without a token, wipes the namespace
#[instrument(skip(state, params))]
pub async fn delete_tokens(
    State(state): State<AppState>,
    params: Result<Query<TokenParams>, axum::extract::rejection::QueryRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Query(params) = params.map_err(|_| invalid_request())?;

    let outcome = state
        .manager
        .delete(params.token())
        .await
        .map_err(cloak_error_to_response)?;

    let response = match outcome {
        DeleteOutcome::Single { found: true } => MessageResponse::new("Token reset successfully"),
        DeleteOutcome::Single { found: false } => MessageResponse::new("Token not found"),
        DeleteOutcome::All { removed } => MessageResponse {
            message: "All tokens reset successfully".to_string(),
            removed: Some(removed),
        },
    };

    Ok(Json(response))
}

/// `POST /cloak`: mint a token and hand back the cloaked URLs
#[instrument(skip(state, headers, payload))]
pub async fn cloak_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CloakRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CloakResponse>), ApiError> {
    authorize(&state, &headers)?;

    let Json(request) = payload.map_err(|_| invalid_request())?;

    let checkout_url = match request.checkout_url.as_deref().map(str::trim) {
        None | Some("") => {
            return Err(cloak_error_to_response(CloakError::validation(
                "Missing checkoutUrl",
            )))
        }
        Some(url) if url.starts_with("https://") || url.starts_with("http://") => url,
        Some(_) => {
            return Err(cloak_error_to_response(CloakError::validation(
                "checkoutUrl must be an http(s) URL",
            )))
        }
    };

    let session_id = request
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| format!("temp_{}", Utc::now().timestamp_millis()));

    let issued = state
        .manager
        .create(&session_id)
        .await
        .map_err(cloak_error_to_response)?;

    info!("Issued cloaked link for session {}", issued.session_id);

    Ok((
        StatusCode::CREATED,
        Json(CloakResponse {
            url: state.links.loading_url(&issued.token, checkout_url),
            success_url: state.links.success_url(&issued.token),
            cancel_url: state.links.cancel_url(&issued.token),
            expires_at: iso8601(issued.expires_at),
            token: issued.token,
        }),
    ))
}
