use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::{Duration, Utc};
use cloak_api::{create_router, AppConfig, AppState};
use cloak_core::{CloakResult, ManagerSettings, ManualClock, MemoryTokenStore, TokenManager, TokenRecord, TokenStore};
use serde_json::{json, Value};
use std::sync::Arc;

const AUTH_TOKEN: &str = "0123456789abcdef0123456789abcdef";

struct Harness {
    server: TestServer,
    clock: Arc<ManualClock>,
}

fn harness_with(config: AppConfig) -> Harness {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let store = Arc::new(MemoryTokenStore::with_clock(clock.clone()));
    let manager = TokenManager::with_clock(store, ManagerSettings::default(), clock.clone());
    let state = AppState::with_manager(config, manager);
    Harness {
        server: TestServer::new(create_router(state)).unwrap(),
        clock,
    }
}

fn harness() -> Harness {
    harness_with(AppConfig {
        base_url: "https://pay.example.com".to_string(),
        auth_token: Some(AUTH_TOKEN.to_string()),
        ..AppConfig::default()
    })
}

async fn create_token(server: &TestServer, session_id: &str) -> String {
    let response = server
        .post("/tokens")
        .json(&json!({ "action": "create", "sessionId": session_id }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    body["token"].as_str().unwrap().to_string()
}

async fn status_of(server: &TestServer, token: &str) -> Value {
    let response = server.get("/tokens").add_query_param("token", token).await;
    response.assert_status_ok();
    response.json()
}

#[tokio::test]
async fn create_then_query_roundtrip() {
    let h = harness();

    let response = h
        .server
        .post("/tokens")
        .json(&json!({ "action": "create", "sessionId": "s1" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    let token = body["token"].as_str().unwrap();
    assert_eq!(body["fhfh"], token);
    assert!(body["expiresAt"].as_str().unwrap().ends_with('Z'));

    let status = status_of(&h.server, token).await;
    assert_eq!(status["isValid"], true);
    assert_eq!(status["isUsed"], false);
    assert_eq!(status["isExpired"], false);
    assert_eq!(status["sessionId"], "s1");
    assert_eq!(status["timeRemainingMs"], 30 * 60 * 1000);
}

#[tokio::test]
async fn create_without_session_is_rejected() {
    let h = harness();

    let response = h.server.post("/tokens").json(&json!({ "action": "create" })).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["kind"], "ValidationError");
}

#[tokio::test]
async fn second_completion_conflicts() {
    let h = harness();
    let token = create_token(&h.server, "s1").await;

    let first = h
        .server
        .post("/tokens")
        .json(&json!({ "action": "complete", "token": token }))
        .await;
    first.assert_status_ok();
    let body: Value = first.json();
    assert_eq!(body["isUsed"], false);
    assert_eq!(body["isExpired"], false);

    let second = h
        .server
        .post("/tokens")
        .json(&json!({ "action": "complete", "token": token }))
        .await;
    second.assert_status(StatusCode::CONFLICT);
    let body: Value = second.json();
    assert_eq!(body["kind"], "ConflictError");
    assert_eq!(body["isUsed"], true);
}

#[tokio::test]
async fn legacy_payment_completed_flag() {
    let h = harness();
    let token = create_token(&h.server, "s1").await;

    h.server
        .post("/api/used-params")
        .json(&json!({ "fhfh": token, "paymentCompleted": true }))
        .await
        .assert_status_ok();

    let status = h
        .server
        .get("/api/used-params")
        .add_query_param("fhfh", &token)
        .await;
    let body: Value = status.json();
    assert_eq!(body["isUsed"], true);
    assert_eq!(body["isValid"], false);
}

#[tokio::test]
async fn complete_unknown_token_is_not_found() {
    let h = harness();

    let response = h
        .server
        .post("/tokens")
        .json(&json!({ "action": "complete", "token": "nonexistent" }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["kind"], "NotFoundError");
    assert_eq!(body["isExpired"], true);
}

#[tokio::test]
async fn unknown_token_reports_absent_shape() {
    let h = harness();

    let body = status_of(&h.server, "nonexistent").await;
    assert_eq!(body["isValid"], false);
    assert_eq!(body["isExpired"], true);
    assert_eq!(body["isUsed"], false);
    assert!(body.get("sessionId").is_none());
}

#[tokio::test]
async fn query_without_token_is_validation_error() {
    let h = harness();

    let response = h.server.get("/tokens").await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn token_expires_by_deadline() {
    let h = harness();
    let token = create_token(&h.server, "s1").await;

    h.clock.advance(Duration::minutes(31));

    let body = status_of(&h.server, &token).await;
    assert_eq!(body["isExpired"], true);
    assert_eq!(body["isValid"], false);
}

#[tokio::test]
async fn completed_token_disappears_after_terminal_ttl() {
    let h = harness();
    let token = create_token(&h.server, "s1").await;

    h.server
        .post("/tokens")
        .json(&json!({ "action": "complete", "token": token }))
        .await
        .assert_status_ok();

    let body = status_of(&h.server, &token).await;
    assert_eq!(body["isUsed"], true);

    h.clock.advance(Duration::seconds(2));

    let body = status_of(&h.server, &token).await;
    assert_eq!(body["isUsed"], false);
    assert_eq!(body["isExpired"], true);
    assert!(body.get("sessionId").is_none());
}

#[tokio::test]
async fn expire_twice_succeeds() {
    let h = harness();
    let token = create_token(&h.server, "s1").await;

    for _ in 0..2 {
        h.server
            .post("/tokens")
            .json(&json!({ "action": "expire", "token": token }))
            .await
            .assert_status_ok();
    }

    let missing = h
        .server
        .post("/tokens")
        .json(&json!({ "action": "expire" }))
        .await;
    missing.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bind_session_updates_record() {
    let h = harness();
    let token = create_token(&h.server, "temp_1").await;

    h.server
        .post("/tokens")
        .json(&json!({ "action": "update_session", "fhfh": token, "stripeSessionId": "cs_test_9" }))
        .await
        .assert_status_ok();

    let body = status_of(&h.server, &token).await;
    assert_eq!(body["sessionId"], "cs_test_9");

    h.server
        .post("/tokens")
        .json(&json!({ "action": "bind_session", "token": "missing", "sessionId": "x" }))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_action_and_body() {
    let h = harness();

    h.server
        .post("/tokens")
        .json(&json!({ "action": "explode" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let response = h.server.post("/tokens").text("not json").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "Invalid request");
}

#[tokio::test]
async fn delete_single_and_bulk() {
    let h = harness();
    let a = create_token(&h.server, "s1").await;
    let b = create_token(&h.server, "s2").await;

    let response = h.server.delete("/tokens").add_query_param("token", &a).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["message"], "Token reset successfully");

    let response = h.server.delete("/tokens").add_query_param("token", &a).await;
    let body: Value = response.json();
    assert_eq!(body["message"], "Token not found");

    let response = h.server.delete("/tokens").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["removed"], 1);

    let status = status_of(&h.server, &b).await;
    assert_eq!(status["isValid"], false);
    assert_eq!(status["isExpired"], true);
}

#[tokio::test]
async fn delete_with_blank_token_keeps_other_tokens() {
    let h = harness();
    let tokens = [
        create_token(&h.server, "s1").await,
        create_token(&h.server, "s2").await,
        create_token(&h.server, "s3").await,
    ];

    for blank in ["", " "] {
        let response = h.server.delete("/tokens").add_query_param("token", blank).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["kind"], "ValidationError");
    }

    for token in &tokens {
        assert_eq!(status_of(&h.server, token).await["isValid"], true);
    }
}

#[tokio::test]
async fn cloak_requires_bearer_token() {
    let h = harness();

    h.server
        .post("/cloak")
        .json(&json!({ "checkoutUrl": "https://checkout.stripe.com/c/pay/cs_1" }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    h.server
        .post("/cloak")
        .authorization_bearer("wrong-token")
        .json(&json!({ "checkoutUrl": "https://checkout.stripe.com/c/pay/cs_1" }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn cloak_is_disabled_without_configured_token() {
    let h = harness_with(AppConfig::default());

    h.server
        .post("/cloak")
        .authorization_bearer(AUTH_TOKEN)
        .json(&json!({}))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn cloak_issues_urls() {
    let h = harness();

    let response = h
        .server
        .post("/cloak")
        .authorization_bearer(AUTH_TOKEN)
        .json(&json!({
            "sessionId": "cs_test_1",
            "checkoutUrl": "https://checkout.stripe.com/c/pay/cs_test_1"
        }))
        .await;
    response.assert_status(StatusCode::CREATED);

    let body: Value = response.json();
    let token = body["token"].as_str().unwrap();
    assert_eq!(
        body["successUrl"],
        format!("https://pay.example.com/thankyou?fhfh={}", token)
    );
    assert_eq!(
        body["cancelUrl"],
        format!("https://pay.example.com/cancel?fhfh={}", token)
    );
    assert_eq!(
        body["url"],
        format!(
            "https://pay.example.com/loading?fhfh={}&stripe_url=https%3A%2F%2Fcheckout.stripe.com%2Fc%2Fpay%2Fcs_test_1",
            token
        )
    );

    let status = status_of(&h.server, token).await;
    assert_eq!(status["sessionId"], "cs_test_1");
    assert_eq!(status["isValid"], true);
}

#[tokio::test]
async fn cloak_requires_checkout_url() {
    let h = harness();

    for body in [json!({}), json!({ "sessionId": "s1" }), json!({ "checkoutUrl": "  " })] {
        let response = h
            .server
            .post("/cloak")
            .authorization_bearer(AUTH_TOKEN)
            .json(&body)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["kind"], "ValidationError");
    }

    h.server
        .post("/cloak")
        .authorization_bearer(AUTH_TOKEN)
        .json(&json!({ "checkoutUrl": "javascript:alert(1)" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    // Nothing was minted by the rejected calls
    let response = h.server.delete("/tokens").await;
    let body: Value = response.json();
    assert_eq!(body["removed"], 0);
}

#[tokio::test]
async fn cloak_defaults_to_temporary_session() {
    let h = harness();

    let response = h
        .server
        .post("/cloak")
        .authorization_bearer(AUTH_TOKEN)
        .json(&json!({ "checkoutUrl": "https://checkout.stripe.com/c/pay/cs_2" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    let token = body["token"].as_str().unwrap();
    assert!(body["url"]
        .as_str()
        .unwrap()
        .starts_with(&format!("https://pay.example.com/loading?fhfh={}", token)));

    let status = status_of(&h.server, token).await;
    assert!(status["sessionId"].as_str().unwrap().starts_with("temp_"));
}

#[tokio::test]
async fn health_and_env_status() {
    let h = harness();

    let response = h.server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["backend"], "memory");

    let response = h.server.get("/env-status").await;
    let body: Value = response.json();
    assert_eq!(body["environment"]["cloakingAuthTokenExists"], true);
    assert_eq!(body["environment"]["cloakingAuthTokenLength"], AUTH_TOKEN.len());
    assert!(!response.text().contains(AUTH_TOKEN));
}

/// Store that answers every call with a backend failure
struct DownStore;

#[async_trait::async_trait]
impl TokenStore for DownStore {
    async fn get(&self, _key: &str) -> CloakResult<Option<TokenRecord>> {
        Err(cloak_core::CloakError::backend("connection refused"))
    }
    async fn set(&self, _key: &str, _record: &TokenRecord, _ttl_secs: u64) -> CloakResult<()> {
        Err(cloak_core::CloakError::backend("connection refused"))
    }
    async fn delete(&self, _key: &str) -> CloakResult<bool> {
        Err(cloak_core::CloakError::backend("connection refused"))
    }
    async fn list_keys(&self, _prefix: &str) -> CloakResult<Vec<String>> {
        Err(cloak_core::CloakError::backend("connection refused"))
    }
    async fn delete_all(&self, _keys: &[String]) -> CloakResult<u64> {
        Err(cloak_core::CloakError::backend("connection refused"))
    }
    async fn health_check(&self) -> CloakResult<()> {
        Err(cloak_core::CloakError::backend("connection refused"))
    }
    fn backend_name(&self) -> &'static str {
        "down"
    }
}

#[tokio::test]
async fn backend_failures_are_flattened() {
    let state = AppState::with_store(AppConfig::default(), Arc::new(DownStore));
    let server = TestServer::new(create_router(state)).unwrap();

    let response = server
        .post("/tokens")
        .json(&json!({ "action": "create", "sessionId": "s1" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "Invalid request");
    assert!(!response.text().contains("connection refused"));

    server
        .get("/health")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
}
