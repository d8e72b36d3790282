use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;
use zeroize::Zeroizing;

use forum_gate::{
    crypto::password::hash_password,
    methods,
    models::user::User,
    repositories::memory::{MemorySessionRepository, MemoryUserRepository},
    router, AppState, Config,
};

const PASSWORD: &str = "SecurePass123!@#";

struct TestContext {
    client: reqwest::Client,
    base_url: String,
    email: String,
}

impl TestContext {
    async fn spawn(per_second: f64, burst: u32) -> Self {
        let config = Config {
            database_url: String::new(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            jwt_secret: Zeroizing::new(b"e2e-secret-e2e-secret-e2e-secret-e2e".to_vec()),
            access_token_ttl_minutes: 15,
            refresh_token_ttl_days: 30,
            rate_limit_per_second: per_second,
            rate_limit_burst: burst,
            rate_limit_sweep_seconds: 60,
            session_idle_days: 30,
            session_reap_interval_seconds: 3600,
        };

        let email = format!("user_{}@example.com", Uuid::new_v4().simple());
        let users = Arc::new(MemoryUserRepository::new());
        users
            .insert(User {
                id: Uuid::new_v4(),
                email: email.clone(),
                password_hash: hash_password(PASSWORD).unwrap(),
                is_verified: true,
                created_at: Utc::now(),
            })
            .await;

        let state = AppState::with_repositories(
            &config,
            Arc::new(MemorySessionRepository::new()),
            users,
        )
        .unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                router(state).into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        Self {
            client: reqwest::Client::new(),
            base_url: format!("http://{}", addr),
            email,
        }
    }

    async fn call(&self, method: &str, token: Option<&str>, body: Value) -> reqwest::Response {
        let mut request = self.client.post(format!("{}{}", self.base_url, method)).json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.unwrap()
    }

    async fn login(&self) -> Value {
        let response = self
            .call(methods::LOGIN, None, json!({ "email": self.email, "password": PASSWORD }))
            .await;
        assert_eq!(response.status().as_u16(), 200, "Login failed");
        response.json().await.unwrap()
    }
}

fn access_token(login: &Value) -> String {
    login["access_token"].as_str().unwrap().to_string()
}

/// Rewrites the token's payload without re-signing it.
fn tamper(token: &str) -> String {
    let parts: Vec<&str> = token.split('.').collect();
    let mut claims: Value = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
    claims["sub"] = json!(Uuid::new_v4().to_string());
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
    format!("{}.{}.{}", parts[0], payload, parts[2])
}

#[tokio::test]
async fn test_login_and_authenticated_call() {
    let context = TestContext::spawn(1000.0, 1000).await;
    let login = context.login().await;
    let session_id = login["session"]["session_id"].as_str().unwrap();
    assert_eq!(login["session"]["is_current"], true);

    let response = context
        .call(methods::GET_CURRENT_SESSION, Some(&access_token(&login)), json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["session_id"], session_id);
    assert_eq!(body["is_current"], true);
}

#[tokio::test]
async fn test_wrong_password_is_unauthenticated() {
    let context = TestContext::spawn(1000.0, 1000).await;
    let response = context
        .call(methods::LOGIN, None, json!({ "email": context.email, "password": "nope-nope" }))
        .await;
    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "unauthenticated");
}

#[tokio::test]
async fn test_missing_and_tampered_tokens_are_rejected() {
    let context = TestContext::spawn(1000.0, 1000).await;
    let token = access_token(&context.login().await);

    let response = context.call(methods::GET_CURRENT_SESSION, None, json!({})).await;
    assert_eq!(response.status().as_u16(), 401);

    let response = context
        .call(methods::GET_CURRENT_SESSION, Some(&tamper(&token)), json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "unauthenticated");
    assert_eq!(body["error"], "missing or invalid token");
}

#[tokio::test]
async fn test_public_method_needs_no_credential() {
    let context = TestContext::spawn(1000.0, 1000).await;

    let response = context.call(methods::HEALTH_CHECK, None, json!({})).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "SERVING");

    // A bad credential on a public method is ignored, not rejected.
    let response = context.call(methods::HEALTH_CHECK, Some("garbage"), json!({})).await;
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn test_logout_revokes_tokens_that_are_still_valid() {
    let context = TestContext::spawn(1000.0, 1000).await;
    let login = context.login().await;
    let token = access_token(&login);

    let response = context.call(methods::LOGOUT, Some(&token), json!({})).await;
    assert_eq!(response.status().as_u16(), 200);

    let response = context.call(methods::GET_CURRENT_SESSION, Some(&token), json!({})).await;
    assert_eq!(response.status().as_u16(), 401);

    let refresh = login["refresh_token"].as_str().unwrap();
    let response = context
        .call(methods::REFRESH_TOKEN, None, json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn test_refresh_token_flow() {
    let context = TestContext::spawn(1000.0, 1000).await;
    let login = context.login().await;
    let refresh = login["refresh_token"].as_str().unwrap();

    // Not usable as an access token.
    let response = context.call(methods::GET_CURRENT_SESSION, Some(refresh), json!({})).await;
    assert_eq!(response.status().as_u16(), 401);

    let response = context
        .call(methods::REFRESH_TOKEN, None, json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let pair: Value = response.json().await.unwrap();

    let response = context
        .call(methods::GET_CURRENT_SESSION, Some(pair["access_token"].as_str().unwrap()), json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["session_id"], login["session"]["session_id"]);
}

#[tokio::test]
async fn test_list_active_sessions_pages() {
    let context = TestContext::spawn(1000.0, 1000).await;
    let mut logins = Vec::new();
    for _ in 0..3 {
        logins.push(context.login().await);
    }
    let token = access_token(&logins[0]);

    let response = context
        .call(methods::LIST_ACTIVE_SESSIONS, Some(&token), json!({ "limit": 2 }))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let first: Value = response.json().await.unwrap();
    assert_eq!(first["items"].as_array().unwrap().len(), 2);
    assert_eq!(first["has_more"], true);
    let cursor = first["next_cursor"].as_str().unwrap();
    assert_eq!(first["items"][1]["session_id"], cursor);

    let response = context
        .call(methods::LIST_ACTIVE_SESSIONS, Some(&token), json!({ "cursor": cursor, "limit": 2 }))
        .await;
    let second: Value = response.json().await.unwrap();
    assert_eq!(second["items"].as_array().unwrap().len(), 1);
    assert_eq!(second["has_more"], false);
    assert_eq!(second["next_cursor"], "");

    let mut seen: Vec<String> = first["items"]
        .as_array()
        .unwrap()
        .iter()
        .chain(second["items"].as_array().unwrap())
        .map(|s| s["session_id"].as_str().unwrap().to_string())
        .collect();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 3);

    // Newest first: the caller's session was opened first.
    assert_eq!(second["items"][0]["session_id"], logins[0]["session"]["session_id"]);
    assert_eq!(second["items"][0]["is_current"], true);
}

#[tokio::test]
async fn test_revoke_other_session() {
    let context = TestContext::spawn(1000.0, 1000).await;
    let mine = context.login().await;
    let other = context.login().await;
    let token = access_token(&mine);

    let response = context
        .call(methods::REVOKE_SESSION, Some(&token), json!({ "session_id": mine["session"]["session_id"] }))
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let response = context
        .call(methods::REVOKE_SESSION, Some(&token), json!({ "session_id": Uuid::new_v4().to_string() }))
        .await;
    assert_eq!(response.status().as_u16(), 404);

    let response = context
        .call(methods::REVOKE_SESSION, Some(&token), json!({ "session_id": other["session"]["session_id"] }))
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let response = context
        .call(methods::GET_CURRENT_SESSION, Some(&access_token(&other)), json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn test_change_password_signs_out_everywhere() {
    let context = TestContext::spawn(1000.0, 1000).await;
    let first = access_token(&context.login().await);
    let second = access_token(&context.login().await);

    let response = context
        .call(
            methods::CHANGE_PASSWORD,
            Some(&first),
            json!({ "old_password": "wrong-password", "new_password": "AnotherPass456!" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let response = context
        .call(
            methods::CHANGE_PASSWORD,
            Some(&first),
            json!({ "old_password": PASSWORD, "new_password": "AnotherPass456!" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    for token in [&first, &second] {
        let response = context.call(methods::GET_CURRENT_SESSION, Some(token), json!({})).await;
        assert_eq!(response.status().as_u16(), 401);
    }

    let response = context
        .call(methods::LOGIN, None, json!({ "email": context.email, "password": "AnotherPass456!" }))
        .await;
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn test_rate_limit_burst_and_recovery() {
    let context = TestContext::spawn(4.0, 3).await;

    let mut statuses = Vec::new();
    for _ in 0..4 {
        statuses.push(context.call(methods::HEALTH_CHECK, None, json!({})).await.status().as_u16());
    }
    assert_eq!(statuses, vec![200, 200, 200, 429]);

    // One token is back after 1/R seconds.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let response = context.call(methods::HEALTH_CHECK, None, json!({})).await;
    assert_eq!(response.status().as_u16(), 200);
    let response = context.call(methods::HEALTH_CHECK, None, json!({})).await;
    assert_eq!(response.status().as_u16(), 429);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "resource_exhausted");
}

#[tokio::test]
async fn test_rate_limit_applies_before_authentication() {
    let context = TestContext::spawn(1.0, 1).await;

    let response = context.call(methods::GET_CURRENT_SESSION, None, json!({})).await;
    assert_eq!(response.status().as_u16(), 401);
    let response = context.call(methods::GET_CURRENT_SESSION, None, json!({})).await;
    assert_eq!(response.status().as_u16(), 429);
}

#[tokio::test]
async fn test_malformed_body_is_invalid_argument() {
    let context = TestContext::spawn(1000.0, 1000).await;

    let response = context.call(methods::LOGIN, None, json!({ "email": 5 })).await;
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(response.headers()["content-type"], "application/json");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "invalid_argument");
    assert!(!body["error"].as_str().unwrap().contains("line 1"));

    let response = context
        .client
        .post(format!("{}{}", context.base_url, methods::LOGIN))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "invalid_argument");

    let token = access_token(&context.login().await);
    let response = context
        .client
        .post(format!("{}{}", context.base_url, methods::LIST_ACTIVE_SESSIONS))
        .bearer_auth(&token)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "invalid_argument");
}

#[tokio::test]
async fn test_unknown_email_is_unauthenticated() {
    let context = TestContext::spawn(1000.0, 1000).await;
    let response = context
        .call(methods::LOGIN, None, json!({ "email": "nobody@example.com", "password": PASSWORD }))
        .await;
    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "unauthenticated");
}

#[tokio::test]
async fn test_change_password_requires_twelve_characters() {
    let context = TestContext::spawn(1000.0, 1000).await;
    let token = access_token(&context.login().await);

    let response = context
        .call(
            methods::CHANGE_PASSWORD,
            Some(&token),
            json!({ "old_password": PASSWORD, "new_password": "Short1!abc" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "invalid_argument");

    // The session survives a rejected change.
    let response = context.call(methods::GET_CURRENT_SESSION, Some(&token), json!({})).await;
    assert_eq!(response.status().as_u16(), 200);
}
