//! Integration tests over a real TCP listener.
//!
//! Each fixture binds an ephemeral port, serves the full router with
//! `into_make_service_with_connect_info` and talks to it with `reqwest`, so
//! the rate limiter keys on the actual socket peer address.
//!
//! Run with: `cargo test --test integration_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::sleep;

use progress_gate::config::{PasswordHashConfig, RateLimitConfig};
use progress_gate::{AppState, Config, build_router};

const ADMIN_KEY: &str = "integration-admin-key-77c1";

/// Test fixture that owns the running server
struct TestFixture {
    base_url: String,
    client: Client,
    state: AppState,
}

impl TestFixture {
    async fn new(rate_limit: RateLimitConfig) -> Self {
        let mut config =
            Config::with_secrets("integration-signing-key-0123456789abcdef", ADMIN_KEY);
        config.host = "127.0.0.1".to_string();
        config.password_hash = PasswordHashConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        };
        config.rate_limit = rate_limit;

        let state = AppState::new(config).expect("Failed to build state");
        let app = build_router(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind ephemeral port");
        let addr = listener.local_addr().expect("Failed to get local address");

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("Server failed");
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        let fixture = Self {
            base_url: format!("http://{addr}"),
            client,
            state,
        };
        fixture.wait_for_server().await;
        fixture
    }

    /// Limiter roomy enough that setup traffic never trips it.
    async fn relaxed() -> Self {
        Self::new(RateLimitConfig {
            capacity: 1_000,
            refill_tokens: 1_000,
            ..RateLimitConfig::default()
        })
        .await
    }

    async fn wait_for_server(&self) {
        for _ in 0..50 {
            if self.client.get(self.url("/api/health")).send().await.is_ok() {
                return;
            }
            sleep(Duration::from_millis(20)).await;
        }
        panic!("Server failed to respond");
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .expect("Request failed")
    }
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = TestFixture::relaxed().await;

    let response = fixture
        .client
        .get(fixture.url("/api/health"))
        .send()
        .await
        .expect("Health request failed");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert!(response.headers().contains_key("x-ratelimit-limit"));

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "UP");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    fixture.state.shutdown().await;
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let fixture = TestFixture::relaxed().await;

    let response = fixture
        .client
        .get(fixture.url("/api/health"))
        .header("x-request-id", "itest-correlation-1")
        .send()
        .await
        .unwrap();

    assert_eq!(response.headers()["x-request-id"], "itest-correlation-1");
}

// ============================================================================
// Authentication flow
// ============================================================================

#[tokio::test]
async fn test_sign_up_sign_in_and_access_profile() {
    let fixture = TestFixture::relaxed().await;

    let response = fixture
        .post_json(
            "/api/auth/signup",
            json!({"email": "eve@example.com", "username": "eve_1", "password": "long-enough-pw"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = fixture
        .post_json(
            "/api/auth/signin",
            json!({"email": "eve@example.com", "password": "long-enough-pw"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["token_type"], "Bearer");
    let access = body["access_token"].as_str().unwrap();

    let response = fixture
        .client
        .get(fixture.url("/api/users/me"))
        .bearer_auth(access)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["email"], "eve@example.com");

    let response = fixture
        .client
        .get(fixture.url("/api/users/me"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_sign_up_input_is_rejected() {
    let fixture = TestFixture::relaxed().await;

    let cases = [
        json!({"email": "not-an-email", "username": "valid_name", "password": "long-enough-pw"}),
        json!({"email": "ok@example.com", "username": "x", "password": "long-enough-pw"}),
        json!({"email": "ok@example.com", "username": "valid_name", "password": "short"}),
    ];
    for case in cases {
        let response = fixture.post_json("/api/auth/signup", case.clone()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{case}");
    }
}

// ============================================================================
// Rate limiting
// ============================================================================

#[tokio::test]
async fn test_sixth_sign_in_over_tcp_is_throttled() {
    let fixture = TestFixture::new(RateLimitConfig {
        capacity: 5,
        refill_tokens: 5,
        refill_period: Duration::from_secs(60),
        ..RateLimitConfig::default()
    })
    .await;

    // wait_for_server may have spent some of the budget already
    let mut statuses = Vec::new();
    for _ in 0..6 {
        let response = fixture
            .post_json(
                "/api/auth/signin",
                json!({"email": "nobody@example.com", "password": "guess-guess"}),
            )
            .await;
        statuses.push(response.status());
    }

    assert_eq!(statuses.last(), Some(&StatusCode::TOO_MANY_REQUESTS));
    assert!(
        statuses
            .iter()
            .all(|s| *s == StatusCode::UNAUTHORIZED || *s == StatusCode::TOO_MANY_REQUESTS)
    );

    let response = fixture
        .client
        .get(fixture.url("/api/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
}

#[tokio::test]
async fn test_spoofed_forwarded_for_does_not_escape_limit() {
    let fixture = TestFixture::new(RateLimitConfig {
        capacity: 3,
        refill_tokens: 3,
        refill_period: Duration::from_secs(60),
        ..RateLimitConfig::default()
    })
    .await;

    let mut last = StatusCode::OK;
    for i in 0..4 {
        last = fixture
            .client
            .get(fixture.url("/api/health"))
            .header("x-forwarded-for", format!("198.51.100.{i}"))
            .send()
            .await
            .unwrap()
            .status();
    }

    assert_eq!(last, StatusCode::TOO_MANY_REQUESTS);
}

// ============================================================================
// Admin bootstrap
// ============================================================================

#[tokio::test]
async fn test_admin_bootstrap_requires_key() {
    let fixture = TestFixture::relaxed().await;
    let body = json!({"email": "ops@example.com", "username": "ops", "password": "long-enough-pw"});

    let response = fixture.post_json("/api/admin/users", body.clone()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = fixture
        .client
        .post(fixture.url("/api/admin/users"))
        .header("x-admin-key", "not-the-key")
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = fixture
        .client
        .post(fixture.url("/api/admin/users"))
        .header("x-admin-key", ADMIN_KEY)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = response.json().await.unwrap();
    assert_eq!(created["role"], "ROLE_ADMIN");
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let fixture = TestFixture::relaxed().await;

    let response = fixture
        .client
        .post(fixture.url("/api/auth/signin"))
        .header("content-type", "application/json")
        .body("{\"email\": ")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
