//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │   Request ID     │ ← Adds X-Request-Id header, also on rejections
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response logging
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Catch Panic    │ ← 500 JSON instead of a dropped connection
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← Preflight answered before the gate
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Rate Limiting   │ ← 429 if the client bucket is empty
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Bearer Auth    │ ← Attaches Principal, never rejects
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Access Control  │ ← 401 / 403 per route table
//! └────────┬─────────┘
//!          ▼
//!      Handler
//! ```
//!
//! # Route Groups
//!
//! - `/api/health` - Liveness (public)
//! - `/api/auth/*` - Sign-up, sign-in, refresh (public)
//! - `/api/admin/*` - Admin bootstrap (admin key)
//! - `/api/users/me` - Caller profile (authenticated)
//! - `/api/subjects` - Catalog (public reads, admin writes)
//! - `/api/progress/*` - Per-user progress (authenticated)

use std::any::Any;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::json_error;
use crate::handlers;
use crate::middleware::{
    AccessControlLayer, AccessPolicy, BearerAuthLayer, RateLimitLayer, RequestIdLayer,
    TrustedProxyConfig,
};
use crate::state::AppState;

/// Build the application router with all routes and the gate configured.
///
/// - **Rate Limiting**: present only if `RATE_LIMIT_ENABLED` is true
/// - **Access Control**: [`AccessPolicy::default`]
/// - **CORS**: configured from `cors_allowed_origins`
pub fn build_router(state: AppState) -> Router {
    build_router_with_policy(state, AccessPolicy::default())
}

/// Build the router with a custom route authorization table.
pub fn build_router_with_policy(state: AppState, policy: AccessPolicy) -> Router {
    let config = state.config.clone();

    let mut router = Router::new()
        .route("/api/health", get(handlers::health_check))
        // Authentication
        .route("/api/auth/signup", post(handlers::sign_up))
        .route("/api/auth/signin", post(handlers::sign_in))
        .route("/api/auth/refresh", post(handlers::refresh))
        // Admin bootstrap
        .route("/api/admin/users", post(handlers::create_admin_user))
        // Caller profile
        .route("/api/users/me", get(handlers::current_user))
        // Subject catalog
        .route(
            "/api/subjects",
            get(handlers::list_subjects).post(handlers::create_subject),
        )
        .route(
            "/api/subjects/{id}",
            get(handlers::get_subject).delete(handlers::delete_subject),
        )
        // Progress
        .route(
            "/api/progress/subjects/{subject_id}",
            get(handlers::subject_progress),
        )
        .route(
            "/api/progress/subjects/{subject_id}/sections",
            post(handlers::mark_section_cleared),
        )
        .route(
            "/api/progress/subjects/{subject_id}/sections/{section_id}",
            get(handlers::section_status).delete(handlers::unmark_section_cleared),
        );

    // =========================================================================
    // Apply Middleware Stack (last added runs first)
    // =========================================================================

    // Request body size limit
    info!(
        max_size_kib = config.max_request_body_size / 1024,
        "Request body size limit configured"
    );
    router = router.layer(DefaultBodyLimit::max(config.max_request_body_size));

    // Gate: access control runs after bearer auth, which runs after throttling
    router = router
        .layer(AccessControlLayer::new(policy))
        .layer(BearerAuthLayer::new(state.tokens.clone()));

    if let Some(limiter) = state.rate_limiter.clone() {
        let trusted_proxies = TrustedProxyConfig::new(&config.trusted_proxies);
        info!(
            capacity = limiter.limit(),
            refill_tokens = config.rate_limit.refill_tokens,
            refill_period_secs = config.rate_limit.refill_period.as_secs(),
            forwarded_headers_honored = trusted_proxies.is_enabled(),
            "Rate limiting enabled"
        );
        router = router.layer(RateLimitLayer::new(limiter, trusted_proxies));
    } else {
        info!("Rate limiting disabled (RATE_LIMIT_ENABLED=false)");
    }

    router = router
        .layer(build_cors_layer(&config.cors_allowed_origins))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(RequestIdLayer::new());

    router.with_state(state)
}

/// Convert a handler panic into the standard JSON 500 body.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    error!(panic = detail, "Handler panicked");

    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "An internal error occurred. Please contact support if the issue persists.",
    )
}

/// Build CORS layer from configuration.
///
/// Using `*` (any origin) is convenient for development but should be
/// avoided in production. Specify explicit origins instead.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_any = allowed_origins.iter().any(|o| o == "*");

    if allow_any {
        CorsLayer::new()
            .allow_origin(AnyOrigin)
            .allow_methods(AnyOrigin)
            .allow_headers(AnyOrigin)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(AnyOrigin)
            .allow_headers(AnyOrigin)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_build_cors_layer_any() {
        let origins = vec!["*".to_string()];
        let _layer = build_cors_layer(&origins);
    }

    #[test]
    fn test_build_cors_layer_specific() {
        let origins = vec![
            "https://example.com".to_string(),
            "https://app.example.com".to_string(),
        ];
        let _layer = build_cors_layer(&origins);
    }

    #[tokio::test]
    async fn test_panic_response_is_json_500() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "internal_error");
    }
}
