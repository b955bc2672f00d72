//! Bearer token authentication middleware.
//!
//! Reads `Authorization: Bearer <token>`, verifies it with the
//! [`TokenService`], and on success stores the [`Principal`] in the request
//! extensions. It never rejects: whether a route needs a principal is decided
//! by the access control layer that runs next.
//!
//! All verification failures look the same to clients. The reason is logged
//! at debug level and counted in `gate_token_verifications_total`.

use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::AUTHORIZATION;
use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::debug;

use crate::metrics;
use crate::models::Principal;
use crate::security::TokenService;

const BEARER_PREFIX: &str = "Bearer ";

/// Bearer token authentication layer.
#[derive(Clone)]
pub struct BearerAuthLayer {
    tokens: TokenService,
}

impl BearerAuthLayer {
    pub fn new(tokens: TokenService) -> Self {
        Self { tokens }
    }
}

impl<S> Layer<S> for BearerAuthLayer {
    type Service = BearerAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuthService {
            inner,
            tokens: self.tokens.clone(),
        }
    }
}

/// Bearer token authentication service wrapper.
#[derive(Clone)]
pub struct BearerAuthService<S> {
    inner: S,
    tokens: TokenService,
}

impl<S> Service<Request<Body>> for BearerAuthService<S>
where
    S: Service<Request<Body>, Response = Response<Body>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        // Never trust a principal that arrived from outside this layer
        req.extensions_mut().remove::<Principal>();

        if let Some(token) = extract_bearer(&req) {
            match self.tokens.authenticate(token) {
                Ok(principal) => {
                    metrics::record_token_verification("valid");
                    debug!(user_id = %principal.subject_id, role = %principal.role, "Bearer token accepted");
                    req.extensions_mut().insert(principal);
                }
                Err(reason) => {
                    metrics::record_token_verification(reason.as_label());
                    debug!(reason = %reason, path = %req.uri().path(), "Bearer token rejected");
                }
            }
        }

        self.inner.call(req)
    }
}

/// Extract the token from an `Authorization: Bearer` header.
///
/// The scheme match is case-insensitive; an empty token counts as absent.
fn extract_bearer<B>(req: &Request<B>) -> Option<&str> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let scheme = value.get(..BEARER_PREFIX.len())?;
    if !scheme.eq_ignore_ascii_case(BEARER_PREFIX) {
        return None;
    }
    let token = value.get(BEARER_PREFIX.len()..)?.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::convert::Infallible;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::http::StatusCode;
    use tower::{ServiceExt, service_fn};
    use uuid::Uuid;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{Secret, TokenConfig};
    use crate::models::Role;

    fn tokens() -> TokenService {
        TokenService::new(
            &TokenConfig {
                secret: Secret::new("bearer-layer-test-key-0123456789abcdef"),
                access_ttl: Duration::from_secs(60),
                refresh_ttl: Duration::from_secs(600),
            },
            Arc::new(ManualClock::default()),
        )
        .unwrap()
    }

    /// Echo 200 when a principal is attached, 204 otherwise.
    async fn call(tokens: &TokenService, req: Request<Body>) -> StatusCode {
        let svc = BearerAuthLayer::new(tokens.clone()).layer(service_fn(|req: Request<Body>| async move {
            let status = if req.extensions().get::<Principal>().is_some() {
                StatusCode::OK
            } else {
                StatusCode::NO_CONTENT
            };
            let mut response = Response::new(Body::empty());
            *response.status_mut() = status;
            Ok::<_, Infallible>(response)
        }));
        svc.oneshot(req).await.unwrap().status()
    }

    #[test]
    fn test_extract_bearer() {
        let req = Request::builder()
            .header("authorization", "Bearer abc.def.ghi")
            .body(())
            .unwrap();
        assert_eq!(extract_bearer(&req), Some("abc.def.ghi"));

        let req = Request::builder()
            .header("authorization", "bearer  abc")
            .body(())
            .unwrap();
        assert_eq!(extract_bearer(&req), Some("abc"));

        for value in ["Basic dXNlcjpwYXNz", "Bearer ", "Bearer", "abc.def.ghi"] {
            let req = Request::builder()
                .header("authorization", value)
                .body(())
                .unwrap();
            assert_eq!(extract_bearer(&req), None, "{value:?}");
        }
    }

    #[tokio::test]
    async fn test_valid_token_attaches_principal() {
        let tokens = tokens();
        let token = tokens.issue_access_token(Uuid::new_v4(), Role::Standard).unwrap();
        let req = Request::builder()
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();

        assert_eq!(call(&tokens, req).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalid_token_passes_through_without_principal() {
        let tokens = tokens();
        let req = Request::builder()
            .header("authorization", "Bearer not.a.token")
            .body(Body::empty())
            .unwrap();

        assert_eq!(call(&tokens, req).await, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_injected_principal_is_stripped() {
        let tokens = tokens();
        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(Principal::new(Uuid::new_v4(), Role::Admin));

        assert_eq!(call(&tokens, req).await, StatusCode::NO_CONTENT);
    }
}
