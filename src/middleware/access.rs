//! Declarative route authorization.
//!
//! # Policy Table
//!
//! An [`AccessPolicy`] is an ordered list of `(method, path pattern) ->
//! requirement` rules. The first matching rule wins; unmatched requests
//! require authentication. The default table:
//!
//! | Method | Path | Requirement |
//! |---|---|---|
//! | any | `/api/health` | public |
//! | POST | `/api/auth/signin`, `/api/auth/signup`, `/api/auth/refresh` | public |
//! | any | `/api/admin/**` | public (admin key checked by the handler) |
//! | GET | `/api/subjects/**` | public |
//! | POST, PUT, DELETE | `/api/subjects/**` | admin role |
//! | any | `/api/progress/**` | authenticated |
//! | any | anything else | authenticated |
//!
//! # Outcomes
//!
//! - No principal on a protected route: 401 `unauthorized`
//! - Principal without the required role: 403 `forbidden`
//!
//! The principal is the one [`BearerAuthLayer`](super::BearerAuthLayer)
//! attached; this layer must run after it.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::FromRequestParts;
use axum::http::header::{HeaderValue, WWW_AUTHENTICATE};
use axum::http::request::Parts;
use axum::http::{Method, Request, Response, StatusCode};
use tower::{Layer, Service};
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, json_error};
use crate::metrics;
use crate::models::{Principal, Role};

/// What a route demands of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Public,
    Authenticated,
    Role(Role),
}

/// Path matcher for policy rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    /// Matches exactly this path.
    Exact(String),
    /// Matches the path itself and anything below it (`/base/**`).
    Subtree(String),
}

impl PathPattern {
    pub fn exact(path: impl Into<String>) -> Self {
        Self::Exact(path.into())
    }

    pub fn subtree(base: impl Into<String>) -> Self {
        Self::Subtree(base.into().trim_end_matches('/').to_string())
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(p) => path == p,
            Self::Subtree(base) => path
                .strip_prefix(base.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/')),
        }
    }
}

/// One row of the policy table. `methods` empty means any method.
#[derive(Debug, Clone)]
pub struct AccessRule {
    methods: Vec<Method>,
    pattern: PathPattern,
    requirement: Requirement,
}

impl AccessRule {
    pub fn new(methods: &[Method], pattern: PathPattern, requirement: Requirement) -> Self {
        Self {
            methods: methods.to_vec(),
            pattern,
            requirement,
        }
    }

    fn matches(&self, method: &Method, path: &str) -> bool {
        (self.methods.is_empty() || self.methods.contains(method)) && self.pattern.matches(path)
    }
}

/// Result of evaluating a request against the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Unauthenticated,
    Forbidden,
}

/// Ordered, first-match-wins route authorization table.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    rules: Vec<AccessRule>,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        use Requirement::{Authenticated, Public};

        let any: &[Method] = &[];
        Self::new(vec![
            AccessRule::new(any, PathPattern::exact("/api/health"), Public),
            AccessRule::new(&[Method::POST], PathPattern::exact("/api/auth/signin"), Public),
            AccessRule::new(&[Method::POST], PathPattern::exact("/api/auth/signup"), Public),
            AccessRule::new(&[Method::POST], PathPattern::exact("/api/auth/refresh"), Public),
            AccessRule::new(any, PathPattern::subtree("/api/admin"), Public),
            AccessRule::new(&[Method::GET], PathPattern::subtree("/api/subjects"), Public),
            AccessRule::new(
                &[Method::POST, Method::PUT, Method::DELETE],
                PathPattern::subtree("/api/subjects"),
                Requirement::Role(Role::Admin),
            ),
            AccessRule::new(any, PathPattern::subtree("/api/progress"), Authenticated),
        ])
    }
}

impl AccessPolicy {
    pub fn new(rules: Vec<AccessRule>) -> Self {
        Self { rules }
    }

    /// Requirement of the first matching rule, or `Authenticated`.
    pub fn requirement(&self, method: &Method, path: &str) -> Requirement {
        self.rules
            .iter()
            .find(|rule| rule.matches(method, path))
            .map_or(Requirement::Authenticated, |rule| rule.requirement)
    }

    /// Decide a request given the principal attached by bearer authentication.
    pub fn decide(&self, method: &Method, path: &str, principal: Option<&Principal>) -> Decision {
        match (self.requirement(method, path), principal) {
            (Requirement::Public, _) => Decision::Allow,
            (_, None) => Decision::Unauthenticated,
            (Requirement::Authenticated, Some(_)) => Decision::Allow,
            (Requirement::Role(role), Some(p)) if p.has_role(role) => Decision::Allow,
            (Requirement::Role(_), Some(_)) => Decision::Forbidden,
        }
    }
}

/// Access control layer for the Tower middleware stack.
#[derive(Clone)]
pub struct AccessControlLayer {
    policy: Arc<AccessPolicy>,
}

impl AccessControlLayer {
    pub fn new(policy: AccessPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }
}

impl<S> Layer<S> for AccessControlLayer {
    type Service = AccessControlService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessControlService {
            inner,
            policy: self.policy.clone(),
        }
    }
}

/// Access control service wrapper.
#[derive(Clone)]
pub struct AccessControlService<S> {
    inner: S,
    policy: Arc<AccessPolicy>,
}

impl<S> Service<Request<Body>> for AccessControlService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let decision = self.policy.decide(
            req.method(),
            req.uri().path(),
            req.extensions().get::<Principal>(),
        );

        match decision {
            Decision::Allow => Box::pin(self.inner.call(req)),
            Decision::Unauthenticated => {
                debug!(method = %req.method(), path = %req.uri().path(), "Authentication required");
                metrics::record_access_denied(StatusCode::UNAUTHORIZED.as_u16());
                Box::pin(async { Ok(unauthorized_response()) })
            }
            Decision::Forbidden => {
                debug!(method = %req.method(), path = %req.uri().path(), "Role requirement not met");
                metrics::record_access_denied(StatusCode::FORBIDDEN.as_u16());
                Box::pin(async {
                    Ok(json_error(
                        StatusCode::FORBIDDEN,
                        "forbidden",
                        "You do not have permission to access this resource.",
                    ))
                })
            }
        }
    }
}

/// Build an unauthorized (401) response with a bearer challenge.
fn unauthorized_response() -> Response<Body> {
    let mut response = json_error(
        StatusCode::UNAUTHORIZED,
        "unauthorized",
        "Authentication is required to access this resource.",
    );
    response
        .headers_mut()
        .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    response
}

// =============================================================================
// Handler Extractor
// =============================================================================

/// The verified caller of a handler.
///
/// Rejects with 401 if bearer authentication attached no principal.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub Principal);

impl AuthenticatedUser {
    pub fn subject_id(&self) -> Uuid {
        self.0.subject_id
    }

    /// Fail with 403 unless the caller holds `role`.
    pub fn require_role(&self, role: Role) -> Result<(), AppError> {
        if self.0.has_role(role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("{role} required")))
        }
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .copied()
            .map(AuthenticatedUser)
            .ok_or_else(|| AppError::Unauthorized("No authenticated principal".to_string()))
    }
}
