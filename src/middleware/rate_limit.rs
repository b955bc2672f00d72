//! Per-client rate limiting middleware.
//!
//! Wraps [`RateLimiter`] in a Tower layer. This is the outermost gate layer:
//! it runs before any token or password work so that brute-force traffic is
//! shed before it can consume CPU on cryptography.
//!
//! # Response Headers
//!
//! On every admitted request:
//! - `X-RateLimit-Limit`: Bucket capacity
//! - `X-RateLimit-Remaining`: Tokens left after this request
//!
//! On rate limit exceeded (429), additionally:
//! - `Retry-After`: Seconds until the next refill
//!
//! The 429 body is `{"error":"too_many_requests","message":...}` and the
//! wrapped service is not invoked.
//!
//! # Client Identity
//!
//! Keys come from [`client_key`]; see `middleware::ip` for the trusted proxy
//! rules that stop `X-Forwarded-For` spoofing.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use axum::http::{Request, Response, StatusCode};
use tower::{Layer, Service};
use tracing::warn;

use super::ip::{TrustedProxyConfig, client_key};
use crate::error::json_error;
use crate::metrics;
use crate::security::{Admission, RateLimiter};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Rate limiting layer for the Tower middleware stack.
///
/// # Example
///
/// ```rust,ignore
/// let limiter = RateLimiter::new(&config.rate_limit, clock)?;
/// let app = Router::new()
///     .route("/api", get(handler))
///     .layer(RateLimitLayer::new(limiter, TrustedProxyConfig::new(&config.trusted_proxies)));
/// ```
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: RateLimiter,
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl RateLimitLayer {
    pub fn new(limiter: RateLimiter, trusted_proxies: TrustedProxyConfig) -> Self {
        Self {
            limiter,
            trusted_proxies: Arc::new(trusted_proxies),
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
            trusted_proxies: self.trusted_proxies.clone(),
        }
    }
}

/// Rate limiting service wrapper.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: RateLimiter,
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
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
        let key = client_key(&req, &self.trusted_proxies);
        let admission = self.limiter.admit(&key);
        metrics::record_rate_limit_decision(admission.allowed);

        if !admission.allowed {
            let retry_after = admission.retry_after.map_or(1, |d| d.as_secs().max(1));
            warn!(
                client = %key,
                path = %req.uri().path(),
                retry_after_secs = retry_after,
                "Rate limit exceeded"
            );
            return Box::pin(async move { Ok(too_many_requests(&admission, retry_after)) });
        }

        // Take the readied service and leave a fresh clone in its place
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let mut response = inner.call(req).await?;
            set_limit_headers(&mut response, &admission);
            Ok(response)
        })
    }
}

fn set_limit_headers(response: &mut Response<Body>, admission: &Admission) {
    let headers = response.headers_mut();
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(admission.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(admission.remaining));
}

fn too_many_requests(admission: &Admission, retry_after: u64) -> Response<Body> {
    let mut response = json_error(
        StatusCode::TOO_MANY_REQUESTS,
        "too_many_requests",
        "Rate limit exceeded. Please retry later.",
    );
    set_limit_headers(&mut response, admission);
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(retry_after));
    response
}
