//! Request ID middleware for log correlation.
//!
//! - Propagates a client-supplied `X-Request-Id` if it is short printable ASCII
//! - Otherwise generates a UUIDv4
//! - Echoes the ID on the response, including gate rejections (401/403/429)
//!   since this layer sits outside the gate
//!
//! ```bash
//! curl -H "X-Request-Id: my-correlation-id" http://localhost:8080/api/health
//! ```

use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::{Span, debug};
use uuid::Uuid;

/// Header name for request ID.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Longest client-supplied ID that is propagated unchanged.
pub const MAX_REQUEST_ID_LEN: usize = 128;

/// Request ID layer for Tower middleware stack.
#[derive(Clone, Default)]
pub struct RequestIdLayer;

impl RequestIdLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

/// Request ID service wrapper.
#[derive(Clone)]
pub struct RequestIdService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for RequestIdService<S>
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

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let request_id = extract_or_generate_request_id(&req);

        let id = request_id.to_str().unwrap_or_default();
        Span::current().record("request_id", id);
        debug!(request_id = %id, "Processing request");

        // Handlers see the same value the client gets back
        req.headers_mut()
            .insert(REQUEST_ID_HEADER, request_id.clone());

        let future = self.inner.call(req);

        Box::pin(async move {
            let mut response = future.await?;
            response.headers_mut().insert(REQUEST_ID_HEADER, request_id);
            Ok(response)
        })
    }
}

/// Reuse an acceptable client-supplied ID or generate a new one.
fn extract_or_generate_request_id<B>(req: &Request<B>) -> HeaderValue {
    if let Some(value) = req.headers().get(&REQUEST_ID_HEADER)
        && is_acceptable(value)
    {
        return value.clone();
    }

    // A hyphenated UUID is always a valid header value
    HeaderValue::from_str(&Uuid::new_v4().to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
}

fn is_acceptable(value: &HeaderValue) -> bool {
    let bytes = value.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= MAX_REQUEST_ID_LEN
        && bytes.iter().all(|b| b.is_ascii_graphic())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::convert::Infallible;

    use tower::{ServiceExt, service_fn};

    use super::*;

    #[test]
    fn test_extract_existing_request_id() {
        let req = Request::builder()
            .header("x-request-id", "existing-id-123")
            .body(Body::empty())
            .unwrap();

        assert_eq!(extract_or_generate_request_id(&req), "existing-id-123");
    }

    #[test]
    fn test_generate_new_request_id() {
        let req = Request::builder().body(Body::empty()).unwrap();

        let id = extract_or_generate_request_id(&req);

        assert!(Uuid::parse_str(id.to_str().unwrap()).is_ok());
    }

    #[test]
    fn test_oversized_or_spaced_id_is_replaced() {
        for supplied in ["x".repeat(MAX_REQUEST_ID_LEN + 1), "has space".to_string()] {
            let req = Request::builder()
                .header("x-request-id", supplied.as_str())
                .body(Body::empty())
                .unwrap();

            let id = extract_or_generate_request_id(&req);
            assert!(Uuid::parse_str(id.to_str().unwrap()).is_ok());
        }
    }

    #[tokio::test]
    async fn test_id_is_echoed_on_response() {
        let svc = RequestIdLayer::new().layer(service_fn(|req: Request<Body>| async move {
            assert_eq!(req.headers()["x-request-id"], "corr-1");
            Ok::<_, Infallible>(Response::new(Body::empty()))
        }));

        let req = Request::builder()
            .header("x-request-id", "corr-1")
            .body(Body::empty())
            .unwrap();
        let response = svc.oneshot(req).await.unwrap();

        assert_eq!(response.headers()["x-request-id"], "corr-1");
    }
}
