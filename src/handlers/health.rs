//! Health endpoint.
//!
//! `GET /api/health` is public and sits behind the rate limiter like every
//! other route. It reports liveness only; the service has no external
//! dependencies whose state could degrade it.

use axum::Json;
use chrono::Utc;
use tracing::instrument;

use crate::models::HealthResponse;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "UP",
///   "message": "Service is running",
///   "version": "0.1.0",
///   "timestamp": "2024-01-15T10:30:00Z"
/// }
/// ```
#[instrument]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "UP".to_string(),
        message: "Service is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_reports_up() {
        let Json(body) = health_check().await;

        assert_eq!(body.status, "UP");
        assert_eq!(body.version, env!("CARGO_PKG_VERSION"));
    }
}
