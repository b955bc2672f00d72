//! Prometheus metrics for the request gate.
//!
//! Metrics are exposed via a dedicated HTTP listener on `METRICS_PORT`.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `gate_rate_limit_decisions_total` - Limiter decisions (label: outcome = allowed | denied)
//! - `gate_token_verifications_total` - Bearer token checks (label: outcome = valid | reason)
//! - `gate_sign_in_total` - Sign-in attempts (label: outcome = success | failure)
//! - `gate_access_denied_total` - Gate rejections (label: status = 401 | 403)
//!
//! ## Gauges
//! - `gate_rate_limit_buckets` - Client buckets currently tracked
//!
//! Recording functions are cheap no-ops until [`init_metrics`] installs a recorder.

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const RATE_LIMIT_DECISIONS_TOTAL: &str = "gate_rate_limit_decisions_total";
    pub const TOKEN_VERIFICATIONS_TOTAL: &str = "gate_token_verifications_total";
    pub const SIGN_IN_TOTAL: &str = "gate_sign_in_total";
    pub const ACCESS_DENIED_TOTAL: &str = "gate_access_denied_total";
    pub const RATE_LIMIT_BUCKETS: &str = "gate_rate_limit_buckets";
}

/// Initialize the Prometheus metrics exporter.
///
/// # Errors
///
/// Returns a message if the exporter cannot be installed (e.g. port in use
/// or a recorder is already set).
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::RATE_LIMIT_DECISIONS_TOTAL,
        "Rate limiter admission decisions"
    );
    describe_counter!(
        names::TOKEN_VERIFICATIONS_TOTAL,
        "Bearer token verification outcomes"
    );
    describe_counter!(names::SIGN_IN_TOTAL, "Sign-in attempts by outcome");
    describe_counter!(
        names::ACCESS_DENIED_TOTAL,
        "Requests rejected by the access policy"
    );
    describe_gauge!(
        names::RATE_LIMIT_BUCKETS,
        "Number of client buckets held by the rate limiter"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

pub fn record_rate_limit_decision(allowed: bool) {
    let outcome = if allowed { "allowed" } else { "denied" };
    counter!(names::RATE_LIMIT_DECISIONS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a bearer token check. `outcome` is `"valid"` or a `TokenError` label.
pub fn record_token_verification(outcome: &'static str) {
    counter!(names::TOKEN_VERIFICATIONS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_sign_in(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(names::SIGN_IN_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_access_denied(status: u16) {
    counter!(names::ACCESS_DENIED_TOTAL, "status" => status.to_string()).increment(1);
}

/// Update the tracked bucket gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_rate_limit_buckets(count: u64) {
    gauge!(names::RATE_LIMIT_BUCKETS).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    // These only verify the functions don't panic without a recorder installed.

    #[test]
    fn test_record_rate_limit_decision() {
        record_rate_limit_decision(true);
        record_rate_limit_decision(false);
    }

    #[test]
    fn test_record_token_verification() {
        record_token_verification("valid");
        record_token_verification("expired");
    }

    #[test]
    fn test_record_sign_in_and_denials() {
        record_sign_in(true);
        record_sign_in(false);
        record_access_denied(401);
        record_access_denied(403);
    }

    #[test]
    fn test_set_rate_limit_buckets() {
        set_rate_limit_buckets(0);
        set_rate_limit_buckets(100_000);
    }
}
