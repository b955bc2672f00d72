//! HTTP middleware forming the request gate.
//!
//! - **Rate Limiting**: per-client token buckets keyed by the authenticated peer address
//! - **Bearer Authentication**: verifies session tokens and attaches the principal
//! - **Access Control**: declarative (method, path) -> requirement table
//! - **Request ID**: generation and propagation for log correlation
//!
//! # Architecture
//!
//! ```text
//! Request → Request ID → Rate Limiter → Bearer Auth → Access Control → Handler
//!                            ↓               ↓               ↓
//!                      429 Too Many    attach Principal   401 / 403
//! ```
//!
//! The order is fixed: throttling runs before any token cryptography, and
//! authorization runs only after the principal is known.

pub mod access;
pub mod auth;
pub mod ip;
pub mod rate_limit;
pub mod request_id;

pub use access::{
    AccessControlLayer, AccessPolicy, AccessRule, AuthenticatedUser, Decision, PathPattern,
    Requirement,
};
pub use auth::BearerAuthLayer;
pub use ip::{CidrRange, TrustedProxyConfig, UNKNOWN_CLIENT, client_key};
pub use rate_limit::RateLimitLayer;
pub use request_id::RequestIdLayer;
