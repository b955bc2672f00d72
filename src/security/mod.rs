//! Cryptographic and admission-control primitives behind the request gate.
//!
//! - [`password`]: Argon2id hashing with a decoy for timing equalization
//! - [`token`]: HS256 session tokens with clock-driven expiry
//! - [`rate_limiter`]: bounded per-client token buckets
//! - [`admin_key`]: constant-time shared-secret check
//!
//! Everything here is synchronous and free of I/O. Middleware and services
//! wrap these types; none of them know about HTTP.

pub mod admin_key;
pub mod password;
pub mod rate_limiter;
pub mod token;

pub use admin_key::{AdminKeyError, AdminKeyGuard};
pub use password::PasswordHasher;
pub use rate_limiter::{Admission, RateLimitConfigError, RateLimiter};
pub use token::{TokenError, TokenKind, TokenPair, TokenService};
