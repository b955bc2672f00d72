//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Required Secrets
//!
//! - `JWT_SECRET`: HS256 signing key for session tokens (at least 32 bytes)
//! - `ADMIN_API_KEY`: Shared secret for the admin bootstrap endpoints
//!
//! Both are validated at startup. A missing, short or placeholder value aborts
//! the process with `exitcode::CONFIG` instead of degrading at request time.
//!
//! # Rate Limiting
//!
//! - `RATE_LIMIT_ENABLED`: Toggle the limiter (default: true)
//! - `RATE_LIMIT_CAPACITY`: Bucket capacity per client (default: 100)
//! - `RATE_LIMIT_REFILL_TOKENS`: Tokens added per period (default: 100)
//! - `RATE_LIMIT_REFILL_PERIOD_SECS`: Refill period (default: 60)
//! - `RATE_LIMIT_MAX_CACHE_SIZE`: Maximum tracked clients (default: 100000)
//! - `TRUSTED_PROXIES`: Comma-separated proxy IPs/CIDRs allowed to set `X-Forwarded-For`

use std::env;
use std::fmt;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Minimum signing key length in bytes for HS256.
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Maximum accepted length for the admin key, configured or provided.
pub const MAX_ADMIN_KEY_LEN: usize = 256;

/// Values that show up in sample configs and must never reach production.
const PLACEHOLDER_SECRETS: [&str; 8] = [
    "changeme",
    "change-me",
    "secret",
    "your-secret-key",
    "your-256-bit-secret",
    "admin",
    "password",
    "default",
];

/// Returns true if `value` is blank or a well-known placeholder.
pub fn is_placeholder_secret(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty()
        || PLACEHOLDER_SECRETS
            .iter()
            .any(|p| trimmed.eq_ignore_ascii_case(p))
}

/// Secret configuration value with a redacted `Debug` representation.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the underlying value. Never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Token signing and lifetime settings.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// HS256 signing key material
    pub secret: Secret,
    /// Lifetime of access tokens (default: 15 minutes)
    pub access_ttl: Duration,
    /// Lifetime of refresh tokens (default: 7 days)
    pub refresh_ttl: Duration,
}

/// Token bucket settings for the per-client rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// When false, the limiter layer is not installed
    pub enabled: bool,
    /// Maximum tokens per bucket
    pub capacity: u64,
    /// Tokens added per elapsed `refill_period`
    pub refill_tokens: u64,
    /// Interval between refills
    pub refill_period: Duration,
    /// Maximum number of client buckets kept in memory
    pub max_cache_size: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 100,
            refill_tokens: 100,
            refill_period: Duration::from_secs(60),
            max_cache_size: 100_000,
        }
    }
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordHashConfig {
    fn default() -> Self {
        // OWASP recommended Argon2id baseline: m=19 MiB, t=2, p=1
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 8080)
    pub port: u16,

    /// Maximum request body size in bytes (default: 1 MiB)
    pub max_request_body_size: usize,

    /// Comma-separated list of allowed CORS origins
    pub cors_allowed_origins: Vec<String>,

    // =========================================================================
    // Security Configuration
    // =========================================================================
    pub token: TokenConfig,

    /// Shared secret checked by the admin key guard
    pub admin_api_key: Secret,

    pub password_hash: PasswordHashConfig,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    pub rate_limit: RateLimitConfig,

    /// Trusted proxy addresses or CIDR ranges.
    ///
    /// `X-Forwarded-For` is honored only when the TCP peer falls inside one
    /// of these. Empty means no proxy is trusted and the peer address is
    /// always the client key.
    pub trusted_proxies: Vec<String>,

    /// Interval for bucket cache housekeeping (default: 30 seconds)
    pub maintenance_interval: Duration,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log level (e.g., "info", "debug", "trace")
    pub log_level: String,

    pub log_format: LogFormat,

    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if a required secret is missing or any
    /// value fails validation.
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 8080)?,
            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 1024 * 1024)?,
            cors_allowed_origins: Self::parse_list("CORS_ALLOWED_ORIGINS", "*"),

            // Security
            token: TokenConfig {
                secret: Self::required_secret("JWT_SECRET")?,
                access_ttl: Duration::from_secs(Self::parse_env("ACCESS_TOKEN_TTL_SECS", 900)?),
                refresh_ttl: Duration::from_secs(Self::parse_env(
                    "REFRESH_TOKEN_TTL_SECS",
                    7 * 24 * 60 * 60,
                )?),
            },
            admin_api_key: Self::required_secret("ADMIN_API_KEY")?,
            password_hash: PasswordHashConfig {
                memory_kib: Self::parse_env("PASSWORD_HASH_MEMORY_KIB", 19_456)?,
                iterations: Self::parse_env("PASSWORD_HASH_ITERATIONS", 2)?,
                parallelism: Self::parse_env("PASSWORD_HASH_PARALLELISM", 1)?,
            },

            // Rate limiting
            rate_limit: RateLimitConfig {
                enabled: Self::parse_env("RATE_LIMIT_ENABLED", true)?,
                capacity: Self::parse_env("RATE_LIMIT_CAPACITY", 100)?,
                refill_tokens: Self::parse_env("RATE_LIMIT_REFILL_TOKENS", 100)?,
                refill_period: Duration::from_secs(Self::parse_env(
                    "RATE_LIMIT_REFILL_PERIOD_SECS",
                    60,
                )?),
                max_cache_size: Self::parse_env("RATE_LIMIT_MAX_CACHE_SIZE", 100_000)?,
            },
            trusted_proxies: Self::parse_list("TRUSTED_PROXIES", ""),
            maintenance_interval: Duration::from_secs(Self::parse_env(
                "MAINTENANCE_INTERVAL_SECS",
                30,
            )?),

            // Observability
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            log_format: Self::parse_log_format()?,
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Build a configuration with development defaults around the given secrets.
    ///
    /// Used by tests and embedders that construct configuration in code.
    pub fn with_secrets(jwt_secret: impl Into<String>, admin_api_key: impl Into<String>) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_request_body_size: 1024 * 1024,
            cors_allowed_origins: vec!["*".to_string()],
            token: TokenConfig {
                secret: Secret::new(jwt_secret),
                access_ttl: Duration::from_secs(900),
                refresh_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            },
            admin_api_key: Secret::new(admin_api_key),
            password_hash: PasswordHashConfig::default(),
            rate_limit: RateLimitConfig::default(),
            trusted_proxies: vec![],
            maintenance_interval: Duration::from_secs(30),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_port: 0,
        }
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    pub fn validate(&self) -> AppResult<()> {
        let secret = self.token.secret.expose();
        if is_placeholder_secret(secret) {
            return Err(AppError::ConfigError(
                "JWT_SECRET must be set to a non-placeholder value".to_string(),
            ));
        }
        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(AppError::ConfigError(format!(
                "JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} bytes"
            )));
        }

        let admin_key = self.admin_api_key.expose();
        if is_placeholder_secret(admin_key) {
            return Err(AppError::ConfigError(
                "ADMIN_API_KEY must be set to a non-placeholder value".to_string(),
            ));
        }
        if admin_key.len() > MAX_ADMIN_KEY_LEN {
            return Err(AppError::ConfigError(format!(
                "ADMIN_API_KEY cannot exceed {MAX_ADMIN_KEY_LEN} bytes"
            )));
        }

        if self.token.access_ttl.is_zero() {
            return Err(AppError::ConfigError(
                "ACCESS_TOKEN_TTL_SECS must be greater than 0".to_string(),
            ));
        }
        if self.token.access_ttl >= self.token.refresh_ttl {
            return Err(AppError::ConfigError(format!(
                "ACCESS_TOKEN_TTL_SECS ({:?}) must be shorter than REFRESH_TOKEN_TTL_SECS ({:?})",
                self.token.access_ttl, self.token.refresh_ttl
            )));
        }

        if self.rate_limit.enabled {
            let rl = &self.rate_limit;
            if rl.capacity == 0 {
                return Err(AppError::ConfigError(
                    "RATE_LIMIT_CAPACITY must be greater than 0".to_string(),
                ));
            }
            if rl.refill_tokens == 0 {
                return Err(AppError::ConfigError(
                    "RATE_LIMIT_REFILL_TOKENS must be greater than 0".to_string(),
                ));
            }
            if rl.refill_period.is_zero() {
                return Err(AppError::ConfigError(
                    "RATE_LIMIT_REFILL_PERIOD_SECS must be greater than 0".to_string(),
                ));
            }
            if rl.max_cache_size == 0 {
                return Err(AppError::ConfigError(
                    "RATE_LIMIT_MAX_CACHE_SIZE must be greater than 0".to_string(),
                ));
            }
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.maintenance_interval.is_zero() {
            return Err(AppError::ConfigError(
                "MAINTENANCE_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Read a secret that has no default.
    fn required_secret(name: &str) -> AppResult<Secret> {
        env::var(name)
            .map(Secret::new)
            .map_err(|_| AppError::ConfigError(format!("{name} must be set")))
    }

    /// Parse a comma-separated list, dropping empty entries.
    fn parse_list(name: &str, default: &str) -> Vec<String> {
        env::var(name)
            .unwrap_or_else(|_| default.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    fn parse_log_format() -> AppResult<LogFormat> {
        match env::var("LOG_FORMAT") {
            Err(_) => Ok(LogFormat::Text),
            Ok(v) if v.eq_ignore_ascii_case("text") => Ok(LogFormat::Text),
            Ok(v) if v.eq_ignore_ascii_case("json") => Ok(LogFormat::Json),
            Ok(v) => Err(AppError::ConfigError(format!(
                "Invalid LOG_FORMAT: {v} (expected text or json)"
            ))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn valid() -> Config {
        Config::with_secrets(SECRET, "bootstrap-admin-key")
    }

    #[test]
    fn test_default_config_values() {
        let config = valid();

        assert_eq!(config.port, 8080);
        assert_eq!(config.rate_limit.capacity, 100);
        assert_eq!(config.rate_limit.refill_period, Duration::from_secs(60));
        assert!(config.rate_limit.enabled);
        assert!(config.trusted_proxies.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_addr_format() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 3000,
            ..valid()
        };

        assert_eq!(config.server_addr(), "127.0.0.1:3000");
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let config = valid();
        let rendered = format!("{config:?}");

        assert!(!rendered.contains(SECRET));
        assert!(!rendered.contains("bootstrap-admin-key"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_validate_rejects_short_jwt_secret() {
        let config = Config::with_secrets("too-short", "bootstrap-admin-key");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn test_validate_rejects_placeholder_secrets() {
        let config = Config::with_secrets("changeme", "bootstrap-admin-key");
        assert!(config.validate().is_err());

        let config = Config::with_secrets(SECRET, "  ");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ADMIN_API_KEY"));

        let config = Config::with_secrets(SECRET, "ChangeMe");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_ttl_ordering() {
        let mut config = valid();
        config.token.access_ttl = Duration::from_secs(3600);
        config.token.refresh_ttl = Duration::from_secs(60);

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ACCESS_TOKEN_TTL_SECS"));
    }

    #[test]
    fn test_validate_rate_limit_zero_capacity() {
        let mut config = valid();
        config.rate_limit.capacity = 0;
        assert!(config.validate().is_err());

        // A disabled limiter is not validated
        config.rate_limit.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_metrics_addr_disabled() {
        let config = valid();
        assert!(config.metrics_addr().is_none());

        let config = Config {
            metrics_port: 9090,
            ..valid()
        };
        assert_eq!(config.metrics_addr().unwrap().port(), 9090);
    }
}
