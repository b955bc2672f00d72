//! Signed session tokens (HS256 JWS).
//!
//! # Token Shape
//!
//! Claims are `sub` (subject UUID), `role`, `iat` and `exp` in Unix seconds.
//! Access and refresh tokens share that shape and differ only in lifetime.
//!
//! # Verification Contract
//!
//! - [`TokenService::verify`] answers a plain `bool` and never errors
//! - [`TokenService::authenticate`] verifies and extracts in one pass; its
//!   [`TokenError`] is for logs and metrics, never for responses
//! - [`TokenService::subject_of`] / [`TokenService::role_of`] check the
//!   signature but not expiry. Callers must have seen `verify` return `true`
//!   for the same token first
//!
//! Expiry is evaluated against the injected [`Clock`](crate::clock::Clock),
//! not inside `jsonwebtoken`, so tests can move time explicitly.
//!
//! Tokens are stateless. There is no revocation list; a token lives until `exp`.

use std::fmt;
use std::sync::Arc;

use chrono::TimeDelta;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::config::{MIN_JWT_SECRET_LEN, TokenConfig, is_placeholder_secret};
use crate::error::{AppError, AppResult};
use crate::models::{Principal, Role};

/// Reasons a token failed verification. Internal use only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not verify")]
    BadSignature,
    #[error("token has expired")]
    Expired,
    #[error("token claims are invalid")]
    InvalidClaims,
}

impl TokenError {
    /// Stable label for metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            TokenError::Malformed => "malformed",
            TokenError::BadSignature => "bad_signature",
            TokenError::Expired => "expired",
            TokenError::InvalidClaims => "invalid_claims",
        }
    }
}

/// Which lifetime a token was issued with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Access and refresh tokens issued together at sign-in.
#[derive(Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenPair([REDACTED])")
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    role: Role,
    iat: i64,
    exp: i64,
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Issues and verifies session tokens with one process-wide symmetric key.
///
/// Cheap to clone; key material is shared and never mutated after construction.
#[derive(Clone)]
pub struct TokenService {
    keys: Arc<Keys>,
    validation: Arc<Validation>,
    access_ttl: TimeDelta,
    refresh_ttl: TimeDelta,
    clock: SharedClock,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Create a token service from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the secret is missing, a placeholder,
    /// or shorter than [`MIN_JWT_SECRET_LEN`] bytes, or if a lifetime is out of range.
    pub fn new(config: &TokenConfig, clock: SharedClock) -> AppResult<Self> {
        let secret = config.secret.expose();
        if is_placeholder_secret(secret) || secret.len() < MIN_JWT_SECRET_LEN {
            return Err(AppError::ConfigError(format!(
                "Token signing key must be a non-placeholder secret of at least {MIN_JWT_SECRET_LEN} bytes"
            )));
        }

        let access_ttl = TimeDelta::from_std(config.access_ttl)
            .map_err(|e| AppError::ConfigError(format!("Invalid access token lifetime: {e}")))?;
        let refresh_ttl = TimeDelta::from_std(config.refresh_ttl)
            .map_err(|e| AppError::ConfigError(format!("Invalid refresh token lifetime: {e}")))?;

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the injected clock in `authenticate`
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            keys: Arc::new(Keys {
                encoding: EncodingKey::from_secret(secret.as_bytes()),
                decoding: DecodingKey::from_secret(secret.as_bytes()),
            }),
            validation: Arc::new(validation),
            access_ttl,
            refresh_ttl,
            clock,
        })
    }

    /// Issue a short-lived access token.
    pub fn issue_access_token(&self, subject_id: Uuid, role: Role) -> AppResult<String> {
        self.issue(TokenKind::Access, subject_id, role)
    }

    /// Issue a long-lived refresh token.
    pub fn issue_refresh_token(&self, subject_id: Uuid, role: Role) -> AppResult<String> {
        self.issue(TokenKind::Refresh, subject_id, role)
    }

    /// Issue both tokens for a freshly authenticated principal.
    pub fn issue_pair(&self, principal: Principal) -> AppResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue_access_token(principal.subject_id, principal.role)?,
            refresh_token: self.issue_refresh_token(principal.subject_id, principal.role)?,
        })
    }

    /// Issue a token of the given kind.
    ///
    /// # Errors
    ///
    /// Returns `AppError::TokenIssuance` if signing fails or the expiry overflows.
    pub fn issue(&self, kind: TokenKind, subject_id: Uuid, role: Role) -> AppResult<String> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| AppError::TokenIssuance("token expiry overflows".to_string()))?;

        let claims = Claims {
            sub: subject_id.to_string(),
            role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.keys.encoding)
            .map_err(|e| AppError::TokenIssuance(e.to_string()))
    }

    /// Returns true only for a well-formed, correctly signed, unexpired token.
    pub fn verify(&self, token: &str) -> bool {
        self.authenticate(token).is_ok()
    }

    /// Verify a token and extract its principal in one pass.
    ///
    /// # Errors
    ///
    /// Returns the internal reason for rejection. Callers must not forward it
    /// to clients.
    pub fn authenticate(&self, token: &str) -> Result<Principal, TokenError> {
        let claims = self.decode_claims(token)?;

        // Valid only while now < exp
        if self.clock.now().timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        principal_from(&claims)
    }

    /// Subject of a token whose signature verifies.
    ///
    /// Precondition: `verify(token)` returned `true`. Expiry is not checked here.
    pub fn subject_of(&self, token: &str) -> Option<Uuid> {
        self.decode_claims(token)
            .ok()
            .and_then(|c| Uuid::parse_str(&c.sub).ok())
    }

    /// Role of a token whose signature verifies.
    ///
    /// Precondition: `verify(token)` returned `true`. Expiry is not checked here.
    pub fn role_of(&self, token: &str) -> Option<Role> {
        self.decode_claims(token).ok().map(|c| c.role)
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.keys.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let reason = match e.kind() {
                    ErrorKind::InvalidSignature => TokenError::BadSignature,
                    ErrorKind::MissingRequiredClaim(_) | ErrorKind::Json(_) => {
                        TokenError::InvalidClaims
                    }
                    _ => TokenError::Malformed,
                };
                debug!(reason = %reason, "Token decode failed");
                reason
            })
    }
}

fn principal_from(claims: &Claims) -> Result<Principal, TokenError> {
    let subject_id = Uuid::parse_str(&claims.sub).map_err(|_| TokenError::InvalidClaims)?;
    Ok(Principal::new(subject_id, claims.role))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Secret;

    const SECRET: &str = "unit-test-signing-key-0123456789abcdef";

    fn token_config() -> TokenConfig {
        TokenConfig {
            secret: Secret::new(SECRET),
            access_ttl: Duration::from_secs(900),
            refresh_ttl: Duration::from_secs(7 * 24 * 3600),
        }
    }

    fn service() -> (TokenService, ManualClock) {
        let clock = ManualClock::default();
        let service = TokenService::new(&token_config(), Arc::new(clock.clone())).unwrap();
        (service, clock)
    }

    /// Flip the first character of the signature segment.
    fn tamper_signature(token: &str) -> String {
        let (head, sig) = token.rsplit_once('.').unwrap();
        let mut chars: Vec<char> = sig.chars().collect();
        chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
        format!("{head}.{}", chars.into_iter().collect::<String>())
    }

    #[test]
    fn test_access_token_round_trip() {
        let (service, _) = service();
        let id = Uuid::new_v4();

        let token = service.issue_access_token(id, Role::Standard).unwrap();

        assert!(service.verify(&token));
        assert_eq!(service.subject_of(&token), Some(id));
        assert_eq!(service.role_of(&token), Some(Role::Standard));
        assert_eq!(
            service.authenticate(&token).unwrap(),
            Principal::new(id, Role::Standard)
        );
    }

    #[test]
    fn test_refresh_token_carries_admin_role() {
        let (service, _) = service();
        let id = Uuid::new_v4();

        let token = service.issue_refresh_token(id, Role::Admin).unwrap();

        assert!(service.verify(&token));
        assert_eq!(service.role_of(&token), Some(Role::Admin));
    }

    #[test]
    fn test_expired_token_fails_verify() {
        let (service, clock) = service();
        let token = service
            .issue_access_token(Uuid::new_v4(), Role::Standard)
            .unwrap();

        // One second past the 900s lifetime
        clock.advance(Duration::from_secs(901));

        assert!(!service.verify(&token));
        assert_eq!(service.authenticate(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_token_invalid_exactly_at_expiry() {
        let (service, clock) = service();
        let token = service
            .issue_access_token(Uuid::new_v4(), Role::Standard)
            .unwrap();

        clock.advance(Duration::from_secs(899));
        assert!(service.verify(&token));

        clock.advance(Duration::from_secs(1));
        assert!(!service.verify(&token));
    }

    #[test]
    fn test_refresh_outlives_access() {
        let (service, clock) = service();
        let pair = service
            .issue_pair(Principal::new(Uuid::new_v4(), Role::Standard))
            .unwrap();

        clock.advance(Duration::from_secs(3600));

        assert!(!service.verify(&pair.access_token));
        assert!(service.verify(&pair.refresh_token));
    }

    #[test]
    fn test_tampered_signature_fails_verify() {
        let (service, _) = service();
        let token = service
            .issue_access_token(Uuid::new_v4(), Role::Standard)
            .unwrap();

        let tampered = tamper_signature(&token);

        assert_ne!(token, tampered);
        assert!(!service.verify(&tampered));
        assert!(service.subject_of(&tampered).is_none());
    }

    #[test]
    fn test_token_from_other_key_rejected() {
        let (service, _) = service();
        let other_config = TokenConfig {
            secret: Secret::new("a-completely-different-signing-key-9876543210"),
            ..token_config()
        };
        let other =
            TokenService::new(&other_config, Arc::new(ManualClock::default())).unwrap();

        let foreign = other
            .issue_access_token(Uuid::new_v4(), Role::Admin)
            .unwrap();

        assert_eq!(
            service.authenticate(&foreign),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_malformed_tokens_fail_without_panicking() {
        let (service, _) = service();

        for token in ["", "abc", "a.b", "a.b.c", "...", "Bearer x.y.z"] {
            assert!(!service.verify(token), "accepted {token:?}");
        }
    }

    #[test]
    fn test_rejects_placeholder_and_short_secrets() {
        for secret in ["", "changeme", "short-secret"] {
            let config = TokenConfig {
                secret: Secret::new(secret),
                ..token_config()
            };
            let result = TokenService::new(&config, Arc::new(ManualClock::default()));
            assert!(matches!(result, Err(AppError::ConfigError(_))));
        }
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let (service, _) = service();
        assert!(!format!("{service:?}").contains(SECRET));
    }
}
