use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Maximum stored length of an encoded password hash.
pub const MAX_PASSWORD_HASH_LENGTH: usize = 255;

/// Closed set of roles a principal may hold.
///
/// Serialized with the `ROLE_` prefix used in token claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "ROLE_USER")]
    Standard,
    #[serde(rename = "ROLE_ADMIN")]
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Standard => "ROLE_USER",
            Role::Admin => "ROLE_ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated identity derived from a verified session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub subject_id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn new(subject_id: Uuid, role: Role) -> Self {
        Self { subject_id, role }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }
}

/// One-way password hash in PHC string format.
///
/// Only `PasswordHasher::hash` produces these for new accounts; the
/// constructor exists so stored values can be rehydrated and validated.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn new(encoded: impl Into<String>) -> AppResult<Self> {
        let encoded = encoded.into();
        if encoded.trim().is_empty() {
            return Err(AppError::Internal("Password hash cannot be empty".to_string()));
        }
        if encoded.len() > MAX_PASSWORD_HASH_LENGTH {
            return Err(AppError::Internal(format!(
                "Password hash cannot exceed {MAX_PASSWORD_HASH_LENGTH} characters"
            )));
        }
        Ok(Self(encoded))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash([REDACTED])")
    }
}

/// Stored login record owned by the identity store.
#[derive(Debug, Clone)]
pub struct Credential {
    pub subject_id: Uuid,
    /// Login identity (email address)
    pub identity: String,
    pub username: String,
    pub password_hash: PasswordHash,
    pub role: Role,
}

impl Credential {
    pub fn principal(&self) -> Principal {
        Principal::new(self.subject_id, self.role)
    }
}
