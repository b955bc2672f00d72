//! Password hashing and verification with Argon2id.
//!
//! # Timing Equalization
//!
//! Sign-in must cost the same whether or not the identity exists. The hasher
//! generates a decoy hash at construction with the same cost parameters as
//! real hashes; callers that find no credential run [`PasswordHasher::verify_decoy`]
//! instead of returning early.
//!
//! # Failure Semantics
//!
//! [`PasswordHasher::verify`] never returns an error. A malformed stored hash
//! is a non-match, so neither a crash nor a faster error path is observable.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{
    PasswordHash as PhcHash, PasswordHasher as _, PasswordVerifier, SaltString,
};
use argon2::{Algorithm, Argon2, Params, Version};
use tracing::{debug, warn};

use crate::config::PasswordHashConfig;
use crate::error::{AppError, AppResult};
use crate::models::PasswordHash;

/// Slow, salted password hasher with a built-in decoy.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
    decoy: String,
}

impl PasswordHasher {
    /// Create a hasher with the given Argon2id cost parameters.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the parameters are rejected by
    /// Argon2, or `AppError::HashingFailed` if the decoy cannot be produced.
    pub fn new(config: PasswordHashConfig) -> AppResult<Self> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|e| AppError::ConfigError(format!("Invalid password hash parameters: {e}")))?;

        // The decoy input is random so it can never match a real password
        let decoy_input = SaltString::generate(&mut OsRng);
        let decoy = hash_with(&params, decoy_input.as_str())?;

        debug!(
            memory_kib = config.memory_kib,
            iterations = config.iterations,
            parallelism = config.parallelism,
            "Password hasher initialized"
        );

        Ok(Self { params, decoy })
    }

    /// Hash a password into a PHC string with a fresh random salt.
    ///
    /// # Errors
    ///
    /// Returns `AppError::HashingFailed` if Argon2 fails.
    pub fn hash(&self, password: &str) -> AppResult<PasswordHash> {
        PasswordHash::new(hash_with(&self.params, password)?)
    }

    /// Verify a password against a stored hash.
    ///
    /// Returns `false` for a wrong password and for any malformed hash.
    pub fn verify(&self, password: &str, hash: &PasswordHash) -> bool {
        verify_encoded(password, hash.as_str())
    }

    /// Run a verification of equal cost that always fails.
    ///
    /// Call this when no credential exists for the requested identity.
    pub fn verify_decoy(&self, password: &str) -> bool {
        let _ = verify_encoded(password, &self.decoy);
        false
    }
}

fn argon2(params: &Params) -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone())
}

fn hash_with(params: &Params, password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    argon2(params)
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::HashingFailed(e.to_string()))
}

fn verify_encoded(password: &str, encoded: &str) -> bool {
    let parsed = match PhcHash::new(encoded) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "Stored password hash is malformed");
            return false;
        }
    };

    // Cost parameters come from the PHC string itself
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
