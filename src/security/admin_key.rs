//! Shared-secret guard for privileged bootstrap endpoints.
//!
//! The configured key is copied once into a fixed-size, zero-padded buffer.
//! Every check pads the caller's value the same way and compares the full
//! buffers plus both lengths with `subtle`, so the work done does not depend
//! on where the values first differ or on how long the provided value is
//! (up to [`MAX_ADMIN_KEY_LEN`]).

use std::fmt;

use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::error;

use crate::config::{MAX_ADMIN_KEY_LEN, Secret, is_placeholder_secret};
use crate::error::{AppError, AppResult};

/// Why an admin key check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdminKeyError {
    /// No usable key is configured. Normally caught at startup.
    #[error("admin key is not configured")]
    NotConfigured,
    #[error("provided admin key exceeds {MAX_ADMIN_KEY_LEN} bytes")]
    TooLong,
    #[error("provided admin key does not match")]
    Mismatch,
}

type KeyBuffer = [u8; MAX_ADMIN_KEY_LEN];

/// Constant-time checker for the configured admin key.
#[derive(Clone)]
pub struct AdminKeyGuard {
    expected: Box<KeyBuffer>,
    expected_len: u64,
}

impl fmt::Debug for AdminKeyGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdminKeyGuard([REDACTED])")
    }
}

impl AdminKeyGuard {
    /// Build a guard around the configured secret.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the secret is blank, a placeholder,
    /// or longer than [`MAX_ADMIN_KEY_LEN`] bytes.
    pub fn new(secret: &Secret) -> AppResult<Self> {
        let value = secret.expose();
        if is_placeholder_secret(value) {
            return Err(AppError::ConfigError(
                "Admin key must be set to a non-placeholder value".to_string(),
            ));
        }
        let expected = pad(value.as_bytes()).ok_or_else(|| {
            AppError::ConfigError(format!(
                "Admin key cannot exceed {MAX_ADMIN_KEY_LEN} bytes"
            ))
        })?;

        Ok(Self {
            expected: Box::new(expected),
            expected_len: value.len() as u64,
        })
    }

    /// Check a caller-supplied key.
    ///
    /// # Errors
    ///
    /// - [`AdminKeyError::TooLong`] before any comparison if `provided` is over the cap
    /// - [`AdminKeyError::Mismatch`] if the values differ
    /// - [`AdminKeyError::NotConfigured`] if the guard holds no key
    pub fn check(&self, provided: &str) -> Result<(), AdminKeyError> {
        // Construction rejects blank keys; re-checked so a zeroed guard never
        // accepts an empty header
        if self.expected_len == 0 {
            error!("Admin key check attempted with no key configured");
            return Err(AdminKeyError::NotConfigured);
        }

        let candidate = pad(provided.as_bytes()).ok_or(AdminKeyError::TooLong)?;
        let candidate_len = provided.len() as u64;

        let same_content = candidate.as_slice().ct_eq(self.expected.as_slice());
        let same_len = candidate_len.ct_eq(&self.expected_len);

        if bool::from(same_content & same_len) {
            Ok(())
        } else {
            Err(AdminKeyError::Mismatch)
        }
    }
}

/// Copy `bytes` into a zero-padded buffer, or `None` if it does not fit.
fn pad(bytes: &[u8]) -> Option<KeyBuffer> {
    let mut buffer = [0u8; MAX_ADMIN_KEY_LEN];
    buffer.get_mut(..bytes.len())?.copy_from_slice(bytes);
    Some(buffer)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn guard(key: &str) -> AdminKeyGuard {
        AdminKeyGuard::new(&Secret::new(key)).unwrap()
    }

    #[test]
    fn test_matching_key_passes() {
        assert_eq!(guard("bootstrap-admin-key").check("bootstrap-admin-key"), Ok(()));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let guard = guard("bootstrap-admin-key");

        assert_eq!(guard.check("bootstrap-admin-kex"), Err(AdminKeyError::Mismatch));
        assert_eq!(guard.check("xootstrap-admin-key"), Err(AdminKeyError::Mismatch));
        assert_eq!(guard.check(""), Err(AdminKeyError::Mismatch));
    }

    #[test]
    fn test_prefix_and_zero_padding_do_not_match() {
        let guard = guard("bootstrap-admin-key");

        // Equal padded buffers but different lengths
        assert_eq!(guard.check("bootstrap"), Err(AdminKeyError::Mismatch));
        assert_eq!(
            guard.check("bootstrap-admin-key\0"),
            Err(AdminKeyError::Mismatch)
        );
    }

    #[test]
    fn test_over_length_rejected_before_compare() {
        let guard = guard("bootstrap-admin-key");
        let oversized = "k".repeat(MAX_ADMIN_KEY_LEN + 1);

        assert_eq!(guard.check(&oversized), Err(AdminKeyError::TooLong));
    }

    #[test]
    fn test_max_length_key_accepted() {
        let key = "k".repeat(MAX_ADMIN_KEY_LEN);
        assert_eq!(guard(&key).check(&key), Ok(()));
    }

    #[test]
    fn test_blank_or_placeholder_secret_is_config_error() {
        for key in ["", "   ", "changeme", "admin"] {
            let result = AdminKeyGuard::new(&Secret::new(key));
            assert!(matches!(result, Err(AppError::ConfigError(_))), "{key:?}");
        }
    }

    #[test]
    fn test_oversized_secret_is_config_error() {
        let result = AdminKeyGuard::new(&Secret::new("k".repeat(MAX_ADMIN_KEY_LEN + 1)));
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_zeroed_guard_rejects_everything() {
        let guard = AdminKeyGuard {
            expected: Box::new([0u8; MAX_ADMIN_KEY_LEN]),
            expected_len: 0,
        };
        assert_eq!(guard.check(""), Err(AdminKeyError::NotConfigured));
    }

    #[test]
    fn test_debug_is_redacted() {
        let guard = guard("bootstrap-admin-key");
        assert!(!format!("{guard:?}").contains("bootstrap"));
    }
}
