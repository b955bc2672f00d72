//! Shared application state for Axum handlers and the gate layers.
//!
//! Every component is constructed once from an explicit [`Config`] and shared
//! through `Arc` or cheap clones. Nothing here is a global.
//!
//! # Structured Concurrency
//!
//! The rate limiter's cache housekeeping runs as a background task managed by
//! `tokio_util::task::TaskTracker` and `CancellationToken`. Call `shutdown()`
//! to stop it before application exit.

use std::sync::Arc;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace};

use crate::clock::{SharedClock, SystemClock};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::security::{AdminKeyGuard, PasswordHasher, RateLimiter, TokenService};
use crate::services::AuthService;
use crate::store::{
    CredentialStore, InMemoryCredentialStore, InMemoryProgressStore, InMemorySubjectCatalog,
    ProgressStore, SubjectCatalog,
};

/// Shared application state.
///
/// # Lifecycle
///
/// ```rust,ignore
/// let state = AppState::new(config)?;
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: AuthService,
    pub tokens: TokenService,
    pub admin_guard: AdminKeyGuard,
    /// `None` when rate limiting is disabled
    pub rate_limiter: Option<RateLimiter>,
    pub progress: Arc<dyn ProgressStore>,
    pub catalog: Arc<dyn SubjectCatalog>,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Build state backed by the system clock and in-memory stores.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any security component rejects its
    /// configuration. Must be called inside a Tokio runtime.
    pub fn new(config: Config) -> AppResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build state with an explicit time source.
    ///
    /// # Errors
    ///
    /// See [`AppState::new`].
    pub fn with_clock(config: Config, clock: SharedClock) -> AppResult<Self> {
        config.validate()?;

        let tokens = TokenService::new(&config.token, clock.clone())?;
        let admin_guard = AdminKeyGuard::new(&config.admin_api_key)?;
        let hasher = PasswordHasher::new(config.password_hash)?;

        let rate_limiter = if config.rate_limit.enabled {
            let limiter = RateLimiter::new(&config.rate_limit, clock)
                .map_err(|e| AppError::ConfigError(e.to_string()))?;
            Some(limiter)
        } else {
            None
        };

        let credentials: Arc<dyn CredentialStore> = Arc::new(InMemoryCredentialStore::new());
        let auth = AuthService::new(credentials, hasher, tokens.clone());

        let state = Self {
            config: Arc::new(config),
            auth,
            tokens,
            admin_guard,
            rate_limiter,
            progress: Arc::new(InMemoryProgressStore::new()),
            catalog: Arc::new(InMemorySubjectCatalog::new()),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        state.spawn_limiter_maintenance_task();

        Ok(state)
    }

    /// Periodically apply pending cache evictions and publish the bucket count.
    ///
    /// Eviction also happens inline as the cache fills; this keeps the count
    /// accurate while traffic is idle.
    fn spawn_limiter_maintenance_task(&self) {
        let Some(limiter) = self.rate_limiter.clone() else {
            return;
        };
        let period = self.config.maintenance_interval;
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Rate limiter maintenance task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        limiter.run_maintenance();
                        let buckets = limiter.bucket_count();
                        metrics::set_rate_limit_buckets(buckets);
                        trace!(buckets, "Rate limiter maintenance complete");
                    }
                }
            }

            debug!("Rate limiter maintenance task shutting down");
        });
    }

    /// Gracefully shutdown all background tasks.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::PasswordHashConfig;

    fn config() -> Config {
        let mut config = Config::with_secrets(
            "state-test-signing-key-0123456789abcdef",
            "state-test-admin-key",
        );
        config.password_hash = PasswordHashConfig {
            memory_kib: 256,
            iterations: 1,
            parallelism: 1,
        };
        config.maintenance_interval = Duration::from_millis(10);
        config
    }

    #[tokio::test]
    async fn test_state_builds_and_shuts_down() {
        let state = AppState::with_clock(config(), Arc::new(ManualClock::default())).unwrap();
        assert!(state.rate_limiter.is_some());

        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_disabled_limiter_is_absent() {
        let mut config = config();
        config.rate_limit.enabled = false;

        let state = AppState::new(config).unwrap();
        assert!(state.rate_limiter.is_none());
        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_secrets_fail_construction() {
        let mut config = config();
        config.admin_api_key = crate::config::Secret::new("changeme");

        assert!(matches!(
            AppState::new(config),
            Err(AppError::ConfigError(_))
        ));
    }
}
