//! # Progress Gate
//!
//! Authentication, rate limiting and route-level access control for a
//! learning-progress API, built on Axum:
//!
//! - **Credentials**: Argon2id password hashes with a decoy hash for unknown users
//! - **Sessions**: HS256 access and refresh tokens with an injectable clock
//! - **Throttling**: per-client token buckets in a bounded LRU cache
//! - **Authorization**: declarative (method, path) -> requirement table
//! - **Bootstrap**: constant-time admin key guard for admin account creation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Gate (Request ID → Rate Limit → Bearer Auth → Access)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, auth, admin, users, subjects, progress)  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  AuthService + security (password, token, admin key)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Stores (credentials, progress, subject catalog)            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use progress_gate::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), progress_gate::AppError> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(config)?;
//!     let _app = build_router(state.clone());
//!
//!     // Serve with `into_make_service_with_connect_info::<SocketAddr>()`
//!     // so the rate limiter can key on the peer address.
//!     state.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Required Configuration
//!
//! ```bash
//! JWT_SECRET=<32+ random bytes> ADMIN_API_KEY=<random> cargo run
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod security;
pub mod services;
pub mod state;
pub mod store;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use routes::{build_router, build_router_with_policy};
pub use state::AppState;
