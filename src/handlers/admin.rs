//! Privileged bootstrap endpoints guarded by the `X-Admin-Key` header.
//!
//! The gate treats `/api/admin/**` as public; the shared secret is checked
//! here with [`AdminKeyGuard`](crate::security::AdminKeyGuard).

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, StatusCode};
use tracing::{instrument, warn};

use crate::error::{AppError, AppResult};
use crate::models::{AdminUserResponse, SignUpRequest};
use crate::state::AppState;

/// Header carrying the admin shared secret.
pub const ADMIN_KEY_HEADER: HeaderName = HeaderName::from_static("x-admin-key");

/// Create an admin account.
///
/// - Missing header: 401
/// - Wrong, oversized or non-ASCII key: 403
#[instrument(skip(state, headers))]
pub async fn create_admin_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SignUpRequest>,
) -> AppResult<(StatusCode, Json<AdminUserResponse>)> {
    require_admin_key(&state, &headers)?;

    let response = state.auth.create_admin(payload).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

fn require_admin_key(state: &AppState, headers: &HeaderMap) -> AppResult<()> {
    let value = headers
        .get(&ADMIN_KEY_HEADER)
        .ok_or_else(|| AppError::Unauthorized("Missing admin key header".to_string()))?;

    let provided = value.to_str().map_err(|_| {
        warn!("Admin key header is not visible ASCII");
        AppError::Forbidden("Admin key rejected".to_string())
    })?;

    state.admin_guard.check(provided).map_err(|reason| {
        warn!(reason = %reason, "Admin key rejected");
        AppError::Forbidden(format!("Admin key rejected: {reason}"))
    })
}
