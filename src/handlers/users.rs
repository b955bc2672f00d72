use axum::Json;
use axum::extract::State;
use tracing::instrument;

use crate::error::AppResult;
use crate::middleware::AuthenticatedUser;
use crate::models::UserResponse;
use crate::state::AppState;

/// Profile of the calling user.
#[instrument(skip(state))]
pub async fn current_user(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Json<UserResponse>> {
    Ok(Json(state.auth.current_user(principal)?))
}
