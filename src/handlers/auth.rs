//! Sign-up, sign-in and token refresh.
//!
//! These routes are public at the gate. Sign-in is still throttled by the
//! rate limiter, which is what bounds password guessing.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::instrument;

use crate::error::AppResult;
use crate::models::{
    RefreshTokenRequest, RefreshTokenResponse, SignInRequest, SignInResponse, SignUpRequest,
    SignUpResponse,
};
use crate::state::AppState;

/// Register a standard account.
#[instrument(skip(state))]
pub async fn sign_up(
    State(state): State<AppState>,
    Json(payload): Json<SignUpRequest>,
) -> AppResult<(StatusCode, Json<SignUpResponse>)> {
    let response = state.auth.sign_up(payload).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Exchange email and password for an access and refresh token.
///
/// Unknown email and wrong password produce the same 401 body.
#[instrument(skip(state))]
pub async fn sign_in(
    State(state): State<AppState>,
    Json(payload): Json<SignInRequest>,
) -> AppResult<Json<SignInResponse>> {
    Ok(Json(state.auth.sign_in(payload).await?))
}

/// Mint a new access token.
#[instrument(skip(state))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> AppResult<Json<RefreshTokenResponse>> {
    Ok(Json(state.auth.refresh(&payload.refresh_token).await?))
}
