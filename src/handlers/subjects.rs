//! Subject catalog endpoints.
//!
//! Reads are public. Writes require the admin role, which the access control
//! layer enforces before these handlers run; `create_subject` and
//! `delete_subject` re-check it through the extractor anyway.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use tracing::{info, instrument};

use crate::error::{AppError, AppResult};
use crate::middleware::AuthenticatedUser;
use crate::models::{CreateSubjectRequest, Role, Subject};
use crate::state::AppState;
use crate::validation::validate_title;

/// List all subjects.
#[instrument(skip(state))]
pub async fn list_subjects(State(state): State<AppState>) -> Json<Vec<Subject>> {
    Json(state.catalog.list())
}

/// Get a subject by id.
#[instrument(skip(state))]
pub async fn get_subject(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> AppResult<Json<Subject>> {
    state
        .catalog
        .get(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Subject {id} not found")))
}

/// Add a subject to the catalog.
#[instrument(skip(state))]
pub async fn create_subject(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateSubjectRequest>,
) -> AppResult<(StatusCode, Json<Subject>)> {
    user.require_role(Role::Admin)?;
    validate_title(&payload.title)?;

    let subject = state
        .catalog
        .insert(payload.title.trim().to_string(), payload.description);
    info!(subject_id = subject.id, "Subject created");

    Ok((StatusCode::CREATED, Json(subject)))
}

/// Remove a subject.
#[instrument(skip(state))]
pub async fn delete_subject(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<u64>,
) -> AppResult<StatusCode> {
    user.require_role(Role::Admin)?;

    if state.catalog.delete(id) {
        info!(subject_id = id, "Subject deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Subject {id} not found")))
    }
}
