//! Per-user learning progress.
//!
//! Every route here requires an authenticated principal. Records are keyed
//! by the principal's subject id, so a caller only ever sees their own.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use tracing::instrument;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthenticatedUser;
use crate::models::{
    MarkSectionClearedRequest, SectionClearedResponse, SectionStatusResponse,
    SubjectProgressResponse,
};
use crate::state::AppState;

fn ensure_subject_exists(state: &AppState, subject_id: u64) -> AppResult<()> {
    state
        .catalog
        .get(subject_id)
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(format!("Subject {subject_id} not found")))
}

/// Cleared sections of one subject.
#[instrument(skip(state))]
pub async fn subject_progress(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(subject_id): Path<u64>,
) -> AppResult<Json<SubjectProgressResponse>> {
    ensure_subject_exists(&state, subject_id)?;

    Ok(Json(SubjectProgressResponse {
        subject_id,
        cleared_sections: state.progress.cleared_sections(user.subject_id(), subject_id),
    }))
}

/// Mark a section as cleared. Repeating the call keeps the first timestamp.
#[instrument(skip(state))]
pub async fn mark_section_cleared(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(subject_id): Path<u64>,
    Json(payload): Json<MarkSectionClearedRequest>,
) -> AppResult<(StatusCode, Json<SectionClearedResponse>)> {
    ensure_subject_exists(&state, subject_id)?;

    let completed_at = state
        .progress
        .mark_cleared(user.subject_id(), subject_id, payload.section_id);

    Ok((
        StatusCode::CREATED,
        Json(SectionClearedResponse {
            subject_id,
            section_id: payload.section_id,
            completed_at,
        }),
    ))
}

/// Whether a section is cleared.
#[instrument(skip(state))]
pub async fn section_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((subject_id, section_id)): Path<(u64, u32)>,
) -> Json<SectionStatusResponse> {
    Json(SectionStatusResponse {
        is_cleared: state
            .progress
            .is_cleared(user.subject_id(), subject_id, section_id),
    })
}

/// Clear a section's completion record.
#[instrument(skip(state))]
pub async fn unmark_section_cleared(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((subject_id, section_id)): Path<(u64, u32)>,
) -> AppResult<StatusCode> {
    if state
        .progress
        .unmark_cleared(user.subject_id(), subject_id, section_id)
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!(
            "Section {section_id} of subject {subject_id} is not cleared"
        )))
    }
}
