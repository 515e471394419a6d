use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::Json,
};
use serde::Serialize;
use sqlx::types::Json as SqlJson;

use crate::{
    middleware::auth::{AuthUser, ALL_ROLES},
    models::candidate_process::{CandidateProcess, NoteRequest},
    services::scope::VisibilityScope,
    utils::{
        errors::{AppError, AppResult},
        extract::AppJson,
        logger::{event_fields, LOGGER},
    },
    AppState,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteSaved {
    pub message: String,
    pub updated_candidate_process: CandidateProcess,
}

async fn merge_note(
    state: &AppState,
    auth_user: &AuthUser,
    payload: NoteRequest,
) -> Result<CandidateProcess, AppError> {
    let id = payload.candidate_process_id.ok_or_else(|| {
        AppError::BadRequest("Parameter 'candidate_process_id' is required".to_string())
    })?;

    let scope = VisibilityScope::resolve(&state.db, auth_user).await?;
    let (companies, managements) = scope.bind_arrays();

    let mut tx = state.db.begin().await?;
    let current = sqlx::query_as::<_, CandidateProcess>(
        r#"
        SELECT cp.* FROM candidate_process cp
        LEFT JOIN process p ON p.id = cp.process_id
        LEFT JOIN management m ON m.id = p.management_id
        WHERE cp.id = $1
          AND ($2::int[] IS NULL OR m.company_id = ANY($2))
          AND ($3::int[] IS NULL OR p.management_id = ANY($3))
        FOR UPDATE OF cp
        "#,
    )
    .bind(id)
    .bind(&companies)
    .bind(&managements)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::not_found("Candidate-process", id))?;

    let mut comments = current.client_comments.map(|c| c.0).unwrap_or_default();
    comments.merge(&payload.note);

    let updated = sqlx::query_as::<_, CandidateProcess>(
        r#"
        UPDATE candidate_process
        SET client_comments = $2, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(SqlJson(comments))
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    LOGGER.log_business_event(
        "client_note_saved",
        Some(auth_user.user_id),
        event_fields([("candidate_process_id", id.into())]),
    );

    Ok(updated)
}

pub async fn create_note(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppJson(payload): AppJson<NoteRequest>,
) -> AppResult<(StatusCode, Json<NoteSaved>)> {
    auth_user.require(ALL_ROLES)?;
    if payload.note.is_empty() {
        return Err(AppError::BadRequest(
            "At least one of 'comment', 'techSkills' or 'softSkills' is required".to_string(),
        ));
    }

    let updated = merge_note(&state, &auth_user, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(NoteSaved {
            message: "Note created".to_string(),
            updated_candidate_process: updated,
        }),
    ))
}

pub async fn update_note(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppJson(payload): AppJson<NoteRequest>,
) -> AppResult<Json<NoteSaved>> {
    auth_user.require(ALL_ROLES)?;

    let updated = merge_note(&state, &auth_user, payload).await?;
    Ok(Json(NoteSaved {
        message: "Note updated".to_string(),
        updated_candidate_process: updated,
    }))
}
