use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use sqlx::{types::Json as SqlJson, FromRow};
use validator::Validate;

use crate::{
    middleware::auth::{AuthUser, ALL_ROLES, STAFF},
    models::{
        candidate_process::{
            CandidateProcess, CreateCandidateProcessRequest, EditPayload, PipelineCandidate,
            PipelineView, Stage, StageRequest,
        },
        process::{Process, STATUS_PENDING},
    },
    services::{
        pipeline::{PipelineService, StageCommand, StageOutcome},
        scope::VisibilityScope,
    },
    utils::{
        errors::{AppError, AppResult},
        extract::{AppJson, AppQuery},
        ids::parse_id,
        logger::{event_fields, LOGGER},
        pagination::{PageParams, Paginated},
    },
    AppState,
};

pub async fn list_candidate_processes(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppQuery(params): AppQuery<PageParams>,
) -> AppResult<Json<Paginated<CandidateProcess>>> {
    let page = params.resolve()?;
    auth_user.require(STAFF)?;

    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM candidate_process")
        .fetch_one(&state.db)
        .await?;

    let batch = sqlx::query_as::<_, CandidateProcess>(
        "SELECT * FROM candidate_process ORDER BY id LIMIT $1 OFFSET $2",
    )
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(Paginated { total, batch }))
}

pub async fn get_candidate_process(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<CandidateProcess>> {
    let id = parse_id(&id, "id")?;
    auth_user.require(STAFF)?;

    let row = sqlx::query_as::<_, CandidateProcess>("SELECT * FROM candidate_process WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("Candidate-process", id))?;

    Ok(Json(row))
}

pub async fn create_candidate_process(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppJson(payload): AppJson<CreateCandidateProcessRequest>,
) -> AppResult<(StatusCode, Json<CandidateProcess>)> {
    auth_user.require(STAFF)?;
    payload.validate()?;

    let row = sqlx::query_as::<_, CandidateProcess>(
        r#"
        INSERT INTO candidate_process
            (candidate_id, process_id, match_percent, technical_skills, soft_skills,
             client_comments, interview_questions, stage)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(payload.candidate_id)
    .bind(payload.process_id)
    .bind(payload.match_percent)
    .bind(&payload.technical_skills)
    .bind(&payload.soft_skills)
    .bind(payload.client_comments.clone().map(SqlJson))
    .bind(&payload.interview_questions)
    .bind(payload.stage.unwrap_or_default())
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(row)))
}

/// Field edit of a single association by its row id.
pub async fn update_candidate_process(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<EditPayload>,
) -> AppResult<Json<CandidateProcess>> {
    let id = parse_id(&id, "id")?;
    auth_user.require(STAFF)?;
    payload.validate()?;

    let row = sqlx::query_as::<_, CandidateProcess>(
        r#"
        UPDATE candidate_process
        SET technical_skills = COALESCE($2, technical_skills),
            soft_skills = COALESCE($3, soft_skills),
            client_comments = COALESCE($4, client_comments),
            match_percent = COALESCE($5, match_percent),
            interview_questions = COALESCE($6, interview_questions),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&payload.technical_skills)
    .bind(&payload.soft_skills)
    .bind(payload.client_comments.clone().map(SqlJson))
    .bind(payload.match_percent)
    .bind(&payload.interview_questions)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::not_found("Candidate-process", id))?;

    Ok(Json(row))
}

pub async fn delete_candidate_process(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let id = parse_id(&id, "id")?;
    auth_user.require(STAFF)?;

    let result = sqlx::query("DELETE FROM candidate_process WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Candidate-process", id));
    }

    Ok(Json(json!({ "message": "Candidate-process deleted" })))
}

#[derive(Debug, FromRow)]
struct PipelineRow {
    candidate_id: Option<i32>,
    name: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    address: Option<String>,
    match_percent: Option<i32>,
    stage: Stage,
}

pub async fn get_process_pipeline(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(process_id): Path<String>,
) -> AppResult<Json<PipelineView>> {
    let process_id = parse_id(&process_id, "process_id")?;
    auth_user.require(ALL_ROLES)?;
    let scope = VisibilityScope::resolve(&state.db, &auth_user).await?;
    let (companies, managements) = scope.bind_arrays();

    let process = sqlx::query_as::<_, Process>(
        r#"
        SELECT p.* FROM process p
        LEFT JOIN management m ON m.id = p.management_id
        WHERE p.id = $1
          AND ($2::int[] IS NULL OR m.company_id = ANY($2))
          AND ($3::int[] IS NULL OR p.management_id = ANY($3))
        "#,
    )
    .bind(process_id)
    .bind(companies)
    .bind(managements)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::not_found("Process", process_id))?;

    let rows = sqlx::query_as::<_, PipelineRow>(
        r#"
        SELECT cp.candidate_id, ca.name, ca.phone, ca.email, ca.address,
               cp.match_percent, cp.stage
        FROM candidate_process cp
        LEFT JOIN candidates ca ON ca.id = cp.candidate_id
        WHERE cp.process_id = $1
        ORDER BY cp.id
        "#,
    )
    .bind(process_id)
    .fetch_all(&state.db)
    .await?;

    let candidates = rows
        .into_iter()
        .map(|row| PipelineCandidate {
            id: row.candidate_id,
            name: row.name,
            phone: row.phone,
            email: row.email,
            address: row.address,
            match_percent: row.match_percent.unwrap_or(0),
            stage: row.stage,
        })
        .collect();

    Ok(Json(PipelineView {
        id: process.id,
        name: process.job_offer,
        start_at: process.opened_at.map(|at| at.date_naive()),
        end_at: process.closed_at.map(|at| at.date_naive()),
        pre_filtered: u8::from(process.pre_filtered),
        candidates,
        state: process.status.unwrap_or_else(|| STATUS_PENDING.to_string()),
    }))
}

/// Stage dispatcher: `edit`, `disqualify`, `back-interview` or `select`.
pub async fn dispatch_stage_action(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(process_id): Path<String>,
    AppJson(payload): AppJson<StageRequest>,
) -> AppResult<Json<StageOutcome>> {
    let process_id = parse_id(&process_id, "process_id")?;
    let command = StageCommand::parse(payload)?;
    auth_user.require(ALL_ROLES)?;
    VisibilityScope::resolve(&state.db, &auth_user)
        .await?
        .ensure_process_visible(&state.db, process_id)
        .await?;

    let outcome = PipelineService::new(state.db.clone())
        .apply(process_id, command, auth_user.user_id)
        .await?;

    Ok(Json(outcome))
}

pub async fn delete_process_candidates(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(process_id): Path<String>,
) -> AppResult<Json<Value>> {
    let process_id = parse_id(&process_id, "process_id")?;
    auth_user.require(STAFF)?;

    let removed = sqlx::query("DELETE FROM candidate_process WHERE process_id = $1")
        .bind(process_id)
        .execute(&state.db)
        .await?
        .rows_affected();

    LOGGER.log_business_event(
        "process_candidates_removed",
        Some(auth_user.user_id),
        event_fields([
            ("process_id", process_id.into()),
            ("removed", removed.into()),
        ]),
    );

    Ok(Json(json!({
        "message": "Candidate-process associations deleted",
        "removed": removed
    })))
}
