use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    middleware::auth::{AuthUser, STAFF},
    models::{
        process::{
            CreateProcessRequest, Process, ProcessCandidate, ProcessCandidateRow, ProcessDetail,
            ProcessListQuery, ProcessSummary, ProcessSummaryRow, ProcessUpdate,
            UpdateProcessRequest, STATUS_PENDING,
        },
        user::UserRole,
    },
    services::{closure::ClosureService, scope::VisibilityScope},
    utils::{
        errors::{AppError, AppResult},
        extract::{AppJson, AppQuery},
        ids::parse_id,
        logger::{event_fields, LOGGER},
        pagination::{resolve_page, Paginated},
    },
    AppState,
};

const CLOSERS: &[UserRole] = &[UserRole::Admin, UserRole::Internal, UserRole::ClientManager];

// $1 query, $2 status, $3 company, $4 management, $5 company scope, $6 management scope
const PROCESS_FILTER: &str = r#"
    FROM process p
    LEFT JOIN management m ON m.id = p.management_id
    LEFT JOIN company c ON c.id = m.company_id
    WHERE ($1::text IS NULL OR p.job_offer ILIKE '%' || $1 || '%')
      AND ($2::text IS NULL OR p.status ILIKE $2)
      AND ($3::int IS NULL OR m.company_id = $3)
      AND ($4::int IS NULL OR p.management_id = $4)
      AND ($5::int[] IS NULL OR m.company_id = ANY($5))
      AND ($6::int[] IS NULL OR p.management_id = ANY($6))
"#;

pub async fn list_processes(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppQuery(params): AppQuery<ProcessListQuery>,
) -> AppResult<Json<Paginated<ProcessSummary>>> {
    let page = resolve_page(params.page)?;
    let scope = VisibilityScope::resolve(&state.db, &auth_user).await?;
    let (companies, managements) = scope.bind_arrays();
    let query = params.query.filter(|q| !q.is_empty());
    let status = params.status.filter(|s| !s.is_empty());

    let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) {PROCESS_FILTER}"))
        .bind(&query)
        .bind(&status)
        .bind(params.company_id)
        .bind(params.management_id)
        .bind(&companies)
        .bind(&managements)
        .fetch_one(&state.db)
        .await?;

    let sql = format!(
        r#"
        SELECT p.id, p.job_offer, p.job_offer_description, p.opened_at, p.closed_at,
               p.pre_filtered, p.status,
               m.name AS management_name,
               c.name AS company_name,
               (SELECT COUNT(*) FROM candidate_process cp WHERE cp.process_id = p.id) AS candidate_count,
               ARRAY(
                   SELECT cp.candidate_id FROM candidate_process cp
                   WHERE cp.process_id = p.id AND cp.candidate_id IS NOT NULL
                   ORDER BY cp.id
               ) AS candidate_ids
        {PROCESS_FILTER}
        ORDER BY p.opened_at DESC NULLS LAST, p.id DESC
        LIMIT $7 OFFSET $8
        "#
    );

    let rows = sqlx::query_as::<_, ProcessSummaryRow>(&sql)
        .bind(&query)
        .bind(&status)
        .bind(params.company_id)
        .bind(params.management_id)
        .bind(&companies)
        .bind(&managements)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&state.db)
        .await?;

    Ok(Json(Paginated {
        total,
        batch: rows.into_iter().map(ProcessSummary::from).collect(),
    }))
}

pub async fn count_processes(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let scope = VisibilityScope::resolve(&state.db, &auth_user).await?;
    let (companies, managements) = scope.bind_arrays();

    let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) {PROCESS_FILTER}"))
        .bind(None::<String>)
        .bind(None::<String>)
        .bind(None::<i32>)
        .bind(None::<i32>)
        .bind(companies)
        .bind(managements)
        .fetch_one(&state.db)
        .await?;

    Ok(Json(json!({ "totalProcesses": total })))
}

pub async fn get_process(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<ProcessDetail>> {
    let id = parse_id(&id, "id")?;
    let scope = VisibilityScope::resolve(&state.db, &auth_user).await?;
    let (companies, managements) = scope.bind_arrays();

    let (visible_id, company_name) = sqlx::query_as::<_, (i32, Option<String>)>(&format!(
        "SELECT p.id, c.name {PROCESS_FILTER} AND p.id = $7"
    ))
    .bind(None::<String>)
    .bind(None::<String>)
    .bind(None::<i32>)
    .bind(None::<i32>)
    .bind(companies)
    .bind(managements)
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::not_found("Process", id))?;

    let process = sqlx::query_as::<_, Process>("SELECT * FROM process WHERE id = $1")
        .bind(visible_id)
        .fetch_one(&state.db)
        .await?;

    let candidates = sqlx::query_as::<_, ProcessCandidateRow>(
        r#"
        SELECT cp.id AS candidate_process_id, cp.candidate_id,
               ca.name, ca.email, ca.phone, ca.address, ca.jsongpt_text,
               cp.match_percent, cp.stage, cp.technical_skills, cp.soft_skills,
               cp.client_comments, cp.interview_questions
        FROM candidate_process cp
        LEFT JOIN candidates ca ON ca.id = cp.candidate_id
        WHERE cp.process_id = $1
        ORDER BY cp.match_percent DESC NULLS LAST, cp.id
        "#,
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ProcessDetail {
        id: process.id,
        company_name: company_name.unwrap_or_default(),
        management_id: process.management_id,
        job_offer: process.job_offer,
        job_offer_description: process.job_offer_description,
        start_at: process.opened_at,
        end_at: process.closed_at,
        pre_filtered: process.pre_filtered,
        status: process.status.unwrap_or_else(|| STATUS_PENDING.to_string()),
        candidates: candidates.into_iter().map(ProcessCandidate::from).collect(),
    }))
}

pub async fn create_process(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppJson(payload): AppJson<CreateProcessRequest>,
) -> AppResult<(StatusCode, Json<Process>)> {
    auth_user.require(STAFF)?;
    payload.validate()?;

    let management_id = payload.management_id.ok_or_else(|| {
        AppError::BadRequest("Parameter 'management_id' is required".to_string())
    })?;

    sqlx::query_scalar::<_, i32>("SELECT id FROM management WHERE id = $1")
        .bind(management_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("Management", management_id))?;

    let process = sqlx::query_as::<_, Process>(
        r#"
        INSERT INTO process
            (job_offer, job_offer_description, management_id, opened_at, closed_at, pre_filtered, status)
        VALUES ($1, $2, $3, COALESCE($4, NOW()), $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(&payload.job_offer)
    .bind(&payload.job_offer_description)
    .bind(management_id)
    .bind(payload.opened_at)
    .bind(payload.closed_at)
    .bind(payload.pre_filtered.unwrap_or(false))
    .bind(&payload.status)
    .fetch_one(&state.db)
    .await?;

    LOGGER.log_business_event(
        "process_created",
        Some(auth_user.user_id),
        event_fields([
            ("process_id", process.id.into()),
            ("management_id", management_id.into()),
        ]),
    );

    Ok((StatusCode::CREATED, Json(process)))
}

/// `PUT /process/:id`: a field edit, or `{"action": "close"}`.
pub async fn update_process(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<UpdateProcessRequest>,
) -> AppResult<Response> {
    let id = parse_id(&id, "id")?;
    payload.validate()?;

    match ProcessUpdate::try_from(payload)? {
        ProcessUpdate::Close(options) => {
            auth_user.require(CLOSERS)?;
            let scope = VisibilityScope::resolve(&state.db, &auth_user).await?;
            let outcome = ClosureService::new(state.db.clone())
                .close(id, options, &scope, auth_user.user_id)
                .await?;
            Ok(Json(outcome).into_response())
        }
        ProcessUpdate::Edit(changes) => {
            auth_user.require(STAFF)?;
            let process = sqlx::query_as::<_, Process>(
                r#"
                UPDATE process
                SET job_offer = COALESCE($2, job_offer),
                    job_offer_description = COALESCE($3, job_offer_description),
                    opened_at = COALESCE($4, opened_at),
                    closed_at = COALESCE($5, closed_at),
                    pre_filtered = COALESCE($6, pre_filtered),
                    status = COALESCE($7, status),
                    updated_at = NOW()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(&changes.job_offer)
            .bind(&changes.job_offer_description)
            .bind(changes.opened_at)
            .bind(changes.closed_at)
            .bind(changes.pre_filtered)
            .bind(&changes.status)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| AppError::not_found("Process", id))?;

            Ok(Json(process).into_response())
        }
    }
}

pub async fn delete_process(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    auth_user.require(STAFF)?;
    let id = parse_id(&id, "id")?;

    let result = sqlx::query("DELETE FROM process WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Process", id));
    }

    LOGGER.log_business_event(
        "process_deleted",
        Some(auth_user.user_id),
        event_fields([("process_id", id.into())]),
    );

    Ok(Json(json!({ "message": "Process deleted" })))
}
