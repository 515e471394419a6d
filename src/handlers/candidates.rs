use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::types::Json as SqlJson;
use validator::Validate;

use crate::{
    middleware::auth::{AuthUser, ALL_ROLES, STAFF},
    models::{
        candidate::{
            Candidate, CandidateDetail, CandidateListQuery, CheckCandidateRequest,
            CheckCandidateResponse, CreateCandidateRequest, CreatedCandidate,
            UpdateCandidateRequest,
        },
        candidate_management::{engagement_status, CandidateManagement},
        candidate_process::CandidateProcess,
    },
    services::scope::VisibilityScope,
    utils::{
        errors::{AppError, AppResult},
        extract::{AppJson, AppQuery},
        ids::{id_from_json, parse_id},
        logger::{event_fields, LOGGER},
        pagination::{resolve_page, Paginated},
    },
    AppState,
};

pub async fn list_candidates(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppQuery(params): AppQuery<CandidateListQuery>,
) -> AppResult<Json<Paginated<Candidate>>> {
    let page = resolve_page(params.page)?;
    auth_user.require(STAFF)?;
    let query = params.query.filter(|q| !q.is_empty());

    let total = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM candidates
        WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%' OR email ILIKE '%' || $1 || '%')
        "#,
    )
    .bind(&query)
    .fetch_one(&state.db)
    .await?;

    let batch = sqlx::query_as::<_, Candidate>(
        r#"
        SELECT * FROM candidates
        WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%' OR email ILIKE '%' || $1 || '%')
        ORDER BY id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(&query)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(Paginated { total, batch }))
}

/// Profile plus the candidate's first process association.
pub async fn get_candidate(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<CandidateDetail>> {
    let id = parse_id(&id, "id")?;
    auth_user.require(ALL_ROLES)?;
    let scope = VisibilityScope::resolve(&state.db, &auth_user).await?;
    let (companies, managements) = scope.bind_arrays();

    let candidate = sqlx::query_as::<_, Candidate>("SELECT * FROM candidates WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("Candidate", id))?;

    let association = sqlx::query_as::<_, CandidateProcess>(
        r#"
        SELECT cp.* FROM candidate_process cp
        JOIN process p ON p.id = cp.process_id
        LEFT JOIN management m ON m.id = p.management_id
        WHERE cp.candidate_id = $1
          AND ($2::int[] IS NULL OR m.company_id = ANY($2))
          AND ($3::int[] IS NULL OR p.management_id = ANY($3))
        ORDER BY cp.id
        LIMIT 1
        "#,
    )
    .bind(id)
    .bind(&companies)
    .bind(&managements)
    .fetch_optional(&state.db)
    .await?;

    if association.is_none() && scope != VisibilityScope::Unrestricted {
        return Err(AppError::not_found("Candidate", id));
    }

    Ok(Json(CandidateDetail::new(candidate, association)))
}

/// Creates the candidate and any requested process/management links atomically.
pub async fn create_candidate(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppJson(payload): AppJson<CreateCandidateRequest>,
) -> AppResult<(StatusCode, Json<CreatedCandidate>)> {
    auth_user.require(STAFF)?;
    payload.validate()?;

    if payload.email.is_some() || payload.phone.is_some() {
        let duplicate = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT id FROM candidates
            WHERE ($1::text IS NOT NULL AND email = $1)
               OR ($2::text IS NOT NULL AND phone = $2)
            LIMIT 1
            "#,
        )
        .bind(&payload.email)
        .bind(&payload.phone)
        .fetch_optional(&state.db)
        .await?;

        if duplicate.is_some() {
            return Err(AppError::Conflict(
                "A candidate with the same email or phone already exists".to_string(),
            ));
        }
    }

    let mut tx = state.db.begin().await?;

    let candidate = sqlx::query_as::<_, Candidate>(
        r#"
        INSERT INTO candidates (name, email, phone, address, jsongpt_text, total_experience)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(&payload.phone)
    .bind(&payload.address)
    .bind(&payload.jsongpt_text)
    .bind(&payload.total_experience)
    .fetch_one(&mut *tx)
    .await?;

    let candidate_process = match payload.process_id {
        Some(process_id) => Some(
            sqlx::query_as::<_, CandidateProcess>(
                r#"
                INSERT INTO candidate_process
                    (candidate_id, process_id, technical_skills, soft_skills, client_comments,
                     match_percent, interview_questions, stage)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING *
                "#,
            )
            .bind(candidate.id)
            .bind(process_id)
            .bind(&payload.technical_skills)
            .bind(&payload.soft_skills)
            .bind(payload.client_comments.clone().map(SqlJson))
            .bind(payload.match_percent)
            .bind(&payload.interview_questions)
            .bind(payload.stage.unwrap_or_default())
            .fetch_one(&mut *tx)
            .await?,
        ),
        None => None,
    };

    let candidate_management = match payload.management_id {
        Some(management_id) => Some(
            sqlx::query_as::<_, CandidateManagement>(
                r#"
                INSERT INTO candidate_management
                    (candidate_id, management_id, status, start_date, end_date, position, rate)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
                "#,
            )
            .bind(candidate.id)
            .bind(management_id)
            .bind(engagement_status(payload.end_date, Utc::now().date_naive()))
            .bind(payload.start_date)
            .bind(payload.end_date)
            .bind(&payload.position)
            .bind(payload.rate)
            .fetch_one(&mut *tx)
            .await?,
        ),
        None => None,
    };

    tx.commit().await?;

    LOGGER.log_business_event(
        "candidate_created",
        Some(auth_user.user_id),
        event_fields([
            ("candidate_id", candidate.id.into()),
            ("process_id", payload.process_id.into()),
            ("management_id", payload.management_id.into()),
        ]),
    );

    Ok((
        StatusCode::CREATED,
        Json(CreatedCandidate {
            candidate,
            candidate_process,
            candidate_management,
        }),
    ))
}

pub async fn update_candidate(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<UpdateCandidateRequest>,
) -> AppResult<Json<Candidate>> {
    auth_user.require(STAFF)?;
    let id = parse_id(&id, "id")?;
    payload.validate()?;

    let candidate = sqlx::query_as::<_, Candidate>(
        r#"
        UPDATE candidates
        SET name = COALESCE($2, name),
            email = COALESCE($3, email),
            phone = COALESCE($4, phone),
            address = COALESCE($5, address),
            jsongpt_text = COALESCE($6, jsongpt_text),
            total_experience = COALESCE($7, total_experience),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(&payload.phone)
    .bind(&payload.address)
    .bind(&payload.jsongpt_text)
    .bind(&payload.total_experience)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::not_found("Candidate", id))?;

    Ok(Json(candidate))
}

pub async fn delete_candidate(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    auth_user.require(STAFF)?;
    let id = parse_id(&id, "id")?;

    let result = sqlx::query("DELETE FROM candidates WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Candidate", id));
    }

    LOGGER.log_business_event(
        "candidate_deleted",
        Some(auth_user.user_id),
        event_fields([("candidate_id", id.into())]),
    );

    Ok(Json(json!({ "message": "Candidate deleted" })))
}

/// Whether a candidate with this email or phone is already in the process.
pub async fn check_candidate(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppJson(payload): AppJson<CheckCandidateRequest>,
) -> AppResult<Json<CheckCandidateResponse>> {
    auth_user.require(ALL_ROLES)?;
    let process_id = id_from_json(payload.process_id.as_ref(), "processId")?;
    VisibilityScope::resolve(&state.db, &auth_user)
        .await?
        .ensure_process_visible(&state.db, process_id)
        .await?;
    let email = payload.email.filter(|e| !e.is_empty());
    let phone = payload.phone.filter(|p| !p.is_empty());

    if email.is_none() && phone.is_none() {
        return Err(AppError::BadRequest(
            "Either 'email' or 'phone' is required".to_string(),
        ));
    }

    let existing = sqlx::query_scalar::<_, i32>(
        r#"
        SELECT cp.id FROM candidate_process cp
        JOIN candidates ca ON ca.id = cp.candidate_id
        WHERE cp.process_id = $1
          AND (($2::text IS NOT NULL AND ca.email = $2) OR ($3::text IS NOT NULL AND ca.phone = $3))
        LIMIT 1
        "#,
    )
    .bind(process_id)
    .bind(&email)
    .bind(&phone)
    .fetch_optional(&state.db)
    .await?;

    let response = match existing {
        Some(_) => CheckCandidateResponse {
            exists: true,
            message: "The candidate is already associated with the process".to_string(),
        },
        None => CheckCandidateResponse {
            exists: false,
            message: "The candidate is not associated with the process".to_string(),
        },
    };

    Ok(Json(response))
}
