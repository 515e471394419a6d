use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    middleware::auth::{AuthUser, STAFF},
    models::{
        candidate_management::{
            engagement_status, CandidateManagement, CandidateManagementDetail,
            CandidateManagementListQuery, CreateCandidateManagementRequest, ProfessionalRow,
            UpdateCandidateManagementRequest,
        },
        post_sales::PostSalesActivity,
    },
    services::scope::VisibilityScope,
    utils::{
        errors::{AppError, AppResult},
        extract::{AppJson, AppQuery},
        ids::parse_id,
        logger::{event_fields, LOGGER},
        pagination::{resolve_page, Paginated},
    },
    AppState,
};

// $1 company, $2 status, $3 company scope, $4 management scope
const ENGAGEMENT_FILTER: &str = r#"
    FROM candidate_management cm
    JOIN candidates ca ON ca.id = cm.candidate_id
    JOIN management m ON m.id = cm.management_id
    WHERE ($1::int IS NULL OR m.company_id = $1)
      AND ($2::text IS NULL OR cm.status ILIKE $2)
      AND ($3::int[] IS NULL OR m.company_id = ANY($3))
      AND ($4::int[] IS NULL OR cm.management_id = ANY($4))
"#;

pub async fn list_candidate_managements(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppQuery(params): AppQuery<CandidateManagementListQuery>,
) -> AppResult<Json<Paginated<ProfessionalRow>>> {
    let page = resolve_page(params.page)?;
    let scope = VisibilityScope::resolve(&state.db, &auth_user).await?;
    let (companies, managements) = scope.bind_arrays();
    let status = params.status.filter(|s| !s.is_empty());

    let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) {ENGAGEMENT_FILTER}"))
        .bind(params.company_id)
        .bind(&status)
        .bind(&companies)
        .bind(&managements)
        .fetch_one(&state.db)
        .await?;

    let batch = sqlx::query_as::<_, ProfessionalRow>(&format!(
        r#"
        SELECT cm.id, cm.candidate_id, ca.name, cm.position, m.name AS management_name,
               m.company_id, cm.start_date, cm.end_date, cm.status, cm.rate
        {ENGAGEMENT_FILTER}
        ORDER BY cm.start_date DESC NULLS LAST, cm.id DESC
        LIMIT $5 OFFSET $6
        "#
    ))
    .bind(params.company_id)
    .bind(&status)
    .bind(&companies)
    .bind(&managements)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(Paginated { total, batch }))
}

pub async fn get_candidate_management(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<CandidateManagementDetail>> {
    let id = parse_id(&id, "id")?;
    let scope = VisibilityScope::resolve(&state.db, &auth_user).await?;
    let (companies, managements) = scope.bind_arrays();

    let (candidate_name, candidate_email) = sqlx::query_as::<_, (String, Option<String>)>(
        &format!("SELECT ca.name, ca.email {ENGAGEMENT_FILTER} AND cm.id = $5"),
    )
    .bind(None::<i32>)
    .bind(None::<String>)
    .bind(companies)
    .bind(managements)
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::not_found("Candidate management", id))?;

    let record =
        sqlx::query_as::<_, CandidateManagement>("SELECT * FROM candidate_management WHERE id = $1")
            .bind(id)
            .fetch_one(&state.db)
            .await?;

    let post_sales_activities = sqlx::query_as::<_, PostSalesActivity>(
        r#"
        SELECT * FROM post_sales_activities
        WHERE candidate_management_id = $1
        ORDER BY date DESC NULLS LAST, id DESC
        "#,
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(CandidateManagementDetail {
        record,
        candidate_name,
        candidate_email,
        post_sales_activities,
    }))
}

pub async fn create_candidate_management(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppJson(payload): AppJson<CreateCandidateManagementRequest>,
) -> AppResult<(StatusCode, Json<CandidateManagement>)> {
    auth_user.require(STAFF)?;
    payload.validate()?;

    let status = payload
        .status
        .clone()
        .unwrap_or_else(|| engagement_status(payload.end_date, Utc::now().date_naive()).to_string());

    let record = sqlx::query_as::<_, CandidateManagement>(
        r#"
        INSERT INTO candidate_management
            (candidate_id, management_id, status, start_date, end_date, position, rate)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(payload.candidate_id)
    .bind(payload.management_id)
    .bind(&status)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(&payload.position)
    .bind(payload.rate)
    .fetch_one(&state.db)
    .await?;

    LOGGER.log_business_event(
        "candidate_management_created",
        Some(auth_user.user_id),
        event_fields([
            ("candidate_management_id", record.id.into()),
            ("candidate_id", record.candidate_id.into()),
            ("status", status.into()),
        ]),
    );

    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn update_candidate_management(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<UpdateCandidateManagementRequest>,
) -> AppResult<Json<CandidateManagement>> {
    auth_user.require(STAFF)?;
    let id = parse_id(&id, "id")?;

    // An explicit end date without an explicit status re-derives the status.
    let status = payload.status.clone().or_else(|| {
        payload
            .end_date
            .map(|end| engagement_status(Some(end), Utc::now().date_naive()).to_string())
    });

    let record = sqlx::query_as::<_, CandidateManagement>(
        r#"
        UPDATE candidate_management
        SET management_id = COALESCE($2, management_id),
            status = COALESCE($3, status),
            start_date = COALESCE($4, start_date),
            end_date = COALESCE($5, end_date),
            position = COALESCE($6, position),
            rate = COALESCE($7, rate),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.management_id)
    .bind(&status)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(&payload.position)
    .bind(payload.rate)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::not_found("Candidate management", id))?;

    Ok(Json(record))
}

pub async fn delete_candidate_management(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    auth_user.require(STAFF)?;
    let id = parse_id(&id, "id")?;

    let result = sqlx::query("DELETE FROM candidate_management WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Candidate management", id));
    }

    Ok(Json(json!({ "message": "Candidate management deleted" })))
}
