use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    middleware::auth::{AuthUser, STAFF},
    models::management::{
        CreateManagementRequest, Management, ManagementListQuery, UpdateManagementRequest,
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

const MANAGEMENT_SCOPE: &str = r#"
    ($1::int IS NULL OR m.company_id = $1)
    AND ($2::int[] IS NULL OR m.company_id = ANY($2))
    AND ($3::int[] IS NULL OR m.id = ANY($3))
"#;

pub async fn list_managements(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppQuery(params): AppQuery<ManagementListQuery>,
) -> AppResult<Json<Paginated<Management>>> {
    let page = resolve_page(params.page)?;
    let scope = VisibilityScope::resolve(&state.db, &auth_user).await?;
    let (companies, managements) = scope.bind_arrays();

    let total = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM management m WHERE {MANAGEMENT_SCOPE}"
    ))
    .bind(params.company_id)
    .bind(&companies)
    .bind(&managements)
    .fetch_one(&state.db)
    .await?;

    let batch = sqlx::query_as::<_, Management>(&format!(
        "SELECT m.* FROM management m WHERE {MANAGEMENT_SCOPE} ORDER BY m.id LIMIT $4 OFFSET $5"
    ))
    .bind(params.company_id)
    .bind(&companies)
    .bind(&managements)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(Paginated { total, batch }))
}

pub async fn get_management(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Management>> {
    let id = parse_id(&id, "id")?;
    let scope = VisibilityScope::resolve(&state.db, &auth_user).await?;
    let (companies, managements) = scope.bind_arrays();

    let management = sqlx::query_as::<_, Management>(&format!(
        "SELECT m.* FROM management m WHERE m.id = $4 AND {MANAGEMENT_SCOPE}"
    ))
    .bind(None::<i32>)
    .bind(companies)
    .bind(managements)
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::not_found("Management", id))?;

    Ok(Json(management))
}

pub async fn create_management(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppJson(payload): AppJson<CreateManagementRequest>,
) -> AppResult<(StatusCode, Json<Management>)> {
    auth_user.require(STAFF)?;
    payload.validate()?;

    let management = sqlx::query_as::<_, Management>(
        r#"
        INSERT INTO management (company_id, name, description)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(payload.company_id)
    .bind(&payload.name)
    .bind(&payload.description)
    .fetch_one(&state.db)
    .await?;

    LOGGER.log_business_event(
        "management_created",
        Some(auth_user.user_id),
        event_fields([
            ("management_id", management.id.into()),
            ("company_id", management.company_id.into()),
        ]),
    );

    Ok((StatusCode::CREATED, Json(management)))
}

pub async fn update_management(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<UpdateManagementRequest>,
) -> AppResult<Json<Management>> {
    auth_user.require(STAFF)?;
    let id = parse_id(&id, "id")?;
    payload.validate()?;

    let management = sqlx::query_as::<_, Management>(
        r#"
        UPDATE management
        SET company_id = COALESCE($2, company_id),
            name = COALESCE($3, name),
            description = COALESCE($4, description),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.company_id)
    .bind(&payload.name)
    .bind(&payload.description)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::not_found("Management", id))?;

    Ok(Json(management))
}

pub async fn delete_management(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    auth_user.require(STAFF)?;
    let id = parse_id(&id, "id")?;

    let result = sqlx::query("DELETE FROM management WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Management", id));
    }

    Ok(Json(json!({ "message": "Management deleted" })))
}
