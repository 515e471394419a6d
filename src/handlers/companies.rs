use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    middleware::auth::{AuthUser, STAFF},
    models::{
        company::{Company, CompanyListQuery, CreateCompanyRequest, UpdateCompanyRequest},
        management::Management,
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

const COMPANY_SCOPE: &str = r#"
    ($1::text IS NULL OR c.name ILIKE '%' || $1 || '%')
    AND ($2::int[] IS NULL OR c.id = ANY($2))
    AND ($3::int[] IS NULL OR c.id IN (SELECT company_id FROM management WHERE id = ANY($3)))
"#;

pub async fn list_companies(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppQuery(params): AppQuery<CompanyListQuery>,
) -> AppResult<Json<Paginated<Company>>> {
    let page = resolve_page(params.page)?;
    let scope = VisibilityScope::resolve(&state.db, &auth_user).await?;
    let (companies, managements) = scope.bind_arrays();

    let total = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM company c WHERE {COMPANY_SCOPE}"
    ))
    .bind(&params.query)
    .bind(&companies)
    .bind(&managements)
    .fetch_one(&state.db)
    .await?;

    let batch = sqlx::query_as::<_, Company>(&format!(
        "SELECT c.* FROM company c WHERE {COMPANY_SCOPE} ORDER BY c.id LIMIT $4 OFFSET $5"
    ))
    .bind(&params.query)
    .bind(&companies)
    .bind(&managements)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(Paginated { total, batch }))
}

/// Alphabetically first visible company, or `null` when there is none.
pub async fn get_first_company(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Option<Company>>> {
    let scope = VisibilityScope::resolve(&state.db, &auth_user).await?;
    let (companies, managements) = scope.bind_arrays();

    let company = sqlx::query_as::<_, Company>(&format!(
        "SELECT c.* FROM company c WHERE {COMPANY_SCOPE} ORDER BY c.name ASC, c.id ASC LIMIT 1"
    ))
    .bind(None::<String>)
    .bind(companies)
    .bind(managements)
    .fetch_optional(&state.db)
    .await?;

    Ok(Json(company))
}

pub async fn get_company(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Company>> {
    let id = parse_id(&id, "id")?;
    let scope = VisibilityScope::resolve(&state.db, &auth_user).await?;
    let (companies, managements) = scope.bind_arrays();

    let company = sqlx::query_as::<_, Company>(&format!(
        "SELECT c.* FROM company c WHERE c.id = $4 AND {COMPANY_SCOPE}"
    ))
    .bind(None::<String>)
    .bind(companies)
    .bind(managements)
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::not_found("Company", id))?;

    Ok(Json(company))
}

pub async fn get_company_managements(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Management>>> {
    let id = parse_id(&id, "id")?;
    let scope = VisibilityScope::resolve(&state.db, &auth_user).await?;
    let (_, managements) = scope.bind_arrays();
    if !matches!(scope, VisibilityScope::Managements(_)) && !scope.allows_company(id) {
        return Err(AppError::not_found("Company", id));
    }

    let rows = sqlx::query_as::<_, Management>(
        r#"
        SELECT * FROM management
        WHERE company_id = $1 AND ($2::int[] IS NULL OR id = ANY($2))
        ORDER BY name
        "#,
    )
    .bind(id)
    .bind(managements)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rows))
}

pub async fn create_company(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppJson(payload): AppJson<CreateCompanyRequest>,
) -> AppResult<(StatusCode, Json<Company>)> {
    auth_user.require(STAFF)?;
    payload.validate()?;

    let company = sqlx::query_as::<_, Company>(
        r#"
        INSERT INTO company (name, description, logo)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(&payload.logo)
    .fetch_one(&state.db)
    .await?;

    LOGGER.log_business_event(
        "company_created",
        Some(auth_user.user_id),
        event_fields([("company_id", company.id.into())]),
    );

    Ok((StatusCode::CREATED, Json(company)))
}

pub async fn update_company(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<UpdateCompanyRequest>,
) -> AppResult<Json<Company>> {
    auth_user.require(STAFF)?;
    let id = parse_id(&id, "id")?;
    payload.validate()?;

    let company = sqlx::query_as::<_, Company>(
        r#"
        UPDATE company
        SET name = COALESCE($2, name),
            description = COALESCE($3, description),
            logo = COALESCE($4, logo),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(&payload.logo)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::not_found("Company", id))?;

    Ok(Json(company))
}

pub async fn delete_company(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    auth_user.require(STAFF)?;
    let id = parse_id(&id, "id")?;

    let result = sqlx::query("DELETE FROM company WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Company", id));
    }

    LOGGER.log_business_event(
        "company_deleted",
        Some(auth_user.user_id),
        event_fields([("company_id", id.into())]),
    );

    Ok(Json(json!({ "message": "Company deleted" })))
}
