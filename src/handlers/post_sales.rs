use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    middleware::auth::{AuthUser, ALL_ROLES, STAFF},
    models::post_sales::{
        CreatePostSalesRequest, EvaluationRecorded, PostSalesActivity, PostSalesListQuery,
    },
    services::{evaluations::EvaluationService, scope::VisibilityScope},
    utils::{
        errors::{AppError, AppResult},
        extract::{AppJson, AppQuery},
        ids::parse_id,
        pagination::{resolve_page, Paginated},
    },
    AppState,
};

// $1 engagement, $2 company scope, $3 management scope
const ACTIVITY_FILTER: &str = r#"
    FROM post_sales_activities psa
    JOIN candidate_management cm ON cm.id = psa.candidate_management_id
    JOIN management m ON m.id = cm.management_id
    WHERE ($1::int IS NULL OR psa.candidate_management_id = $1)
      AND ($2::int[] IS NULL OR m.company_id = ANY($2))
      AND ($3::int[] IS NULL OR cm.management_id = ANY($3))
"#;

pub async fn list_post_sales(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppQuery(params): AppQuery<PostSalesListQuery>,
) -> AppResult<Json<Paginated<PostSalesActivity>>> {
    let page = resolve_page(params.page)?;
    auth_user.require(ALL_ROLES)?;
    let scope = VisibilityScope::resolve(&state.db, &auth_user).await?;
    let (companies, managements) = scope.bind_arrays();

    let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) {ACTIVITY_FILTER}"))
        .bind(params.candidate_management_id)
        .bind(&companies)
        .bind(&managements)
        .fetch_one(&state.db)
        .await?;

    let batch = sqlx::query_as::<_, PostSalesActivity>(&format!(
        r#"
        SELECT psa.* {ACTIVITY_FILTER}
        ORDER BY psa.date DESC NULLS LAST, psa.id DESC
        LIMIT $4 OFFSET $5
        "#
    ))
    .bind(params.candidate_management_id)
    .bind(&companies)
    .bind(&managements)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(Paginated { total, batch }))
}

pub async fn get_post_sales(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<PostSalesActivity>> {
    let id = parse_id(&id, "id")?;
    auth_user.require(ALL_ROLES)?;
    let scope = VisibilityScope::resolve(&state.db, &auth_user).await?;
    let (companies, managements) = scope.bind_arrays();

    let activity = sqlx::query_as::<_, PostSalesActivity>(&format!(
        "SELECT psa.* {ACTIVITY_FILTER} AND psa.id = $4"
    ))
    .bind(None::<i32>)
    .bind(companies)
    .bind(managements)
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::not_found("Post-sales activity", id))?;

    Ok(Json(activity))
}

/// Records an evaluation and refreshes the engagement rate.
pub async fn create_post_sales(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppJson(payload): AppJson<CreatePostSalesRequest>,
) -> AppResult<(StatusCode, Json<EvaluationRecorded>)> {
    auth_user.require(ALL_ROLES)?;
    payload.validate()?;
    let scope = VisibilityScope::resolve(&state.db, &auth_user).await?;

    let recorded = EvaluationService::new(state.db.clone())
        .record(payload, &scope, auth_user.user_id)
        .await?;

    Ok((StatusCode::CREATED, Json(recorded)))
}

pub async fn delete_post_sales(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    auth_user.require(STAFF)?;
    let id = parse_id(&id, "id")?;

    let result = sqlx::query("DELETE FROM post_sales_activities WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Post-sales activity", id));
    }

    Ok(Json(json!({ "message": "Post-sales activity deleted" })))
}
