use axum::{
    extract::{Extension, State},
    response::Json,
};

use crate::{
    middleware::auth::AuthUser,
    services::{
        dashboard::{DashboardQuery, DashboardService, DashboardStats},
        scope::VisibilityScope,
    },
    utils::{errors::AppResult, extract::AppQuery},
    AppState,
};

pub async fn get_stats(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppQuery(query): AppQuery<DashboardQuery>,
) -> AppResult<Json<DashboardStats>> {
    let scope = VisibilityScope::resolve(&state.db, &auth_user).await?;

    let stats = DashboardService::new(state.db.clone())
        .stats(&query, &scope, auth_user.user_id)
        .await?;

    Ok(Json(stats))
}
