use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::Json,
};
use bcrypt::{hash, DEFAULT_COST};
use serde_json::{json, Value};
use sqlx::{Postgres, Transaction};
use validator::Validate;

use crate::{
    middleware::auth::{AuthUser, ADMIN_ONLY, STAFF},
    models::{
        company::Company,
        user::{
            CreateUserRequest, Role, UpdateUserRequest, User, UserCompany, UserCompanyRequest,
            UserManagement, UserManagementRequest, UserResponse, UserRole,
        },
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

pub const USER_SELECT: &str = r#"
    SELECT u.id, u.name, u.email, u.password_hash, u.position, u.avatar, u.is_active,
           u.role_id, r.name AS role_name, u.created_at, u.updated_at
    FROM users u
    JOIN roles r ON r.id = u.role_id
"#;

/// Link changes needed when a user's role moves between the two client roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleSwap {
    None,
    ToCompany,
    ToManagement,
}

pub fn role_swap(current: UserRole, requested: Option<UserRole>) -> RoleSwap {
    match (current, requested) {
        (UserRole::Client, Some(UserRole::ClientManager)) => RoleSwap::ToCompany,
        (UserRole::ClientManager, Some(UserRole::Client)) => RoleSwap::ToManagement,
        _ => RoleSwap::None,
    }
}

fn requested_role(role_id: Option<i32>) -> Result<Option<UserRole>, AppError> {
    role_id
        .map(|id| {
            UserRole::from_id(id)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown role_id {id}")))
        })
        .transpose()
}

async fn fetch_user(tx: &mut Transaction<'_, Postgres>, id: i32) -> Result<User, AppError> {
    sqlx::query_as::<_, User>(&format!("{USER_SELECT} WHERE u.id = $1"))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::not_found("User", id))
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppQuery(params): AppQuery<PageParams>,
) -> AppResult<Json<Paginated<UserResponse>>> {
    let page = params.resolve()?;
    auth_user.require(ADMIN_ONLY)?;

    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(&state.db)
        .await?;

    let users = sqlx::query_as::<_, User>(&format!(
        "{USER_SELECT} ORDER BY u.id LIMIT $1 OFFSET $2"
    ))
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(Paginated {
        total,
        batch: users.into_iter().map(UserResponse::from).collect(),
    }))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<UserResponse>> {
    let id = parse_id(&id, "id")?;
    if auth_user.user_id != id {
        auth_user.require(ADMIN_ONLY)?;
    }

    let user = sqlx::query_as::<_, User>(&format!("{USER_SELECT} WHERE u.id = $1"))
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("User", id))?;

    Ok(Json(UserResponse::from(user)))
}

pub async fn get_user_by_email(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(email): Path<String>,
) -> AppResult<Json<UserResponse>> {
    if !auth_user.email.eq_ignore_ascii_case(&email) {
        auth_user.require(ADMIN_ONLY)?;
    }

    let user = sqlx::query_as::<_, User>(&format!("{USER_SELECT} WHERE LOWER(u.email) = LOWER($1)"))
        .bind(&email)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with email {email} not found")))?;

    Ok(Json(UserResponse::from(user)))
}

pub async fn get_user_companies(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Company>>> {
    let id = parse_id(&id, "id")?;
    if auth_user.user_id != id {
        auth_user.require(STAFF)?;
    }

    let companies = sqlx::query_as::<_, Company>(
        r#"
        SELECT c.* FROM company c
        JOIN users_company uc ON uc.company_id = c.id
        WHERE uc.user_id = $1
        ORDER BY c.name
        "#,
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(companies))
}

pub async fn get_management_users(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(management_id): Path<String>,
) -> AppResult<Json<Vec<UserResponse>>> {
    let management_id = parse_id(&management_id, "management_id")?;
    auth_user.require(STAFF)?;

    let users = sqlx::query_as::<_, User>(&format!(
        "{USER_SELECT} JOIN users_management um ON um.user_id = u.id WHERE um.management_id = $1 ORDER BY u.name"
    ))
    .bind(management_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// Creates the user and its company or management link in one transaction.
pub async fn create_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppJson(payload): AppJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    auth_user.require(ADMIN_ONLY)?;
    payload.validate()?;
    requested_role(Some(payload.role_id))?;

    let password_hash = hash(&payload.password, DEFAULT_COST)
        .map_err(|_| AppError::InternalServerError("Failed to hash password".to_string()))?;

    let mut tx = state.db.begin().await?;

    let user_id = sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO users (name, email, password_hash, position, avatar, role_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(&password_hash)
    .bind(&payload.position)
    .bind(&payload.avatar)
    .bind(payload.role_id)
    .fetch_one(&mut *tx)
    .await?;

    if let Some(company_id) = payload.company_id {
        sqlx::query("INSERT INTO users_company (user_id, company_id) VALUES ($1, $2)")
            .bind(user_id)
            .bind(company_id)
            .execute(&mut *tx)
            .await?;
    }
    if let Some(management_id) = payload.management_id {
        sqlx::query("INSERT INTO users_management (user_id, management_id) VALUES ($1, $2)")
            .bind(user_id)
            .bind(management_id)
            .execute(&mut *tx)
            .await?;
    }

    let user = fetch_user(&mut tx, user_id).await?;
    tx.commit().await?;

    LOGGER.log_business_event(
        "user_created",
        Some(auth_user.user_id),
        event_fields([
            ("created_user_id", user_id.into()),
            ("role", user.role_name.clone().into()),
        ]),
    );

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<UpdateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    auth_user.require(ADMIN_ONLY)?;
    let id = parse_id(&id, "id")?;
    payload.validate()?;
    let requested = requested_role(payload.role_id)?;

    let mut tx = state.db.begin().await?;
    let current = fetch_user(&mut tx, id).await?;
    let current_role = UserRole::from_id(current.role_id).ok_or_else(|| {
        AppError::InternalServerError(format!("User {id} has unknown role {}", current.role_id))
    })?;

    match role_swap(current_role, requested) {
        RoleSwap::ToCompany => {
            sqlx::query("DELETE FROM users_management WHERE user_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            if let Some(company_id) = payload.company_id {
                sqlx::query("INSERT INTO users_company (user_id, company_id) VALUES ($1, $2)")
                    .bind(id)
                    .bind(company_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        RoleSwap::ToManagement => {
            sqlx::query("DELETE FROM users_company WHERE user_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            if let Some(management_id) = payload.management_id {
                sqlx::query(
                    "INSERT INTO users_management (user_id, management_id) VALUES ($1, $2)",
                )
                .bind(id)
                .bind(management_id)
                .execute(&mut *tx)
                .await?;
            }
        }
        RoleSwap::None => {}
    }

    sqlx::query(
        r#"
        UPDATE users
        SET name = COALESCE($2, name),
            email = COALESCE($3, email),
            position = COALESCE($4, position),
            is_active = COALESCE($5, is_active),
            role_id = COALESCE($6, role_id),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(&payload.position)
    .bind(payload.is_active)
    .bind(payload.role_id)
    .execute(&mut *tx)
    .await?;

    let user = fetch_user(&mut tx, id).await?;
    tx.commit().await?;

    Ok(Json(UserResponse::from(user)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    auth_user.require(ADMIN_ONLY)?;
    let id = parse_id(&id, "id")?;

    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("User", id));
    }

    Ok(Json(json!({ "message": "User deleted" })))
}

pub async fn create_user_company(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppJson(payload): AppJson<UserCompanyRequest>,
) -> AppResult<(StatusCode, Json<UserCompany>)> {
    auth_user.require(STAFF)?;
    let (user_id, company_id) = match (payload.user_id, payload.company_id) {
        (Some(user_id), Some(company_id)) => (user_id, company_id),
        _ => {
            return Err(AppError::BadRequest(
                "Parameters 'user_id' and 'company_id' are required".to_string(),
            ))
        }
    };

    let link = sqlx::query_as::<_, UserCompany>(
        "INSERT INTO users_company (user_id, company_id) VALUES ($1, $2) RETURNING *",
    )
    .bind(user_id)
    .bind(company_id)
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(link)))
}

pub async fn create_user_management(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppJson(payload): AppJson<UserManagementRequest>,
) -> AppResult<(StatusCode, Json<UserManagement>)> {
    auth_user.require(STAFF)?;
    let (user_id, management_id) = match (payload.user_id, payload.management_id) {
        (Some(user_id), Some(management_id)) => (user_id, management_id),
        _ => {
            return Err(AppError::BadRequest(
                "Parameters 'user_id' and 'management_id' are required".to_string(),
            ))
        }
    };

    let link = sqlx::query_as::<_, UserManagement>(
        "INSERT INTO users_management (user_id, management_id) VALUES ($1, $2) RETURNING *",
    )
    .bind(user_id)
    .bind(management_id)
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(link)))
}

pub async fn list_user_managements(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Vec<UserManagement>>> {
    auth_user.require(STAFF)?;

    let links = sqlx::query_as::<_, UserManagement>("SELECT * FROM users_management ORDER BY id")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(links))
}

pub async fn delete_user_management(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    auth_user.require(STAFF)?;
    let id = parse_id(&id, "id")?;

    let result = sqlx::query("DELETE FROM users_management WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("User-management link", id));
    }

    Ok(Json(json!({ "message": "User-management link deleted" })))
}

pub async fn list_roles(State(state): State<AppState>) -> AppResult<Json<Vec<Role>>> {
    let roles = sqlx::query_as::<_, Role>("SELECT id, name FROM roles ORDER BY id")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(roles))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_to_client_manager_moves_link_to_company() {
        assert_eq!(
            role_swap(UserRole::Client, Some(UserRole::ClientManager)),
            RoleSwap::ToCompany
        );
        assert_eq!(
            role_swap(UserRole::ClientManager, Some(UserRole::Client)),
            RoleSwap::ToManagement
        );
    }

    #[test]
    fn other_role_changes_keep_links() {
        assert_eq!(role_swap(UserRole::Client, None), RoleSwap::None);
        assert_eq!(role_swap(UserRole::Client, Some(UserRole::Client)), RoleSwap::None);
        assert_eq!(role_swap(UserRole::Admin, Some(UserRole::Client)), RoleSwap::None);
    }

    #[test]
    fn unknown_role_id_is_rejected() {
        assert!(matches!(requested_role(Some(9)), Err(AppError::BadRequest(_))));
        assert_eq!(requested_role(Some(4)).unwrap(), Some(UserRole::ClientManager));
        assert_eq!(requested_role(None).unwrap(), None);
    }
}
