use axum::{extract::State, response::Json};
use bcrypt::verify;
use validator::Validate;

use crate::{
    handlers::users::USER_SELECT,
    models::user::{LoginRequest, LoginResponse, User, UserResponse},
    utils::{
        errors::AppError,
        extract::AppJson,
        jwt::create_jwt,
        logger::{event_fields, LOGGER},
    },
    AppState,
};

pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    payload.validate()?;

    let user = sqlx::query_as::<_, User>(&format!("{USER_SELECT} WHERE u.email = $1"))
        .bind(&payload.email)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password".to_string()))?;

    let is_valid = verify(&payload.password, &user.password_hash)
        .map_err(|_| AppError::InternalServerError("Failed to verify password".to_string()))?;

    if !is_valid || !user.is_active {
        return Err(AppError::Unauthorized("Invalid email or password".to_string()));
    }

    let token = create_jwt(
        user.id,
        &user.name,
        &user.email,
        &user.role_name,
        &state.config.jwt_secret,
    )
    .map_err(|_| AppError::InternalServerError("Failed to create token".to_string()))?;

    LOGGER.log_business_event(
        "user_logged_in",
        Some(user.id),
        event_fields([("role", user.role_name.clone().into())]),
    );

    Ok(Json(LoginResponse {
        token,
        user: UserResponse::from(user),
    }))
}
