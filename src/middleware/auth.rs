use crate::{
    models::user::UserRole,
    utils::{errors::AppError, jwt::verify_jwt},
    AppState,
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// Caller identity decoded from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i32,
    pub email: String,
    pub role: UserRole,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        matches!(self.role, UserRole::Admin)
    }

    pub fn is_staff(&self) -> bool {
        matches!(self.role, UserRole::Admin | UserRole::Internal)
    }

    /// Rejects the request unless the caller's role is in `allowed`.
    pub fn require(&self, allowed: &[UserRole]) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Access denied: insufficient permissions".to_string(),
            ))
        }
    }
}

pub const ALL_ROLES: &[UserRole] = &[
    UserRole::Admin,
    UserRole::Internal,
    UserRole::Client,
    UserRole::ClientManager,
];
pub const STAFF: &[UserRole] = &[UserRole::Admin, UserRole::Internal];
pub const ADMIN_ONLY: &[UserRole] = &[UserRole::Admin];

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|header| header.to_str().ok())
        .ok_or_else(|| AppError::Forbidden("Token not provided".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Forbidden("Token not provided".to_string()))?;

    let claims = verify_jwt(token, &state.config.jwt_secret).map_err(|e| {
        tracing::debug!(error = %e, "Rejected bearer token");
        AppError::Forbidden("Failed to authenticate token".to_string())
    })?;

    let role = UserRole::from_name(&claims.role)
        .ok_or_else(|| AppError::Forbidden("Role not found in token".to_string()))?;

    let auth_user = AuthUser {
        user_id: claims.sub,
        email: claims.email,
        role,
    };

    request.extensions_mut().insert(auth_user);
    Ok(next.run(request).await)
}
