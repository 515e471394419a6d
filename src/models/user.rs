use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub position: Option<String>,
    pub avatar: Option<String>,
    pub is_active: bool,
    pub role_id: i32,
    pub role_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Roles seeded by the `roles` migration; ids are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Client,
    Internal,
    ClientManager,
}

impl UserRole {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "admin" => Some(UserRole::Admin),
            "client" => Some(UserRole::Client),
            "internal" => Some(UserRole::Internal),
            "client_manager" => Some(UserRole::ClientManager),
            _ => None,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            1 => Some(UserRole::Admin),
            2 => Some(UserRole::Client),
            3 => Some(UserRole::Internal),
            4 => Some(UserRole::ClientManager),
            _ => None,
        }
    }

    pub fn id(&self) -> i32 {
        match self {
            UserRole::Admin => 1,
            UserRole::Client => 2,
            UserRole::Internal => 3,
            UserRole::ClientManager => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Client => "client",
            UserRole::Internal => "internal",
            UserRole::ClientManager => "client_manager",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Role {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    pub position: Option<String>,
    pub avatar: Option<String>,
    pub role_id: i32,
    pub company_id: Option<i32>,
    pub management_id: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub position: Option<String>,
    pub is_active: Option<bool>,
    pub role_id: Option<i32>,
    pub company_id: Option<i32>,
    pub management_id: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UserCompanyRequest {
    pub user_id: Option<i32>,
    pub company_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UserManagementRequest {
    pub user_id: Option<i32>,
    pub management_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserCompany {
    pub id: i32,
    pub user_id: i32,
    pub company_id: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserManagement {
    pub id: i32,
    pub user_id: i32,
    pub management_id: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub position: Option<String>,
    pub avatar: Option<String>,
    pub is_active: bool,
    pub role_id: i32,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            position: user.position,
            avatar: user.avatar,
            is_active: user.is_active,
            role_id: user.role_id,
            role: user.role_name,
            created_at: user.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_names_and_ids_agree() {
        for role in [
            UserRole::Admin,
            UserRole::Client,
            UserRole::Internal,
            UserRole::ClientManager,
        ] {
            assert_eq!(UserRole::from_name(role.as_str()), Some(role));
            assert_eq!(UserRole::from_id(role.id()), Some(role));
        }
        assert_eq!(UserRole::from_name("superuser"), None);
    }
}
