use sqlx::PgPool;

use crate::{middleware::auth::AuthUser, models::user::UserRole, utils::errors::AppError};

/// Which companies or managements a caller may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibilityScope {
    Unrestricted,
    Companies(Vec<i32>),
    Managements(Vec<i32>),
}

impl VisibilityScope {
    pub async fn resolve(pool: &PgPool, user: &AuthUser) -> Result<Self, AppError> {
        match user.role {
            UserRole::Admin | UserRole::Internal => Ok(VisibilityScope::Unrestricted),
            UserRole::ClientManager => {
                let ids = sqlx::query_scalar::<_, i32>(
                    "SELECT company_id FROM users_company WHERE user_id = $1",
                )
                .bind(user.user_id)
                .fetch_all(pool)
                .await?;
                Ok(VisibilityScope::Companies(ids))
            }
            UserRole::Client => {
                let ids = sqlx::query_scalar::<_, i32>(
                    "SELECT management_id FROM users_management WHERE user_id = $1",
                )
                .bind(user.user_id)
                .fetch_all(pool)
                .await?;
                Ok(VisibilityScope::Managements(ids))
            }
        }
    }

    /// `(company_ids, management_ids)` for `($n::int[] IS NULL OR x = ANY($n))` filters.
    pub fn bind_arrays(&self) -> (Option<Vec<i32>>, Option<Vec<i32>>) {
        match self {
            VisibilityScope::Unrestricted => (None, None),
            VisibilityScope::Companies(ids) => (Some(ids.clone()), None),
            VisibilityScope::Managements(ids) => (None, Some(ids.clone())),
        }
    }

    /// `NotFound` unless the process exists and falls inside this scope.
    pub async fn ensure_process_visible(
        &self,
        pool: &PgPool,
        process_id: i32,
    ) -> Result<(), AppError> {
        let (companies, managements) = self.bind_arrays();
        sqlx::query_scalar::<_, i32>(
            r#"
            SELECT p.id FROM process p
            LEFT JOIN management m ON m.id = p.management_id
            WHERE p.id = $1
              AND ($2::int[] IS NULL OR m.company_id = ANY($2))
              AND ($3::int[] IS NULL OR p.management_id = ANY($3))
            "#,
        )
        .bind(process_id)
        .bind(companies)
        .bind(managements)
        .fetch_optional(pool)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::not_found("Process", process_id))
    }

    pub fn allows_company(&self, company_id: i32) -> bool {
        match self {
            VisibilityScope::Unrestricted => true,
            VisibilityScope::Companies(ids) => ids.contains(&company_id),
            VisibilityScope::Managements(_) => false,
        }
    }
}
