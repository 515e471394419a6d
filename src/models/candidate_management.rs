use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::post_sales::PostSalesActivity;

pub const STATUS_ACTIVE: &str = "activo";
pub const STATUS_RELEASED: &str = "desvinculado";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CandidateManagement {
    pub id: i32,
    pub candidate_id: i32,
    pub management_id: i32,
    pub status: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub position: Option<String>,
    pub rate: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An engagement is active until its end date has passed.
pub fn engagement_status(end_date: Option<NaiveDate>, today: NaiveDate) -> &'static str {
    match end_date {
        Some(end) if end < today => STATUS_RELEASED,
        _ => STATUS_ACTIVE,
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCandidateManagementRequest {
    pub candidate_id: i32,
    pub management_id: i32,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[validate(length(min = 1, max = 255))]
    pub position: String,
    pub rate: Decimal,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCandidateManagementRequest {
    pub management_id: Option<i32>,
    pub status: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub position: Option<String>,
    pub rate: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateManagementListQuery {
    pub page: Option<i64>,
    #[serde(alias = "companyId")]
    pub company_id: Option<i32>,
    pub status: Option<String>,
}

/// Row for the professionals listing.
#[derive(Debug, Serialize, FromRow)]
pub struct ProfessionalRow {
    pub id: i32,
    pub candidate_id: i32,
    pub name: String,
    #[serde(rename = "role")]
    pub position: Option<String>,
    #[serde(rename = "client")]
    pub management_name: String,
    pub company_id: i32,
    #[serde(rename = "start")]
    pub start_date: Option<NaiveDate>,
    #[serde(rename = "end")]
    pub end_date: Option<NaiveDate>,
    pub status: String,
    pub rate: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct CandidateManagementDetail {
    #[serde(flatten)]
    pub record: CandidateManagement,
    pub candidate_name: String,
    pub candidate_email: Option<String>,
    pub post_sales_activities: Vec<PostSalesActivity>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engagement_without_end_date_is_active() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(engagement_status(None, today), STATUS_ACTIVE);
    }

    #[test]
    fn engagement_past_end_date_is_released() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let ended = NaiveDate::from_ymd_opt(2024, 5, 31).unwrap();
        let ending_today = today;
        assert_eq!(engagement_status(Some(ended), today), STATUS_RELEASED);
        assert_eq!(engagement_status(Some(ending_today), today), STATUS_ACTIVE);
    }
}
