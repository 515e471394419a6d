use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PostSalesActivity {
    pub id: i32,
    pub candidate_management_id: i32,
    pub date: Option<NaiveDate>,
    pub benefit: Option<String>,
    pub client_comment: Option<String>,
    pub eval_stack: Option<Decimal>,
    pub eval_comunicacion: Option<Decimal>,
    pub eval_motivacion: Option<Decimal>,
    pub eval_cumplimiento: Option<Decimal>,
    pub acciones_acl: Option<String>,
    pub proyecction: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePostSalesRequest {
    pub candidate_management_id: i32,
    pub date: Option<NaiveDate>,
    pub benefit: Option<String>,
    pub client_comment: Option<String>,
    pub eval_stack: Option<Decimal>,
    pub eval_comunicacion: Option<Decimal>,
    pub eval_motivacion: Option<Decimal>,
    pub eval_cumplimiento: Option<Decimal>,
    pub acciones_acl: Option<String>,
    pub proyecction: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostSalesListQuery {
    pub page: Option<i64>,
    pub candidate_management_id: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct EvaluationRecorded {
    pub activity: PostSalesActivity,
    pub rate: Decimal,
    pub evaluations: usize,
}
