use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::candidate_process::{ClientComments, Stage};
use crate::utils::errors::AppError;

pub const STATUS_CLOSED: &str = "Cerrado";
pub const STATUS_PENDING: &str = "Pendiente";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Process {
    pub id: i32,
    pub job_offer: String,
    pub job_offer_description: Option<String>,
    pub management_id: Option<i32>,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub pre_filtered: bool,
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Process {
    pub fn is_closed(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|status| status.eq_ignore_ascii_case(STATUS_CLOSED))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProcessRequest {
    #[validate(length(min = 1, max = 255))]
    pub job_offer: String,
    pub job_offer_description: Option<String>,
    #[serde(alias = "managementId")]
    pub management_id: Option<i32>,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub pre_filtered: Option<bool>,
    pub status: Option<String>,
}

/// Body of `PUT /process/{id}`: either a field update or `{"action": "close"}`.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProcessRequest {
    pub action: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub job_offer: Option<String>,
    pub job_offer_description: Option<String>,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub pre_filtered: Option<bool>,
    pub status: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub rate: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessChanges {
    pub job_offer: Option<String>,
    pub job_offer_description: Option<String>,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub pre_filtered: Option<bool>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloseOptions {
    pub start_date: Option<NaiveDate>,
    pub rate: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessUpdate {
    Edit(ProcessChanges),
    Close(CloseOptions),
}

impl TryFrom<UpdateProcessRequest> for ProcessUpdate {
    type Error = AppError;

    fn try_from(request: UpdateProcessRequest) -> Result<Self, Self::Error> {
        match request.action.as_deref() {
            None | Some("update") => Ok(ProcessUpdate::Edit(ProcessChanges {
                job_offer: request.job_offer,
                job_offer_description: request.job_offer_description,
                opened_at: request.opened_at,
                closed_at: request.closed_at,
                pre_filtered: request.pre_filtered,
                status: request.status,
            })),
            Some("close") => Ok(ProcessUpdate::Close(CloseOptions {
                start_date: request.start_date,
                rate: request.rate,
            })),
            Some(other) => Err(AppError::UnrecognizedAction(other.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProcessListQuery {
    pub page: Option<i64>,
    pub query: Option<String>,
    pub status: Option<String>,
    #[serde(alias = "companyId")]
    pub company_id: Option<i32>,
    #[serde(alias = "managementId")]
    pub management_id: Option<i32>,
}

#[derive(Debug, FromRow)]
pub struct ProcessSummaryRow {
    pub id: i32,
    pub job_offer: String,
    pub job_offer_description: Option<String>,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub pre_filtered: bool,
    pub status: Option<String>,
    pub management_name: Option<String>,
    pub company_name: Option<String>,
    pub candidate_count: i64,
    pub candidate_ids: Vec<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSummary {
    pub id: i32,
    pub name: String,
    pub job_offer_description: Option<String>,
    pub start_at: Option<NaiveDate>,
    pub end_at: Option<NaiveDate>,
    pub pre_filtered: u8,
    pub candidates: i64,
    pub status: String,
    pub company: String,
    pub management: String,
    pub candidates_ids: Vec<i32>,
}

impl From<ProcessSummaryRow> for ProcessSummary {
    fn from(row: ProcessSummaryRow) -> Self {
        Self {
            id: row.id,
            name: row.job_offer,
            job_offer_description: row.job_offer_description,
            start_at: row.opened_at.map(|at| at.date_naive()),
            end_at: row.closed_at.map(|at| at.date_naive()),
            pre_filtered: u8::from(row.pre_filtered),
            candidates: row.candidate_count,
            status: row.status.unwrap_or_else(|| STATUS_PENDING.to_string()),
            company: row.company_name.unwrap_or_else(|| "Sin compañía".to_string()),
            management: row
                .management_name
                .unwrap_or_else(|| "Sin jefatura".to_string()),
            candidates_ids: row.candidate_ids,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct ProcessCandidateRow {
    pub candidate_process_id: i32,
    pub candidate_id: Option<i32>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub jsongpt_text: Option<String>,
    pub match_percent: Option<i32>,
    pub stage: Stage,
    pub technical_skills: Option<String>,
    pub soft_skills: Option<String>,
    pub client_comments: Option<sqlx::types::Json<ClientComments>>,
    pub interview_questions: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessCandidate {
    pub candidate_process_id: i32,
    pub id: Option<i32>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub jsongpt_text: Option<String>,
    #[serde(rename = "match")]
    pub match_percent: i32,
    pub stage: Stage,
    pub technical_skills: Option<String>,
    pub soft_skills: Option<String>,
    pub client_comments: ClientComments,
    pub interview_questions: Option<String>,
}

impl From<ProcessCandidateRow> for ProcessCandidate {
    fn from(row: ProcessCandidateRow) -> Self {
        Self {
            candidate_process_id: row.candidate_process_id,
            id: row.candidate_id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            address: row.address,
            jsongpt_text: row.jsongpt_text,
            match_percent: row.match_percent.unwrap_or(0),
            stage: row.stage,
            technical_skills: row.technical_skills,
            soft_skills: row.soft_skills,
            client_comments: row.client_comments.map(|c| c.0).unwrap_or_default(),
            interview_questions: row.interview_questions,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDetail {
    pub id: i32,
    pub company_name: String,
    pub management_id: Option<i32>,
    pub job_offer: String,
    pub job_offer_description: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub pre_filtered: bool,
    pub status: String,
    pub candidates: Vec<ProcessCandidate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(action: Option<&str>) -> UpdateProcessRequest {
        UpdateProcessRequest {
            action: action.map(str::to_string),
            job_offer: Some("Backend Engineer".to_string()),
            job_offer_description: None,
            opened_at: None,
            closed_at: None,
            pre_filtered: None,
            status: None,
            start_date: None,
            rate: Some(Decimal::new(2500, 2)),
        }
    }

    #[test]
    fn missing_action_is_a_field_edit() {
        let update = ProcessUpdate::try_from(request(None)).unwrap();
        match update {
            ProcessUpdate::Edit(changes) => {
                assert_eq!(changes.job_offer.as_deref(), Some("Backend Engineer"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn close_action_carries_defaults() {
        let update = ProcessUpdate::try_from(request(Some("close"))).unwrap();
        assert_eq!(
            update,
            ProcessUpdate::Close(CloseOptions {
                start_date: None,
                rate: Some(Decimal::new(2500, 2)),
            })
        );
    }

    #[test]
    fn unknown_action_is_rejected() {
        let err = ProcessUpdate::try_from(request(Some("archive"))).unwrap_err();
        assert!(matches!(err, AppError::UnrecognizedAction(a) if a == "archive"));
    }

    #[test]
    fn closed_status_is_case_insensitive() {
        let mut process = Process {
            id: 1,
            job_offer: "QA".to_string(),
            job_offer_description: None,
            management_id: Some(1),
            opened_at: None,
            closed_at: None,
            pre_filtered: false,
            status: Some("cerrado".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(process.is_closed());
        process.status = Some("activo".to_string());
        assert!(!process.is_closed());
    }
}
