use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::candidate_process::{CandidateProcess, ClientComments, Stage};
use crate::models::candidate_management::CandidateManagement;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Candidate {
    pub id: i32,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub jsongpt_text: Option<String>,
    pub total_experience: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Creates a candidate and, optionally, its process and management links.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCandidateRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 3, max = 50))]
    pub phone: Option<String>,
    pub address: Option<String>,
    pub jsongpt_text: Option<String>,
    pub total_experience: Option<String>,
    pub process_id: Option<i32>,
    pub technical_skills: Option<String>,
    pub soft_skills: Option<String>,
    pub client_comments: Option<ClientComments>,
    #[validate(range(min = 0, max = 100))]
    pub match_percent: Option<i32>,
    pub stage: Option<Stage>,
    pub interview_questions: Option<String>,
    pub management_id: Option<i32>,
    pub position: Option<String>,
    pub rate: Option<Decimal>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCandidateRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 3, max = 50))]
    pub phone: Option<String>,
    pub address: Option<String>,
    pub jsongpt_text: Option<String>,
    pub total_experience: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateListQuery {
    pub page: Option<i64>,
    pub query: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedCandidate {
    pub candidate: Candidate,
    pub candidate_process: Option<CandidateProcess>,
    pub candidate_management: Option<CandidateManagement>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDetail {
    pub id: i32,
    pub candidate_process_id: Option<i32>,
    pub name: String,
    #[serde(rename = "match")]
    pub match_percent: i32,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub summary: String,
    pub client_note: ClientComments,
    pub total_experience: String,
    pub stage: Option<Stage>,
}

impl CandidateDetail {
    pub fn new(candidate: Candidate, association: Option<CandidateProcess>) -> Self {
        Self {
            id: candidate.id,
            candidate_process_id: association.as_ref().map(|cp| cp.id),
            name: candidate.name,
            match_percent: association
                .as_ref()
                .and_then(|cp| cp.match_percent)
                .unwrap_or(0),
            email: candidate.email.unwrap_or_default(),
            phone: candidate.phone.unwrap_or_default(),
            address: candidate.address.unwrap_or_default(),
            summary: candidate.jsongpt_text.unwrap_or_default(),
            client_note: association
                .as_ref()
                .and_then(|cp| cp.client_comments.as_ref())
                .map(|comments| comments.0.clone())
                .unwrap_or_default(),
            total_experience: candidate.total_experience.unwrap_or_default(),
            stage: association.map(|cp| cp.stage),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckCandidateRequest {
    pub process_id: Option<serde_json::Value>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckCandidateResponse {
    pub exists: bool,
    pub message: String,
}
