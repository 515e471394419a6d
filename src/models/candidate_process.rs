use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use validator::Validate;

/// A candidate's position in a process pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "candidate_stage", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Entrevistas,
    Seleccionado,
    Descartado,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Entrevistas => "entrevistas",
            Stage::Seleccionado => "seleccionado",
            Stage::Descartado => "descartado",
        }
    }
}

/// Structured client note kept in `candidate_process.client_comments`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientComments {
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub tech_skills: String,
    #[serde(default)]
    pub soft_skills: String,
}

impl ClientComments {
    /// Overwrites only the fields present in `note`.
    pub fn merge(&mut self, note: &NoteFields) {
        if let Some(comment) = &note.comment {
            self.comment = comment.clone();
        }
        if let Some(tech_skills) = &note.tech_skills {
            self.tech_skills = tech_skills.clone();
        }
        if let Some(soft_skills) = &note.soft_skills {
            self.soft_skills = soft_skills.clone();
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteFields {
    pub comment: Option<String>,
    pub tech_skills: Option<String>,
    pub soft_skills: Option<String>,
}

impl NoteFields {
    pub fn is_empty(&self) -> bool {
        self.comment.is_none() && self.tech_skills.is_none() && self.soft_skills.is_none()
    }
}

#[derive(Debug, Deserialize)]
pub struct NoteRequest {
    #[serde(alias = "candidateProcessId")]
    pub candidate_process_id: Option<i32>,
    #[serde(flatten)]
    pub note: NoteFields,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CandidateProcess {
    pub id: i32,
    pub candidate_id: Option<i32>,
    pub process_id: i32,
    pub match_percent: Option<i32>,
    pub stage: Stage,
    pub technical_skills: Option<String>,
    pub soft_skills: Option<String>,
    pub client_comments: Option<Json<ClientComments>>,
    pub interview_questions: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCandidateProcessRequest {
    pub candidate_id: i32,
    pub process_id: i32,
    #[validate(range(min = 0, max = 100))]
    pub match_percent: Option<i32>,
    pub technical_skills: Option<String>,
    pub soft_skills: Option<String>,
    pub client_comments: Option<ClientComments>,
    pub interview_questions: Option<String>,
    pub stage: Option<Stage>,
}

/// Raw body of the stage dispatcher; typed by `StageCommand::parse`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRequest {
    pub action: Option<String>,
    pub candidate_id: Option<serde_json::Value>,
    pub data: Option<serde_json::Value>,
}

/// `data` payload of the `edit` action.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Validate)]
pub struct EditPayload {
    #[serde(default)]
    pub candidate_ids: Vec<i32>,
    pub technical_skills: Option<String>,
    pub soft_skills: Option<String>,
    pub client_comments: Option<ClientComments>,
    #[validate(range(min = 0, max = 100))]
    pub match_percent: Option<i32>,
    pub interview_questions: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineCandidate {
    pub id: Option<i32>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    #[serde(rename = "match")]
    pub match_percent: i32,
    pub stage: Stage,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineView {
    pub id: i32,
    pub name: String,
    pub start_at: Option<chrono::NaiveDate>,
    pub end_at: Option<chrono::NaiveDate>,
    pub pre_filtered: u8,
    pub candidates: Vec<PipelineCandidate>,
    pub state: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_round_trip_with_camel_case_keys() {
        let raw = serde_json::json!({"comment": "Solid", "techSkills": "Rust", "softSkills": "Calm"});
        let comments: ClientComments = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(comments.tech_skills, "Rust");
        assert_eq!(serde_json::to_value(&comments).unwrap(), raw);
    }

    #[test]
    fn merge_keeps_fields_not_supplied() {
        let mut comments = ClientComments {
            comment: "first".to_string(),
            tech_skills: "Go".to_string(),
            soft_skills: "Patient".to_string(),
        };
        comments.merge(&NoteFields {
            comment: Some("second".to_string()),
            tech_skills: None,
            soft_skills: None,
        });

        assert_eq!(comments.comment, "second");
        assert_eq!(comments.tech_skills, "Go");
        assert_eq!(comments.soft_skills, "Patient");
    }

    #[test]
    fn default_stage_is_interviews() {
        assert_eq!(Stage::default(), Stage::Entrevistas);
        assert_eq!(
            serde_json::to_value(Stage::Seleccionado).unwrap(),
            serde_json::json!("seleccionado")
        );
    }
}
