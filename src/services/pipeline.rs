use serde::Serialize;
use sqlx::{types::Json, PgPool};
use std::time::Instant;
use validator::Validate;

use crate::{
    models::candidate_process::{CandidateProcess, EditPayload, Stage, StageRequest},
    utils::{
        errors::AppError,
        ids::id_from_json,
        logger::{event_fields, LOGGER},
    },
};

/// A validated dispatcher request. Built before any query runs.
#[derive(Debug, Clone, PartialEq)]
pub enum StageCommand {
    Edit { candidate_id: i32, payload: EditPayload },
    Move { candidate_id: i32, stage: Stage },
}

impl StageCommand {
    pub fn parse(request: StageRequest) -> Result<Self, AppError> {
        let action = request
            .action
            .filter(|action| !action.is_empty())
            .ok_or_else(|| AppError::BadRequest("Parameter 'action' is required".to_string()))?;

        let target = match action.as_str() {
            "edit" => None,
            "disqualify" => Some(Stage::Descartado),
            "back-interview" => Some(Stage::Entrevistas),
            "select" => Some(Stage::Seleccionado),
            other => return Err(AppError::UnrecognizedAction(other.to_string())),
        };

        let candidate_id = id_from_json(request.candidate_id.as_ref(), "candidateId")?;

        match target {
            Some(stage) => Ok(StageCommand::Move { candidate_id, stage }),
            None => {
                let payload: EditPayload = match request.data {
                    Some(data) if !data.is_null() => serde_json::from_value(data)
                        .map_err(|e| AppError::BadRequest(format!("Invalid edit data: {e}")))?,
                    _ => EditPayload::default(),
                };
                payload.validate()?;
                Ok(StageCommand::Edit { candidate_id, payload })
            }
        }
    }

    pub fn candidate_id(&self) -> i32 {
        match self {
            StageCommand::Edit { candidate_id, .. } | StageCommand::Move { candidate_id, .. } => {
                *candidate_id
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutcome {
    pub message: String,
    pub candidate_process: CandidateProcess,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub added_candidates: Vec<CandidateProcess>,
}

#[derive(Debug)]
pub struct PipelineService {
    pool: PgPool,
}

impl PipelineService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn apply(
        &self,
        process_id: i32,
        command: StageCommand,
        actor: i32,
    ) -> Result<StageOutcome, AppError> {
        let start_time = Instant::now();
        let candidate_id = command.candidate_id();

        let outcome = match command {
            StageCommand::Move { candidate_id, stage } => {
                let updated = sqlx::query_as::<_, CandidateProcess>(
                    r#"
                    UPDATE candidate_process
                    SET stage = $3, updated_at = NOW()
                    WHERE candidate_id = $1 AND process_id = $2
                    RETURNING *
                    "#,
                )
                .bind(candidate_id)
                .bind(process_id)
                .bind(stage)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| association_missing(candidate_id, process_id))?;

                LOGGER.log_business_event(
                    "candidate_stage_changed",
                    Some(actor),
                    event_fields([
                        ("process_id", process_id.into()),
                        ("candidate_id", candidate_id.into()),
                        ("stage", stage.as_str().into()),
                    ]),
                );

                StageOutcome {
                    message: format!("Candidate moved to {}", stage.as_str()),
                    candidate_process: updated,
                    added_candidates: Vec::new(),
                }
            }
            StageCommand::Edit { candidate_id, payload } => {
                self.edit(process_id, candidate_id, payload, actor).await?
            }
        };

        LOGGER.log_transaction(
            "stage_dispatch",
            start_time.elapsed(),
            Some(1 + outcome.added_candidates.len()),
        );
        tracing::debug!(process_id, candidate_id, "Stage command applied");

        Ok(outcome)
    }

    async fn edit(
        &self,
        process_id: i32,
        candidate_id: i32,
        payload: EditPayload,
        actor: i32,
    ) -> Result<StageOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, CandidateProcess>(
            r#"
            UPDATE candidate_process
            SET technical_skills = COALESCE($3, technical_skills),
                soft_skills = COALESCE($4, soft_skills),
                client_comments = COALESCE($5, client_comments),
                match_percent = COALESCE($6, match_percent),
                interview_questions = COALESCE($7, interview_questions),
                updated_at = NOW()
            WHERE candidate_id = $1 AND process_id = $2
            RETURNING *
            "#,
        )
        .bind(candidate_id)
        .bind(process_id)
        .bind(&payload.technical_skills)
        .bind(&payload.soft_skills)
        .bind(payload.client_comments.clone().map(Json))
        .bind(payload.match_percent)
        .bind(&payload.interview_questions)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| association_missing(candidate_id, process_id))?;

        let mut added_candidates = Vec::with_capacity(payload.candidate_ids.len());
        for new_candidate in &payload.candidate_ids {
            let exists = sqlx::query_scalar::<_, i32>("SELECT id FROM candidates WHERE id = $1")
                .bind(new_candidate)
                .fetch_optional(&mut *tx)
                .await?;
            if exists.is_none() {
                return Err(AppError::not_found("Candidate", *new_candidate));
            }

            let added = sqlx::query_as::<_, CandidateProcess>(
                r#"
                INSERT INTO candidate_process (candidate_id, process_id)
                VALUES ($1, $2)
                RETURNING *
                "#,
            )
            .bind(new_candidate)
            .bind(process_id)
            .fetch_one(&mut *tx)
            .await?;
            added_candidates.push(added);
        }

        tx.commit().await?;

        LOGGER.log_business_event(
            "candidate_process_edited",
            Some(actor),
            event_fields([
                ("process_id", process_id.into()),
                ("candidate_id", candidate_id.into()),
                ("added_candidates", added_candidates.len().into()),
            ]),
        );

        let message = if added_candidates.is_empty() {
            "Candidate-Process updated".to_string()
        } else {
            "Candidate-Process updated and candidates added".to_string()
        };

        Ok(StageOutcome {
            message,
            candidate_process: updated,
            added_candidates,
        })
    }
}

fn association_missing(candidate_id: i32, process_id: i32) -> AppError {
    AppError::NotFound(format!(
        "Candidate {candidate_id} is not associated with process {process_id}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(action: &str, candidate: serde_json::Value, data: Option<serde_json::Value>) -> StageRequest {
        StageRequest {
            action: Some(action.to_string()),
            candidate_id: Some(candidate),
            data,
        }
    }

    #[test]
    fn stage_actions_map_to_stages() {
        let cases = [
            ("disqualify", Stage::Descartado),
            ("back-interview", Stage::Entrevistas),
            ("select", Stage::Seleccionado),
        ];
        for (action, stage) in cases {
            let command = StageCommand::parse(request(action, json!(4), None)).unwrap();
            assert_eq!(command, StageCommand::Move { candidate_id: 4, stage });
        }
    }

    #[test]
    fn select_then_back_interview_returns_to_interviews() {
        let select = StageCommand::parse(request("select", json!("9"), None)).unwrap();
        let back = StageCommand::parse(request("back-interview", json!("9"), None)).unwrap();
        assert!(matches!(select, StageCommand::Move { stage: Stage::Seleccionado, .. }));
        assert!(matches!(back, StageCommand::Move { stage: Stage::Entrevistas, .. }));
    }

    #[test]
    fn unknown_action_is_rejected_before_ids_are_checked() {
        let err = StageCommand::parse(request("promote", json!("nope"), None)).unwrap_err();
        assert!(matches!(err, AppError::UnrecognizedAction(a) if a == "promote"));
    }

    #[test]
    fn missing_action_or_bad_candidate_is_a_bad_request() {
        let missing = StageRequest {
            action: None,
            candidate_id: Some(json!(1)),
            data: None,
        };
        assert!(matches!(StageCommand::parse(missing), Err(AppError::BadRequest(_))));
        assert!(matches!(
            StageCommand::parse(request("select", json!("abc"), None)),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn edit_parses_payload() {
        let command = StageCommand::parse(request(
            "edit",
            json!(3),
            Some(json!({
                "candidate_ids": [10, 11],
                "match_percent": 80,
                "client_comments": {"comment": "ok", "techSkills": "Rust", "softSkills": ""}
            })),
        ))
        .unwrap();

        match command {
            StageCommand::Edit { candidate_id, payload } => {
                assert_eq!(candidate_id, 3);
                assert_eq!(payload.candidate_ids, vec![10, 11]);
                assert_eq!(payload.match_percent, Some(80));
                assert_eq!(payload.client_comments.unwrap().tech_skills, "Rust");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn edit_rejects_out_of_range_match() {
        let err = StageCommand::parse(request("edit", json!(3), Some(json!({"match_percent": 140}))))
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }
}
