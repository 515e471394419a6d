use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use std::time::Instant;

use crate::{
    models::{
        candidate_management::{CandidateManagement, STATUS_ACTIVE},
        candidate_process::CandidateProcess,
        process::{CloseOptions, Process, STATUS_CLOSED},
    },
    services::scope::VisibilityScope,
    utils::{
        errors::AppError,
        logger::{event_fields, LOGGER},
    },
};

/// One engagement to insert when a process closes.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEngagement {
    pub candidate_id: i32,
    pub management_id: i32,
    pub position: String,
    pub start_date: NaiveDate,
    pub rate: Option<Decimal>,
}

/// Builds every engagement up front so a bad row fails the whole batch.
pub fn plan_engagements(
    process: &Process,
    selected: &[CandidateProcess],
    options: &CloseOptions,
    today: NaiveDate,
) -> Result<Vec<NewEngagement>, AppError> {
    let management_id = match (process.management_id, selected.is_empty()) {
        (Some(id), _) => id,
        (None, true) => return Ok(Vec::new()),
        (None, false) => {
            return Err(AppError::BadRequest(format!(
                "Process {} has no management to assign selected candidates to",
                process.id
            )))
        }
    };

    selected
        .iter()
        .map(|row| {
            let candidate_id = row.candidate_id.ok_or_else(|| {
                AppError::BadRequest(format!(
                    "Candidate-process {} has no candidate assigned",
                    row.id
                ))
            })?;
            Ok(NewEngagement {
                candidate_id,
                management_id,
                position: process.job_offer.clone(),
                start_date: options.start_date.unwrap_or(today),
                rate: options.rate,
            })
        })
        .collect()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosureOutcome {
    pub message: String,
    pub process: Process,
    pub candidate_managements: Vec<CandidateManagement>,
}

#[derive(Debug)]
pub struct ClosureService {
    pool: PgPool,
}

impl ClosureService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Processes outside `scope` are reported as missing.
    pub async fn close(
        &self,
        process_id: i32,
        options: CloseOptions,
        scope: &VisibilityScope,
        actor: i32,
    ) -> Result<ClosureOutcome, AppError> {
        let start_time = Instant::now();
        let (companies, managements) = scope.bind_arrays();
        let mut tx = self.pool.begin().await?;

        let process = sqlx::query_as::<_, Process>(
            r#"
            SELECT p.* FROM process p
            LEFT JOIN management m ON m.id = p.management_id
            WHERE p.id = $1
              AND ($2::int[] IS NULL OR m.company_id = ANY($2))
              AND ($3::int[] IS NULL OR p.management_id = ANY($3))
            FOR UPDATE OF p
            "#,
        )
        .bind(process_id)
        .bind(&companies)
        .bind(&managements)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Process", process_id))?;

        if process.is_closed() {
            return Err(AppError::Conflict(format!(
                "Process {process_id} is already closed"
            )));
        }

        let selected = sqlx::query_as::<_, CandidateProcess>(
            r#"
            SELECT * FROM candidate_process
            WHERE process_id = $1 AND stage = 'seleccionado'
            ORDER BY id
            "#,
        )
        .bind(process_id)
        .fetch_all(&mut *tx)
        .await?;

        let plan = plan_engagements(&process, &selected, &options, Utc::now().date_naive())?;

        let mut created = Vec::with_capacity(plan.len());
        for engagement in &plan {
            let record = sqlx::query_as::<_, CandidateManagement>(
                r#"
                INSERT INTO candidate_management
                    (candidate_id, management_id, status, start_date, position, rate)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *
                "#,
            )
            .bind(engagement.candidate_id)
            .bind(engagement.management_id)
            .bind(STATUS_ACTIVE)
            .bind(engagement.start_date)
            .bind(&engagement.position)
            .bind(engagement.rate)
            .fetch_one(&mut *tx)
            .await?;
            created.push(record);
        }

        let closed = sqlx::query_as::<_, Process>(
            r#"
            UPDATE process
            SET status = $2, closed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(process_id)
        .bind(STATUS_CLOSED)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        LOGGER.log_transaction(
            "process_closure",
            start_time.elapsed(),
            Some(created.len()),
        );
        LOGGER.log_business_event(
            "process_closed",
            Some(actor),
            event_fields([
                ("process_id", process_id.into()),
                ("promoted_candidates", created.len().into()),
            ]),
        );

        Ok(ClosureOutcome {
            message: format!(
                "Process closed and {} candidate(s) moved to management",
                created.len()
            ),
            process: closed,
            candidate_managements: created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::candidate_process::Stage;

    fn process(management_id: Option<i32>) -> Process {
        Process {
            id: 5,
            job_offer: "Data Engineer".to_string(),
            job_offer_description: None,
            management_id,
            opened_at: None,
            closed_at: None,
            pre_filtered: false,
            status: Some("activo".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn selected(id: i32, candidate_id: Option<i32>) -> CandidateProcess {
        CandidateProcess {
            id,
            candidate_id,
            process_id: 5,
            match_percent: Some(90),
            stage: Stage::Seleccionado,
            technical_skills: None,
            soft_skills: None,
            client_comments: None,
            interview_questions: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn one_engagement_per_selected_row() {
        let rows = vec![selected(1, Some(10)), selected(2, Some(11))];
        let options = CloseOptions {
            start_date: None,
            rate: Some(Decimal::new(45, 0)),
        };

        let plan = plan_engagements(&process(Some(3)), &rows, &options, today()).unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].candidate_id, 10);
        assert_eq!(plan[1].management_id, 3);
        assert_eq!(plan[1].position, "Data Engineer");
        assert_eq!(plan[0].start_date, today());
        assert_eq!(plan[0].rate, Some(Decimal::new(45, 0)));
    }

    #[test]
    fn row_without_candidate_fails_the_batch() {
        let rows = vec![selected(1, Some(10)), selected(2, None)];
        let err = plan_engagements(&process(Some(3)), &rows, &CloseOptions::default(), today())
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn missing_management_only_matters_with_selected_rows() {
        assert!(plan_engagements(&process(None), &[], &CloseOptions::default(), today())
            .unwrap()
            .is_empty());
        assert!(plan_engagements(
            &process(None),
            &[selected(1, Some(10))],
            &CloseOptions::default(),
            today()
        )
        .is_err());
    }

    #[test]
    fn explicit_start_date_is_used() {
        let start = NaiveDate::from_ymd_opt(2024, 4, 15).unwrap();
        let options = CloseOptions {
            start_date: Some(start),
            rate: None,
        };
        let plan =
            plan_engagements(&process(Some(1)), &[selected(1, Some(2))], &options, today()).unwrap();
        assert_eq!(plan[0].start_date, start);
    }
}
