use rust_decimal::Decimal;
use sqlx::PgPool;
use std::time::Instant;

use crate::{
    models::post_sales::{CreatePostSalesRequest, EvaluationRecorded, PostSalesActivity},
    services::scope::VisibilityScope,
    utils::{
        errors::AppError,
        logger::{event_fields, LOGGER},
    },
};

/// The four scores of one evaluation. Missing scores count as zero.
pub type Scores = [Option<Decimal>; 4];

pub fn evaluation_average(scores: &Scores) -> Decimal {
    let sum: Decimal = scores.iter().map(|s| s.unwrap_or(Decimal::ZERO)).sum();
    sum / Decimal::from(scores.len())
}

/// Mean of the per-evaluation averages, kept at full precision.
pub fn rolling_rate(evaluations: &[Scores]) -> Decimal {
    if evaluations.is_empty() {
        return Decimal::ZERO;
    }
    let total: Decimal = evaluations.iter().map(evaluation_average).sum();
    (total / Decimal::from(evaluations.len())).normalize()
}

fn scores_of(activity: &PostSalesActivity) -> Scores {
    [
        activity.eval_stack,
        activity.eval_comunicacion,
        activity.eval_motivacion,
        activity.eval_cumplimiento,
    ]
}

#[derive(Debug)]
pub struct EvaluationService {
    pool: PgPool,
}

impl EvaluationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts the evaluation and refreshes the engagement's rate in the same transaction.
    /// Engagements outside `scope` are reported as missing.
    pub async fn record(
        &self,
        request: CreatePostSalesRequest,
        scope: &VisibilityScope,
        actor: i32,
    ) -> Result<EvaluationRecorded, AppError> {
        let start_time = Instant::now();
        let management_id = request.candidate_management_id;
        let (companies, managements) = scope.bind_arrays();
        let mut tx = self.pool.begin().await?;

        sqlx::query_scalar::<_, i32>(
            r#"
            SELECT cm.id FROM candidate_management cm
            LEFT JOIN management m ON m.id = cm.management_id
            WHERE cm.id = $1
              AND ($2::int[] IS NULL OR m.company_id = ANY($2))
              AND ($3::int[] IS NULL OR cm.management_id = ANY($3))
            FOR UPDATE OF cm
            "#,
        )
        .bind(management_id)
        .bind(&companies)
        .bind(&managements)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Candidate management", management_id))?;

        let activity = sqlx::query_as::<_, PostSalesActivity>(
            r#"
            INSERT INTO post_sales_activities
                (candidate_management_id, date, benefit, client_comment, eval_stack,
                 eval_comunicacion, eval_motivacion, eval_cumplimiento, acciones_acl, proyecction)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(management_id)
        .bind(request.date)
        .bind(&request.benefit)
        .bind(&request.client_comment)
        .bind(request.eval_stack)
        .bind(request.eval_comunicacion)
        .bind(request.eval_motivacion)
        .bind(request.eval_cumplimiento)
        .bind(&request.acciones_acl)
        .bind(&request.proyecction)
        .fetch_one(&mut *tx)
        .await?;

        let history = sqlx::query_as::<_, PostSalesActivity>(
            "SELECT * FROM post_sales_activities WHERE candidate_management_id = $1",
        )
        .bind(management_id)
        .fetch_all(&mut *tx)
        .await?;

        let scores: Vec<Scores> = history.iter().map(scores_of).collect();
        let rate = rolling_rate(&scores);

        sqlx::query("UPDATE candidate_management SET rate = $2, updated_at = NOW() WHERE id = $1")
            .bind(management_id)
            .bind(rate)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        LOGGER.log_transaction(
            "evaluation_record",
            start_time.elapsed(),
            Some(history.len()),
        );
        LOGGER.log_business_event(
            "post_sales_evaluation_recorded",
            Some(actor),
            event_fields([
                ("candidate_management_id", management_id.into()),
                ("evaluations", history.len().into()),
                ("rate", rate.to_string().into()),
            ]),
        );

        Ok(EvaluationRecorded {
            activity,
            rate,
            evaluations: history.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(value: i64) -> Option<Decimal> {
        Some(Decimal::new(value, 0))
    }

    #[test]
    fn single_evaluation_is_its_own_average() {
        assert_eq!(rolling_rate(&[[d(4), d(5), d(3), d(4)]]).to_string(), "4");
    }

    #[test]
    fn two_evaluations_average_their_averages() {
        let rate = rolling_rate(&[[d(4), d(4), d(4), d(4)], [d(5), d(3), d(5), d(4)]]);
        // 4 and 4.25
        assert_eq!(rate.to_string(), "4.125");
    }

    #[test]
    fn rate_is_not_rounded_to_cents() {
        let rate = rolling_rate(&[[d(1), d(0), d(0), d(0)], [d(0), d(0), d(0), d(0)]]);
        assert_eq!(rate, Decimal::new(125, 3));

        let thirds = rolling_rate(&[[d(1), d(1), d(1), d(1)], [d(0), d(0), d(0), d(0)], [d(0), d(0), d(0), d(0)]]);
        assert!(thirds > Decimal::new(3333, 4) && thirds < Decimal::new(3334, 4));
    }

    #[test]
    fn five_evaluations_with_missing_scores() {
        let evaluations = [
            [d(5), d(5), d(5), d(5)],
            [d(4), None, d(4), d(4)],
            [d(3), d(3), d(3), d(3)],
            [None, None, None, None],
            [d(2), d(4), d(2), d(4)],
        ];
        // 5 + 3 + 3 + 0 + 3 = 14, over 5
        assert_eq!(rolling_rate(&evaluations).to_string(), "2.8");
    }

    #[test]
    fn no_evaluations_yields_zero() {
        assert_eq!(rolling_rate(&[]), Decimal::ZERO);
    }
}
