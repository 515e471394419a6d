use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::collections::BTreeMap;
use std::time::Instant;

use crate::{
    services::scope::VisibilityScope,
    utils::{
        errors::AppError,
        logger::{event_fields, LOGGER},
    },
};

pub const DEFAULT_RECENT: i64 = 10;

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    #[serde(alias = "companyId")]
    pub company_id: Option<i32>,
    #[serde(alias = "managementId")]
    pub management_id: Option<i32>,
    pub recent: Option<i64>,
}

#[derive(Debug, Clone, Copy, FromRow)]
pub struct ClosedSpan {
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

impl ClosedSpan {
    /// Whole days open, never less than one.
    pub fn days(&self) -> i64 {
        (self.closed_at - self.opened_at).num_days().max(1)
    }
}

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct MonthlyHistory {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    #[serde(rename = "activosCount")]
    pub active: i64,
    #[serde(rename = "cerradosCount")]
    pub closed: i64,
    #[serde(rename = "cerradostrimestreCount")]
    pub closed_this_quarter: i64,
    #[serde(rename = "profesionalesCount")]
    pub active_professionals: i64,
    #[serde(rename = "tiempoCierre")]
    pub average_close_days: f64,
    #[serde(rename = "historicoTiempos")]
    pub history: MonthlyHistory,
    #[serde(rename = "diasDesdeUltimoProcesoActivo")]
    pub days_since_last_active: i64,
}

/// Average of the clamped durations, rounded to two decimals.
pub fn average_close_days(spans: &[ClosedSpan]) -> f64 {
    if spans.is_empty() {
        return 0.0;
    }
    let total: i64 = spans.iter().map(ClosedSpan::days).sum();
    round2(total as f64 / spans.len() as f64)
}

/// Average close time per closing month, oldest month first.
pub fn monthly_history(spans: &[ClosedSpan]) -> MonthlyHistory {
    let mut months: BTreeMap<(i32, u32), (i64, i64)> = BTreeMap::new();
    for span in spans {
        let key = (span.closed_at.year(), span.closed_at.month());
        let entry = months.entry(key).or_insert((0, 0));
        entry.0 += span.days();
        entry.1 += 1;
    }

    let mut history = MonthlyHistory::default();
    for ((year, month), (total, count)) in months {
        history.labels.push(format!("{year}-{month:02}"));
        history.values.push(round2(total as f64 / count as f64));
    }
    history
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// Shared process visibility filter: $1 company, $2 management, $3 company scope, $4 management scope.
const PROCESS_FILTER: &str = r#"
    FROM process p
    LEFT JOIN management m ON m.id = p.management_id
    WHERE ($1::int IS NULL OR m.company_id = $1)
      AND ($2::int IS NULL OR p.management_id = $2)
      AND ($3::int[] IS NULL OR m.company_id = ANY($3))
      AND ($4::int[] IS NULL OR p.management_id = ANY($4))
"#;

#[derive(Debug)]
pub struct DashboardService {
    pool: PgPool,
}

impl DashboardService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn stats(
        &self,
        query: &DashboardQuery,
        scope: &VisibilityScope,
        actor: i32,
    ) -> Result<DashboardStats, AppError> {
        let start_time = Instant::now();
        let recent = query.recent.filter(|n| *n > 0).unwrap_or(DEFAULT_RECENT);

        let (active, closed, closed_this_quarter, active_professionals, spans, last_opened) = tokio::try_join!(
            self.count_processes(query, scope, "AND p.status ILIKE 'activo'"),
            self.count_processes(
                query,
                scope,
                "AND p.status ILIKE 'cerrado' AND p.closed_at IS NOT NULL"
            ),
            self.count_processes(
                query,
                scope,
                "AND p.status ILIKE 'cerrado' AND p.closed_at >= NOW() - INTERVAL '3 months'"
            ),
            self.count_active_professionals(query, scope),
            self.closed_spans(query, scope),
            self.last_active_opening(query, scope),
        )?;

        let latest: Vec<ClosedSpan> = spans.iter().rev().take(recent as usize).copied().collect();
        let days_since_last_active = last_opened
            .map(|opened| (Utc::now() - opened).num_days().max(0))
            .unwrap_or(0);

        let stats = DashboardStats {
            active,
            closed,
            closed_this_quarter,
            active_professionals,
            average_close_days: average_close_days(&latest),
            history: monthly_history(&spans),
            days_since_last_active,
        };

        LOGGER.log_transaction(
            "dashboard_stats",
            start_time.elapsed(),
            Some(spans.len()),
        );
        LOGGER.log_business_event(
            "dashboard_stats_requested",
            Some(actor),
            event_fields([
                ("company_id", query.company_id.into()),
                ("management_id", query.management_id.into()),
                ("recent", recent.into()),
            ]),
        );

        Ok(stats)
    }

    async fn count_processes(
        &self,
        query: &DashboardQuery,
        scope: &VisibilityScope,
        condition: &str,
    ) -> Result<i64, AppError> {
        let (companies, managements) = scope.bind_arrays();
        let sql = format!("SELECT COUNT(*) {PROCESS_FILTER} {condition}");
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(query.company_id)
            .bind(query.management_id)
            .bind(companies)
            .bind(managements)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_active_professionals(
        &self,
        query: &DashboardQuery,
        scope: &VisibilityScope,
    ) -> Result<i64, AppError> {
        let (companies, managements) = scope.bind_arrays();
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(DISTINCT cm.candidate_id)
            FROM candidate_management cm
            JOIN management m ON m.id = cm.management_id
            WHERE cm.status ILIKE 'activo'
              AND ($1::int IS NULL OR m.company_id = $1)
              AND ($2::int IS NULL OR cm.management_id = $2)
              AND ($3::int[] IS NULL OR m.company_id = ANY($3))
              AND ($4::int[] IS NULL OR cm.management_id = ANY($4))
            "#,
        )
        .bind(query.company_id)
        .bind(query.management_id)
        .bind(companies)
        .bind(managements)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Closed processes with both timestamps, oldest closure first.
    async fn closed_spans(
        &self,
        query: &DashboardQuery,
        scope: &VisibilityScope,
    ) -> Result<Vec<ClosedSpan>, AppError> {
        let (companies, managements) = scope.bind_arrays();
        let sql = format!(
            "SELECT p.opened_at, p.closed_at {PROCESS_FILTER} \
             AND p.status ILIKE 'cerrado' AND p.opened_at IS NOT NULL AND p.closed_at IS NOT NULL \
             ORDER BY p.closed_at ASC"
        );
        let spans = sqlx::query_as::<_, ClosedSpan>(&sql)
            .bind(query.company_id)
            .bind(query.management_id)
            .bind(companies)
            .bind(managements)
            .fetch_all(&self.pool)
            .await?;
        Ok(spans)
    }

    async fn last_active_opening(
        &self,
        query: &DashboardQuery,
        scope: &VisibilityScope,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        let (companies, managements) = scope.bind_arrays();
        let sql = format!("SELECT MAX(p.opened_at) {PROCESS_FILTER} AND p.status ILIKE 'activo'");
        let opened = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(&sql)
            .bind(query.company_id)
            .bind(query.management_id)
            .bind(companies)
            .bind(managements)
            .fetch_one(&self.pool)
            .await?;
        Ok(opened)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn span(opened: (i32, u32, u32), hours_open: i64) -> ClosedSpan {
        let opened_at = Utc
            .with_ymd_and_hms(opened.0, opened.1, opened.2, 9, 0, 0)
            .unwrap();
        ClosedSpan {
            opened_at,
            closed_at: opened_at + Duration::hours(hours_open),
        }
    }

    #[test]
    fn short_and_negative_durations_count_as_one_day() {
        assert_eq!(span((2024, 1, 1), 3).days(), 1);
        assert_eq!(span((2024, 1, 1), -48).days(), 1);
        assert_eq!(span((2024, 1, 1), 24 * 6).days(), 6);
    }

    #[test]
    fn average_uses_clamped_durations() {
        let spans = [span((2024, 1, 1), 2), span((2024, 1, 1), 24 * 4)];
        assert_eq!(average_close_days(&spans), 2.5);
        assert_eq!(average_close_days(&[]), 0.0);
    }

    #[test]
    fn history_groups_by_closing_month_in_order() {
        let spans = [
            span((2024, 2, 10), 24 * 2),
            span((2024, 1, 5), 24 * 10),
            span((2024, 2, 1), 24 * 4),
        ];
        let history = monthly_history(&spans);
        assert_eq!(history.labels, vec!["2024-01", "2024-02"]);
        assert_eq!(history.values, vec![10.0, 3.0]);
    }
}
