use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Instant;

use crate::{
    models::pre_invoice::{PreInvoice, PreInvoiceDetail, PreInvoiceItem, PreInvoiceRequest, Professional},
    utils::{
        errors::AppError,
        logger::{event_fields, LOGGER},
    },
};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Computed amounts for one pre-invoice line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItemDraft {
    pub candidate_id: Option<i32>,
    pub service: String,
    pub rate: Decimal,
    pub hours: Decimal,
    pub subtotal: Decimal,
    pub vat: Decimal,
    pub total: Decimal,
    pub description: String,
}

fn overflow() -> AppError {
    AppError::BadRequest("Line item amounts are too large".to_string())
}

impl LineItemDraft {
    /// `subtotal` falls back to `hours × rate`; `vat` is a percentage.
    pub fn compute(
        rate: Decimal,
        hours: Decimal,
        subtotal: Option<Decimal>,
        vat: Option<Decimal>,
    ) -> Result<Self, AppError> {
        let subtotal = match subtotal {
            Some(subtotal) => subtotal,
            None => hours.checked_mul(rate).ok_or_else(overflow)?,
        }
        .normalize();
        let vat = vat.unwrap_or(Decimal::ZERO).normalize();
        let total = subtotal
            .checked_mul(vat)
            .and_then(|tax| tax.checked_div(HUNDRED))
            .and_then(|tax| subtotal.checked_add(tax))
            .ok_or_else(overflow)?
            .normalize();

        Ok(Self {
            candidate_id: None,
            service: String::new(),
            rate: rate.normalize(),
            hours: hours.normalize(),
            subtotal,
            vat,
            total,
            description: String::new(),
        })
    }

    pub fn from_professional(professional: &Professional) -> Result<Self, AppError> {
        Ok(Self {
            candidate_id: Some(professional.id),
            service: professional.service.clone().unwrap_or_default(),
            description: professional.notes.clone().unwrap_or_default(),
            ..Self::compute(
                professional.hour_value,
                professional.hours_worked,
                professional.subtotal,
                professional.vat,
            )?
        })
    }
}

pub fn invoice_total(drafts: &[LineItemDraft]) -> Result<Decimal, AppError> {
    drafts
        .iter()
        .try_fold(Decimal::ZERO, |sum, draft| sum.checked_add(draft.total))
        .map(|total| total.normalize())
        .ok_or_else(overflow)
}

#[derive(Debug)]
pub struct InvoicingService {
    pool: PgPool,
}

impl InvoicingService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        request: PreInvoiceRequest,
        actor: i32,
    ) -> Result<PreInvoiceDetail, AppError> {
        let start_time = Instant::now();
        let drafts: Vec<LineItemDraft> = request
            .professionals
            .iter()
            .map(LineItemDraft::from_professional)
            .collect::<Result<_, _>>()?;
        let total_value = match request.total_value {
            Some(total) => total,
            None => invoice_total(&drafts)?,
        };

        let mut tx = self.pool.begin().await?;

        let invoice = sqlx::query_as::<_, PreInvoice>(
            r#"
            INSERT INTO pre_invoices
                (company_id, estimated_date, expiration_date, total_value, description, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(request.company_id)
        .bind(request.estimated_date)
        .bind(request.expiration_date)
        .bind(total_value)
        .bind(&request.description)
        .bind(request.status.unwrap_or_default())
        .fetch_one(&mut *tx)
        .await?;

        let items = insert_items(&mut tx, invoice.id, &drafts).await?;
        tx.commit().await?;

        LOGGER.log_transaction(
            "pre_invoice_create",
            start_time.elapsed(),
            Some(items.len()),
        );
        LOGGER.log_business_event(
            "pre_invoice_created",
            Some(actor),
            event_fields([
                ("pre_invoice_id", invoice.id.into()),
                ("items", items.len().into()),
                ("total_value", total_value.to_string().into()),
            ]),
        );

        Ok(PreInvoiceDetail {
            pre_invoice: invoice,
            items,
        })
    }

    /// Updates the header and replaces every line item in one transaction.
    pub async fn update(
        &self,
        id: i32,
        request: PreInvoiceRequest,
        actor: i32,
    ) -> Result<PreInvoiceDetail, AppError> {
        let start_time = Instant::now();
        let drafts: Vec<LineItemDraft> = request
            .professionals
            .iter()
            .map(LineItemDraft::from_professional)
            .collect::<Result<_, _>>()?;
        let total_value = match request.total_value {
            Some(total) => total,
            None => invoice_total(&drafts)?,
        };

        let mut tx = self.pool.begin().await?;

        let invoice = sqlx::query_as::<_, PreInvoice>(
            r#"
            UPDATE pre_invoices
            SET company_id = COALESCE($2, company_id),
                estimated_date = COALESCE($3, estimated_date),
                expiration_date = COALESCE($4, expiration_date),
                total_value = $5,
                description = COALESCE($6, description),
                status = COALESCE($7, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.company_id)
        .bind(request.estimated_date)
        .bind(request.expiration_date)
        .bind(total_value)
        .bind(&request.description)
        .bind(request.status)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Pre-invoice", id))?;

        let removed = sqlx::query("DELETE FROM pre_invoice_items WHERE pre_invoice_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let items = insert_items(&mut tx, id, &drafts).await?;
        tx.commit().await?;

        LOGGER.log_transaction(
            "pre_invoice_replace",
            start_time.elapsed(),
            Some(items.len()),
        );
        LOGGER.log_business_event(
            "pre_invoice_items_replaced",
            Some(actor),
            event_fields([
                ("pre_invoice_id", id.into()),
                ("removed", removed.into()),
                ("inserted", items.len().into()),
            ]),
        );

        Ok(PreInvoiceDetail {
            pre_invoice: invoice,
            items,
        })
    }
}

async fn insert_items(
    tx: &mut Transaction<'_, Postgres>,
    pre_invoice_id: i32,
    drafts: &[LineItemDraft],
) -> Result<Vec<PreInvoiceItem>, AppError> {
    let mut items = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let item = sqlx::query_as::<_, PreInvoiceItem>(
            r#"
            INSERT INTO pre_invoice_items
                (pre_invoice_id, candidate_id, service, rate, hours, subtotal, vat, total, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(pre_invoice_id)
        .bind(draft.candidate_id)
        .bind(&draft.service)
        .bind(draft.rate)
        .bind(draft.hours)
        .bind(draft.subtotal)
        .bind(draft.vat)
        .bind(draft.total)
        .bind(&draft.description)
        .fetch_one(&mut **tx)
        .await?;
        items.push(item);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn professional(value: serde_json::Value) -> Professional {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn explicit_subtotal_and_vat_produce_total() {
        let draft = LineItemDraft::from_professional(&professional(json!({
            "id": 1, "hoursWorked": 10, "hourValue": "50", "subtotal": 500, "vat": 19
        })))
        .unwrap();

        assert_eq!(draft.subtotal.to_string(), "500");
        assert_eq!(draft.vat.to_string(), "19");
        assert_eq!(draft.total.to_string(), "595");
        assert_eq!(draft.candidate_id, Some(1));
    }

    #[test]
    fn missing_subtotal_uses_hours_times_rate() {
        let draft = LineItemDraft::from_professional(&professional(json!({
            "id": 2, "hoursWorked": "7.5", "hourValue": "40"
        })))
        .unwrap();

        assert_eq!(draft.subtotal.to_string(), "300");
        assert_eq!(draft.vat, Decimal::ZERO);
        assert_eq!(draft.total.to_string(), "300");
        assert_eq!(draft.description, "");
    }

    #[test]
    fn total_holds_for_non_negative_inputs() {
        for subtotal in [0i64, 1, 99, 1_250, 47_000] {
            for vat in [0i64, 5, 19, 21, 100] {
                let subtotal = Decimal::new(subtotal, 0);
                let vat = Decimal::new(vat, 0);
                let draft =
                    LineItemDraft::compute(Decimal::ZERO, Decimal::ZERO, Some(subtotal), Some(vat))
                        .unwrap();
                assert_eq!(draft.total, subtotal + subtotal * vat / HUNDRED);
                assert!(draft.total >= draft.subtotal);
            }
        }
    }

    #[test]
    fn invoice_total_sums_items() {
        let drafts = vec![
            LineItemDraft::compute(Decimal::ZERO, Decimal::ZERO, Some(Decimal::new(500, 0)), Some(Decimal::new(19, 0))).unwrap(),
            LineItemDraft::compute(Decimal::new(20, 0), Decimal::new(5, 0), None, None).unwrap(),
        ];
        assert_eq!(invoice_total(&drafts).unwrap().to_string(), "695");
    }

    #[test]
    fn oversized_amounts_are_rejected() {
        let result = LineItemDraft::compute(Decimal::new(2, 0), Decimal::MAX, None, None);
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        let result = LineItemDraft::compute(Decimal::ZERO, Decimal::ZERO, Some(Decimal::MAX), Some(HUNDRED));
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        let draft = LineItemDraft::compute(Decimal::ZERO, Decimal::ZERO, Some(Decimal::MAX), None).unwrap();
        assert!(matches!(invoice_total(&[draft.clone(), draft]), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn oversized_professional_hours_are_rejected() {
        let result = LineItemDraft::from_professional(&professional(json!({
            "id": 3, "hoursWorked": "79228162514264337593543950335", "hourValue": 2
        })));
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
