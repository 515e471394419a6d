use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::utils::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "pre_invoice_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PreInvoiceStatus {
    #[default]
    Draft,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PreInvoice {
    pub id: i32,
    pub company_id: Option<i32>,
    pub estimated_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
    pub total_value: Decimal,
    pub description: Option<String>,
    pub status: PreInvoiceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PreInvoiceItem {
    pub id: i32,
    pub pre_invoice_id: i32,
    pub candidate_id: Option<i32>,
    pub service: String,
    pub rate: Decimal,
    pub hours: Decimal,
    pub subtotal: Decimal,
    pub vat: Decimal,
    pub total: Decimal,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One billed professional as sent by the invoicing screen.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Professional {
    pub id: i32,
    #[serde(default)]
    pub hours_worked: Decimal,
    #[serde(default)]
    pub hour_value: Decimal,
    pub subtotal: Option<Decimal>,
    pub vat: Option<Decimal>,
    pub notes: Option<String>,
    pub service: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PreInvoiceRequest {
    pub company_id: Option<i32>,
    pub estimated_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
    pub total_value: Option<Decimal>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub status: Option<PreInvoiceStatus>,
    #[serde(default)]
    pub professionals: Vec<Professional>,
}

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub action: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Approve,
    Reject,
}

impl StatusChange {
    pub fn parse(action: Option<&str>) -> Result<Self, AppError> {
        match action {
            Some("approve") => Ok(StatusChange::Approve),
            Some("reject") => Ok(StatusChange::Reject),
            Some(other) => Err(AppError::UnrecognizedAction(other.to_string())),
            None => Err(AppError::BadRequest("Parameter 'action' is required".to_string())),
        }
    }

    pub fn target(&self) -> PreInvoiceStatus {
        match self {
            StatusChange::Approve => PreInvoiceStatus::Approved,
            StatusChange::Reject => PreInvoiceStatus::Rejected,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PreInvoiceListQuery {
    pub page: Option<i64>,
    #[serde(alias = "companyId")]
    pub company_id: Option<i32>,
}

#[derive(Debug, FromRow)]
pub struct PreInvoiceSummaryRow {
    #[sqlx(flatten)]
    pub invoice: PreInvoice,
    pub item_count: i64,
    pub professional_names: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PreInvoiceSummary {
    #[serde(flatten)]
    pub invoice: PreInvoice,
    pub professionals: String,
    pub cantidad: i64,
}

impl From<PreInvoiceSummaryRow> for PreInvoiceSummary {
    fn from(row: PreInvoiceSummaryRow) -> Self {
        Self {
            invoice: row.invoice,
            professionals: summarize_professionals(&row.professional_names),
            cantidad: row.item_count,
        }
    }
}

/// First three names, then a count of the rest.
pub fn summarize_professionals(names: &[String]) -> String {
    let shown = names.iter().take(3).cloned().collect::<Vec<_>>().join(", ");
    match names.len().saturating_sub(3) {
        0 => shown,
        rest => format!("{shown} y otros {rest}"),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreInvoiceDetail {
    pub pre_invoice: PreInvoice,
    pub items: Vec<PreInvoiceItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChanged {
    pub message: String,
    pub updated_invoice: PreInvoice,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePreInvoiceItemRequest {
    pub pre_invoice_id: i32,
    pub candidate_id: Option<i32>,
    #[validate(length(max = 255))]
    pub service: Option<String>,
    pub rate: Option<Decimal>,
    pub hours: Option<Decimal>,
    pub subtotal: Option<Decimal>,
    pub vat: Option<Decimal>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePreInvoiceItemRequest {
    pub candidate_id: Option<i32>,
    #[validate(length(max = 255))]
    pub service: Option<String>,
    pub rate: Option<Decimal>,
    pub hours: Option<Decimal>,
    pub subtotal: Option<Decimal>,
    pub vat: Option<Decimal>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PreInvoiceItemListQuery {
    pub page: Option<i64>,
    pub pre_invoice_id: Option<i32>,
}
