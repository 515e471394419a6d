use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    middleware::auth::{AuthUser, STAFF},
    models::{
        pre_invoice::{
            PreInvoice, PreInvoiceDetail, PreInvoiceItem, PreInvoiceListQuery, PreInvoiceRequest,
            PreInvoiceSummary, PreInvoiceSummaryRow, StatusChange, StatusChangeRequest,
            StatusChanged,
        },
        user::UserRole,
    },
    services::{invoicing::InvoicingService, scope::VisibilityScope},
    utils::{
        errors::{AppError, AppResult},
        extract::{AppJson, AppQuery},
        ids::parse_id,
        logger::{event_fields, LOGGER},
        pagination::{resolve_page, Paginated},
    },
    AppState,
};

const REVIEWERS: &[UserRole] = &[UserRole::Admin, UserRole::Client, UserRole::ClientManager];

// $1 company, $2 company scope, $3 management scope
const INVOICE_FILTER: &str = r#"
    FROM pre_invoices pi
    WHERE ($1::int IS NULL OR pi.company_id = $1)
      AND ($2::int[] IS NULL OR pi.company_id = ANY($2))
      AND ($3::int[] IS NULL OR pi.company_id IN (
          SELECT company_id FROM management WHERE id = ANY($3)
      ))
"#;

pub async fn list_pre_invoices(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppQuery(params): AppQuery<PreInvoiceListQuery>,
) -> AppResult<Json<Paginated<PreInvoiceSummary>>> {
    let page = resolve_page(params.page)?;
    if auth_user.is_staff() && params.company_id.is_none() {
        return Err(AppError::BadRequest(
            "Parameter 'companyId' is required".to_string(),
        ));
    }
    let scope = VisibilityScope::resolve(&state.db, &auth_user).await?;
    let (companies, managements) = scope.bind_arrays();

    let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) {INVOICE_FILTER}"))
        .bind(params.company_id)
        .bind(&companies)
        .bind(&managements)
        .fetch_one(&state.db)
        .await?;

    let rows = sqlx::query_as::<_, PreInvoiceSummaryRow>(&format!(
        r#"
        SELECT pi.*,
               (SELECT COUNT(*) FROM pre_invoice_items i WHERE i.pre_invoice_id = pi.id) AS item_count,
               ARRAY(
                   SELECT ca.name FROM pre_invoice_items i
                   JOIN candidates ca ON ca.id = i.candidate_id
                   WHERE i.pre_invoice_id = pi.id
                   ORDER BY i.id
               ) AS professional_names
        {INVOICE_FILTER}
        ORDER BY pi.estimated_date DESC NULLS LAST, pi.id DESC
        LIMIT $4 OFFSET $5
        "#
    ))
    .bind(params.company_id)
    .bind(&companies)
    .bind(&managements)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(Paginated {
        total,
        batch: rows.into_iter().map(PreInvoiceSummary::from).collect(),
    }))
}

pub async fn get_pre_invoice(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<PreInvoiceDetail>> {
    let id = parse_id(&id, "id")?;
    let scope = VisibilityScope::resolve(&state.db, &auth_user).await?;
    let (companies, managements) = scope.bind_arrays();

    let pre_invoice = sqlx::query_as::<_, PreInvoice>(&format!(
        "SELECT pi.* {INVOICE_FILTER} AND pi.id = $4"
    ))
    .bind(None::<i32>)
    .bind(companies)
    .bind(managements)
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::not_found("Pre-invoice", id))?;

    let items = sqlx::query_as::<_, PreInvoiceItem>(
        "SELECT * FROM pre_invoice_items WHERE pre_invoice_id = $1 ORDER BY id",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(PreInvoiceDetail { pre_invoice, items }))
}

pub async fn create_pre_invoice(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppJson(payload): AppJson<PreInvoiceRequest>,
) -> AppResult<(StatusCode, Json<PreInvoiceDetail>)> {
    auth_user.require(STAFF)?;
    payload.validate()?;

    let detail = InvoicingService::new(state.db.clone())
        .create(payload, auth_user.user_id)
        .await?;

    Ok((StatusCode::CREATED, Json(detail)))
}

/// Updates the invoice and replaces all of its items.
pub async fn update_pre_invoice(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<PreInvoiceRequest>,
) -> AppResult<Json<PreInvoiceDetail>> {
    auth_user.require(STAFF)?;
    let id = parse_id(&id, "id")?;
    payload.validate()?;

    let detail = InvoicingService::new(state.db.clone())
        .update(id, payload, auth_user.user_id)
        .await?;

    Ok(Json(detail))
}

pub async fn change_pre_invoice_status(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<StatusChangeRequest>,
) -> AppResult<Json<StatusChanged>> {
    let id = parse_id(&id, "id")?;
    let change = StatusChange::parse(payload.action.as_deref())?;
    auth_user.require(REVIEWERS)?;

    let scope = VisibilityScope::resolve(&state.db, &auth_user).await?;
    let (companies, managements) = scope.bind_arrays();

    let updated_invoice = sqlx::query_as::<_, PreInvoice>(&format!(
        r#"
        UPDATE pre_invoices SET status = $5, updated_at = NOW()
        WHERE id IN (SELECT pi.id {INVOICE_FILTER} AND pi.id = $4)
        RETURNING *
        "#
    ))
    .bind(None::<i32>)
    .bind(companies)
    .bind(managements)
    .bind(id)
    .bind(change.target())
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::not_found("Pre-invoice", id))?;

    let message = match change {
        StatusChange::Approve => "Pre-invoice approved",
        StatusChange::Reject => "Pre-invoice rejected",
    };

    LOGGER.log_business_event(
        "pre_invoice_status_changed",
        Some(auth_user.user_id),
        event_fields([
            ("pre_invoice_id", id.into()),
            ("status", json!(change.target())),
        ]),
    );

    Ok(Json(StatusChanged {
        message: message.to_string(),
        updated_invoice,
    }))
}

pub async fn delete_pre_invoice(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    auth_user.require(STAFF)?;
    let id = parse_id(&id, "id")?;

    let result = sqlx::query("DELETE FROM pre_invoices WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Pre-invoice", id));
    }

    Ok(Json(json!({ "message": "Pre-invoice deleted" })))
}
