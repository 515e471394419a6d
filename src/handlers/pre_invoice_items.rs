use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use sqlx::{Postgres, Transaction};
use validator::Validate;

use crate::{
    middleware::auth::{AuthUser, STAFF},
    models::pre_invoice::{
        CreatePreInvoiceItemRequest, PreInvoiceItem, PreInvoiceItemListQuery,
        UpdatePreInvoiceItemRequest,
    },
    services::invoicing::LineItemDraft,
    utils::{
        errors::{AppError, AppResult},
        extract::{AppJson, AppQuery},
        ids::parse_id,
        pagination::{resolve_page, Paginated},
    },
    AppState,
};

async fn refresh_invoice_total(
    tx: &mut Transaction<'_, Postgres>,
    pre_invoice_id: i32,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE pre_invoices
        SET total_value = COALESCE(
                (SELECT SUM(total) FROM pre_invoice_items WHERE pre_invoice_id = $1), 0),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(pre_invoice_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn list_pre_invoice_items(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppQuery(params): AppQuery<PreInvoiceItemListQuery>,
) -> AppResult<Json<Paginated<PreInvoiceItem>>> {
    let page = resolve_page(params.page)?;
    auth_user.require(STAFF)?;

    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM pre_invoice_items WHERE ($1::int IS NULL OR pre_invoice_id = $1)",
    )
    .bind(params.pre_invoice_id)
    .fetch_one(&state.db)
    .await?;

    let batch = sqlx::query_as::<_, PreInvoiceItem>(
        r#"
        SELECT * FROM pre_invoice_items
        WHERE ($1::int IS NULL OR pre_invoice_id = $1)
        ORDER BY id
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(params.pre_invoice_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Json(Paginated { total, batch }))
}

pub async fn get_pre_invoice_item(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<PreInvoiceItem>> {
    let id = parse_id(&id, "id")?;
    auth_user.require(STAFF)?;

    let item = sqlx::query_as::<_, PreInvoiceItem>("SELECT * FROM pre_invoice_items WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("Pre-invoice item", id))?;

    Ok(Json(item))
}

pub async fn create_pre_invoice_item(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppJson(payload): AppJson<CreatePreInvoiceItemRequest>,
) -> AppResult<(StatusCode, Json<PreInvoiceItem>)> {
    auth_user.require(STAFF)?;
    payload.validate()?;

    let draft = LineItemDraft {
        candidate_id: payload.candidate_id,
        service: payload.service.clone().unwrap_or_default(),
        description: payload.description.clone().unwrap_or_default(),
        ..LineItemDraft::compute(
            payload.rate.unwrap_or_default(),
            payload.hours.unwrap_or_default(),
            payload.subtotal,
            payload.vat,
        )?
    };

    let mut tx = state.db.begin().await?;
    let item = sqlx::query_as::<_, PreInvoiceItem>(
        r#"
        INSERT INTO pre_invoice_items
            (pre_invoice_id, candidate_id, service, rate, hours, subtotal, vat, total, description)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(payload.pre_invoice_id)
    .bind(draft.candidate_id)
    .bind(&draft.service)
    .bind(draft.rate)
    .bind(draft.hours)
    .bind(draft.subtotal)
    .bind(draft.vat)
    .bind(draft.total)
    .bind(&draft.description)
    .fetch_one(&mut *tx)
    .await?;

    refresh_invoice_total(&mut tx, item.pre_invoice_id).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(item)))
}

/// Merges the supplied fields and recomputes the line amounts.
pub async fn update_pre_invoice_item(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<UpdatePreInvoiceItemRequest>,
) -> AppResult<Json<PreInvoiceItem>> {
    auth_user.require(STAFF)?;
    let id = parse_id(&id, "id")?;
    payload.validate()?;

    let mut tx = state.db.begin().await?;
    let current = sqlx::query_as::<_, PreInvoiceItem>(
        "SELECT * FROM pre_invoice_items WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::not_found("Pre-invoice item", id))?;

    let rate = payload.rate.unwrap_or(current.rate);
    let hours = payload.hours.unwrap_or(current.hours);
    // A changed rate or hour count recomputes the subtotal unless one is supplied.
    let subtotal = payload.subtotal.or_else(|| {
        (payload.rate.is_none() && payload.hours.is_none()).then_some(current.subtotal)
    });
    let draft = LineItemDraft {
        candidate_id: payload.candidate_id.or(current.candidate_id),
        service: payload.service.clone().unwrap_or(current.service),
        description: payload.description.clone().unwrap_or(current.description),
        ..LineItemDraft::compute(rate, hours, subtotal, payload.vat.or(Some(current.vat)))?
    };

    let item = sqlx::query_as::<_, PreInvoiceItem>(
        r#"
        UPDATE pre_invoice_items
        SET candidate_id = $2, service = $3, rate = $4, hours = $5,
            subtotal = $6, vat = $7, total = $8, description = $9, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(draft.candidate_id)
    .bind(&draft.service)
    .bind(draft.rate)
    .bind(draft.hours)
    .bind(draft.subtotal)
    .bind(draft.vat)
    .bind(draft.total)
    .bind(&draft.description)
    .fetch_one(&mut *tx)
    .await?;

    refresh_invoice_total(&mut tx, item.pre_invoice_id).await?;
    tx.commit().await?;

    Ok(Json(item))
}

pub async fn delete_pre_invoice_item(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    auth_user.require(STAFF)?;
    let id = parse_id(&id, "id")?;

    let mut tx = state.db.begin().await?;
    let pre_invoice_id = sqlx::query_scalar::<_, i32>(
        "DELETE FROM pre_invoice_items WHERE id = $1 RETURNING pre_invoice_id",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::not_found("Pre-invoice item", id))?;

    refresh_invoice_total(&mut tx, pre_invoice_id).await?;
    tx.commit().await?;

    Ok(Json(json!({ "message": "Pre-invoice item deleted" })))
}
