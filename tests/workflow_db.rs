//! Database-backed workflow tests. Run with a reachable `DATABASE_URL`:
//! `cargo test -- --ignored`.

mod common;

use axum::http::StatusCode;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;

use common::{body_json, build_test_app, put_json_auth, token_for};
use staffing_backend::{
    models::{
        post_sales::CreatePostSalesRequest,
        pre_invoice::PreInvoiceRequest,
        process::CloseOptions,
    },
    services::{
        closure::ClosureService, evaluations::EvaluationService, invoicing::InvoicingService,
        scope::VisibilityScope,
    },
    utils::errors::AppError,
};

async fn seed_company(pool: &PgPool) -> (i32, i32) {
    let company_id: i32 =
        sqlx::query_scalar("INSERT INTO company (name) VALUES ('Acme') RETURNING id")
            .fetch_one(pool)
            .await
            .unwrap();
    let management_id: i32 = sqlx::query_scalar(
        "INSERT INTO management (company_id, name) VALUES ($1, 'Platform') RETURNING id",
    )
    .bind(company_id)
    .fetch_one(pool)
    .await
    .unwrap();
    (company_id, management_id)
}

async fn seed_process(pool: &PgPool, management_id: Option<i32>) -> i32 {
    sqlx::query_scalar(
        "INSERT INTO process (job_offer, management_id, status) VALUES ('Data Engineer', $1, 'Activo') RETURNING id",
    )
    .bind(management_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn seed_candidate(pool: &PgPool, name: &str) -> i32 {
    sqlx::query_scalar("INSERT INTO candidates (name, email) VALUES ($1, $2) RETURNING id")
        .bind(name)
        .bind(format!("{}@example.com", name.to_lowercase()))
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn associate(pool: &PgPool, candidate_id: Option<i32>, process_id: i32, stage: &str) {
    sqlx::query(
        "INSERT INTO candidate_process (candidate_id, process_id, stage) VALUES ($1, $2, $3::candidate_stage)",
    )
    .bind(candidate_id)
    .bind(process_id)
    .bind(stage)
    .execute(pool)
    .await
    .unwrap();
}

async fn engagement_count(pool: &PgPool, management_id: i32) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM candidate_management WHERE management_id = $1")
        .bind(management_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn closing_promotes_only_selected_candidates(pool: PgPool) {
    let (_, management_id) = seed_company(&pool).await;
    let process_id = seed_process(&pool, Some(management_id)).await;
    let ana = seed_candidate(&pool, "Ana").await;
    let luis = seed_candidate(&pool, "Luis").await;
    let eva = seed_candidate(&pool, "Eva").await;
    associate(&pool, Some(ana), process_id, "seleccionado").await;
    associate(&pool, Some(luis), process_id, "seleccionado").await;
    associate(&pool, Some(eva), process_id, "entrevistas").await;

    let options = CloseOptions {
        start_date: NaiveDate::from_ymd_opt(2024, 3, 1),
        rate: Some(Decimal::new(45, 0)),
    };
    let outcome = ClosureService::new(pool.clone())
        .close(process_id, options, &VisibilityScope::Unrestricted, 1)
        .await
        .unwrap();

    assert_eq!(outcome.candidate_managements.len(), 2);
    assert!(outcome.process.is_closed());
    assert!(outcome.process.closed_at.is_some());
    for engagement in &outcome.candidate_managements {
        assert_eq!(engagement.status, "activo");
        assert_eq!(engagement.position.as_deref(), Some("Data Engineer"));
        assert_eq!(engagement.rate, Some(Decimal::new(45, 0)));
    }
    assert_eq!(engagement_count(&pool, management_id).await, 2);

    let again = ClosureService::new(pool.clone())
        .close(process_id, CloseOptions::default(), &VisibilityScope::Unrestricted, 1)
        .await;
    assert!(matches!(again, Err(AppError::Conflict(_))));
    assert_eq!(engagement_count(&pool, management_id).await, 2);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn failed_closure_leaves_process_open(pool: PgPool) {
    let (_, management_id) = seed_company(&pool).await;
    let process_id = seed_process(&pool, Some(management_id)).await;
    let ana = seed_candidate(&pool, "Ana").await;
    associate(&pool, Some(ana), process_id, "seleccionado").await;
    associate(&pool, None, process_id, "seleccionado").await;

    let result = ClosureService::new(pool.clone())
        .close(process_id, CloseOptions::default(), &VisibilityScope::Unrestricted, 1)
        .await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    let status: Option<String> = sqlx::query_scalar("SELECT status FROM process WHERE id = $1")
        .bind(process_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status.as_deref(), Some("Activo"));
    assert_eq!(engagement_count(&pool, management_id).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn closing_missing_process_is_not_found(pool: PgPool) {
    let result = ClosureService::new(pool)
        .close(9999, CloseOptions::default(), &VisibilityScope::Unrestricted, 1)
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn updating_pre_invoice_replaces_every_item(pool: PgPool) {
    let (company_id, _) = seed_company(&pool).await;
    let ana = seed_candidate(&pool, "Ana").await;
    let luis = seed_candidate(&pool, "Luis").await;
    let service = InvoicingService::new(pool.clone());

    let request: PreInvoiceRequest = serde_json::from_value(json!({
        "company_id": company_id,
        "professionals": [
            { "id": ana, "hoursWorked": 10, "hourValue": 50, "vat": 19 },
            { "id": luis, "hoursWorked": 2, "hourValue": 50 }
        ]
    }))
    .unwrap();
    let created = service.create(request, 1).await.unwrap();
    assert_eq!(created.items.len(), 2);
    assert_eq!(created.pre_invoice.total_value, Decimal::new(695, 0));

    let replacement: PreInvoiceRequest = serde_json::from_value(json!({
        "professionals": [
            { "id": luis, "hoursWorked": 3, "hourValue": 100 }
        ]
    }))
    .unwrap();
    let updated = service
        .update(created.pre_invoice.id, replacement, 1)
        .await
        .unwrap();

    assert_eq!(updated.items.len(), 1);
    assert_eq!(updated.items[0].candidate_id, Some(luis));
    assert_eq!(updated.pre_invoice.total_value, Decimal::new(300, 0));
    assert_eq!(updated.pre_invoice.company_id, Some(company_id));

    let stored: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM pre_invoice_items WHERE pre_invoice_id = $1")
            .bind(created.pre_invoice.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(stored, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn updating_missing_pre_invoice_keeps_nothing(pool: PgPool) {
    let request: PreInvoiceRequest =
        serde_json::from_value(json!({ "professionals": [] })).unwrap();
    let result = InvoicingService::new(pool).update(4242, request, 1).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn evaluations_refresh_engagement_rate(pool: PgPool) {
    let (_, management_id) = seed_company(&pool).await;
    let ana = seed_candidate(&pool, "Ana").await;
    let engagement_id: i32 = sqlx::query_scalar(
        "INSERT INTO candidate_management (candidate_id, management_id) VALUES ($1, $2) RETURNING id",
    )
    .bind(ana)
    .bind(management_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    let service = EvaluationService::new(pool.clone());

    let first: CreatePostSalesRequest = serde_json::from_value(json!({
        "candidate_management_id": engagement_id,
        "eval_stack": 4, "eval_comunicacion": 4, "eval_motivacion": 4, "eval_cumplimiento": 4
    }))
    .unwrap();
    let recorded = service.record(first, &VisibilityScope::Unrestricted, 1).await.unwrap();
    assert_eq!(recorded.rate, Decimal::new(4, 0));

    let second: CreatePostSalesRequest = serde_json::from_value(json!({
        "candidate_management_id": engagement_id,
        "eval_stack": 5, "eval_comunicacion": 3, "eval_motivacion": 5, "eval_cumplimiento": 4
    }))
    .unwrap();
    let recorded = service.record(second, &VisibilityScope::Unrestricted, 1).await.unwrap();
    assert_eq!(recorded.evaluations, 2);
    assert_eq!(recorded.rate, Decimal::new(4125, 3));

    let stored: Option<Decimal> =
        sqlx::query_scalar("SELECT rate FROM candidate_management WHERE id = $1")
            .bind(engagement_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(stored, Some(Decimal::new(4125, 3)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn stage_actions_move_candidates_through_pipeline(pool: PgPool) {
    let (_, management_id) = seed_company(&pool).await;
    let process_id = seed_process(&pool, Some(management_id)).await;
    let ana = seed_candidate(&pool, "Ana").await;
    associate(&pool, Some(ana), process_id, "entrevistas").await;
    let token = token_for(1, "admin");
    let uri = format!("/candidate_process/process/{process_id}");

    let response = put_json_auth(
        build_test_app(pool.clone()),
        &uri,
        &token,
        json!({ "action": "select", "candidateId": ana }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["candidateProcess"]["stage"], "seleccionado");

    let response = put_json_auth(
        build_test_app(pool.clone()),
        &uri,
        &token,
        json!({ "action": "disqualify", "candidateId": ana.to_string() }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["candidateProcess"]["stage"], "descartado");

    let response = put_json_auth(
        build_test_app(pool.clone()),
        &uri,
        &token,
        json!({ "action": "back-interview", "candidateId": 9999 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn edit_with_unknown_candidate_adds_nobody(pool: PgPool) {
    let (_, management_id) = seed_company(&pool).await;
    let process_id = seed_process(&pool, Some(management_id)).await;
    let ana = seed_candidate(&pool, "Ana").await;
    let luis = seed_candidate(&pool, "Luis").await;
    associate(&pool, Some(ana), process_id, "entrevistas").await;

    let response = put_json_auth(
        build_test_app(pool.clone()),
        &format!("/candidate_process/process/{process_id}"),
        &token_for(1, "admin"),
        json!({
            "action": "edit",
            "candidateId": ana,
            "data": { "technical_skills": "Rust", "candidate_ids": [luis, 9999] }
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM candidate_process WHERE process_id = $1")
        .bind(process_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);

    let skills: Option<String> = sqlx::query_scalar(
        "SELECT technical_skills FROM candidate_process WHERE candidate_id = $1",
    )
    .bind(ana)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(skills, None);
}
