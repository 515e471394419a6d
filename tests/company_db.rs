//! Run with a reachable `DATABASE_URL`: `cargo test -- --ignored`.

mod common;

use axum::http::StatusCode;
use serde_json::Value;
use sqlx::PgPool;

use common::{body_json, build_test_app, get_auth, token_for};

async fn seed_company(pool: &PgPool, name: &str) -> i32 {
    sqlx::query_scalar("INSERT INTO company (name) VALUES ($1) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn first_company_is_alphabetical(pool: PgPool) {
    seed_company(&pool, "Zeta Labs").await;
    let acme = seed_company(&pool, "Acme").await;

    let response = get_auth(build_test_app(pool), "/company/first", &token_for(1, "admin")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["id"], acme);
    assert_eq!(json["name"], "Acme");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn first_company_respects_client_manager_scope(pool: PgPool) {
    seed_company(&pool, "Acme").await;
    let zeta = seed_company(&pool, "Zeta Labs").await;
    let manager: i32 = sqlx::query_scalar(
        "INSERT INTO users (name, email, password_hash, role_id) VALUES ('Mara', 'mara@example.com', 'x', 4) RETURNING id",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO users_company (user_id, company_id) VALUES ($1, $2)")
        .bind(manager)
        .bind(zeta)
        .execute(&pool)
        .await
        .unwrap();

    let response = get_auth(
        build_test_app(pool),
        "/company/first",
        &token_for(manager, "client_manager"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["id"], zeta);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn first_company_is_null_without_companies(pool: PgPool) {
    let response = get_auth(build_test_app(pool), "/company/first", &token_for(1, "admin")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, Value::Null);
}
