//! Bearer-token and role checks that reject requests before any query runs.

mod common;

use axum::http::{Method, StatusCode};
use common::{assert_error, build_offline_app, get_auth, send, token_for};
use serde_json::json;
use staffing_backend::utils::jwt::create_jwt;

#[tokio::test]
async fn health_needs_no_token() {
    let app = build_offline_app();
    let response = send(app, Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_token_is_forbidden() {
    let app = build_offline_app();
    let response = send(app, Method::GET, "/company", None, None).await;
    assert_error(response, StatusCode::FORBIDDEN, "FORBIDDEN").await;
}

#[tokio::test]
async fn token_signed_with_another_secret_is_forbidden() {
    let app = build_offline_app();
    let token = create_jwt(1, "Mallory", "m@example.com", "admin", "not-the-secret").unwrap();
    let response = get_auth(app, "/process", &token).await;
    assert_error(response, StatusCode::FORBIDDEN, "FORBIDDEN").await;
}

#[tokio::test]
async fn unknown_role_in_token_is_forbidden() {
    let app = build_offline_app();
    let response = get_auth(app, "/process", &token_for(1, "superuser")).await;
    assert_error(response, StatusCode::FORBIDDEN, "FORBIDDEN").await;
}

#[tokio::test]
async fn client_cannot_list_candidates() {
    let app = build_offline_app();
    let response = get_auth(app, "/candidates", &token_for(7, "client")).await;
    assert_error(response, StatusCode::FORBIDDEN, "FORBIDDEN").await;
}

#[tokio::test]
async fn client_manager_cannot_create_companies() {
    let app = build_offline_app();
    let response = send(
        app,
        Method::POST,
        "/company",
        Some(&token_for(7, "client_manager")),
        Some(json!({ "name": "Acme" })),
    )
    .await;
    assert_error(response, StatusCode::FORBIDDEN, "FORBIDDEN").await;
}

#[tokio::test]
async fn internal_user_cannot_manage_users() {
    let app = build_offline_app();
    let response = get_auth(app, "/users", &token_for(3, "internal")).await;
    assert_error(response, StatusCode::FORBIDDEN, "FORBIDDEN").await;
}

#[tokio::test]
async fn internal_user_cannot_approve_pre_invoices() {
    let app = build_offline_app();
    let response = common::patch_json_auth(
        app,
        "/pre_invoices/4",
        &token_for(3, "internal"),
        json!({ "action": "approve" }),
    )
    .await;
    assert_error(response, StatusCode::FORBIDDEN, "FORBIDDEN").await;
}
