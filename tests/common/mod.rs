#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tower::ServiceExt;

use staffing_backend::{build_router, utils::config::Config, utils::jwt::create_jwt, AppState};

pub const TEST_SECRET: &str = "test-secret";

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/staffing_test".to_string(),
        jwt_secret: TEST_SECRET.to_string(),
        cors_origin: "http://localhost:3000".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        max_body_mb: 1,
        max_connections: 2,
    }
}

/// Router over a pool that never connects. Requests that reach the database
/// fail, so only use it for paths rejected before any query runs.
pub fn build_offline_app() -> Router {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/staffing_test")
        .expect("lazy pool should build");
    build_test_app(pool)
}

pub fn build_test_app(pool: PgPool) -> Router {
    let state = AppState {
        db: pool,
        config: Arc::new(test_config()),
    };
    build_router(state).expect("router should build")
}

pub fn token_for(user_id: i32, role: &str) -> String {
    create_jwt(
        user_id,
        "Test User",
        &format!("user{user_id}@example.com"),
        role,
        TEST_SECRET,
    )
    .expect("token should encode")
}

pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    app.oneshot(builder.body(body).expect("request should build"))
        .await
        .expect("router is infallible")
}

/// Sends `body` verbatim with the given content type.
pub async fn send_raw(
    app: Router,
    method: Method,
    uri: &str,
    token: &str,
    content_type: &str,
    body: &'static str,
) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .expect("request should build");

    app.oneshot(request).await.expect("router is infallible")
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response {
    send(app, Method::GET, uri, Some(token), None).await
}

pub async fn put_json_auth(app: Router, uri: &str, token: &str, body: Value) -> Response {
    send(app, Method::PUT, uri, Some(token), Some(body)).await
}

pub async fn post_json_auth(app: Router, uri: &str, token: &str, body: Value) -> Response {
    send(app, Method::POST, uri, Some(token), Some(body)).await
}

pub async fn patch_json_auth(app: Router, uri: &str, token: &str, body: Value) -> Response {
    send(app, Method::PATCH, uri, Some(token), Some(body)).await
}

pub async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

pub async fn assert_error(response: Response, status: StatusCode, code: &str) {
    assert_eq!(response.status(), status);
    let json = body_json(response).await;
    assert_eq!(json["code"], code, "unexpected error body: {json}");
}
