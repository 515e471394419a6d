use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Query, Request,
    },
    http::{request::Parts, StatusCode},
    Json,
};
use serde::de::DeserializeOwned;

use crate::utils::errors::AppError;

/// `Json` whose rejections render as the standard error body.
pub struct AppJson<T>(pub T);

/// `Query` whose rejections render as the standard error body.
pub struct AppQuery<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(AppJson(value))
    }
}

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for AppQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(AppQuery(value))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => AppError::PayloadTooLarge(rejection.body_text()),
            _ => AppError::BadRequest(rejection.body_text()),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Paging {
        page: Option<i64>,
    }

    #[tokio::test]
    async fn malformed_query_becomes_bad_request() {
        let request = axum::http::Request::builder()
            .uri("/candidates?page=abc")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let result = AppQuery::<Paging>::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn well_formed_query_is_decoded() {
        let request = axum::http::Request::builder()
            .uri("/candidates?page=3")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let AppQuery(paging) = AppQuery::<Paging>::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(paging.page, Some(3));
    }

    #[tokio::test]
    async fn missing_content_type_becomes_bad_request() {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/notes")
            .body(Body::from("{}"))
            .unwrap();

        let result = AppJson::<serde_json::Value>::from_request(request, &()).await;
        match result {
            Err(error) => assert_eq!(error.status(), StatusCode::BAD_REQUEST),
            Ok(_) => panic!("expected a rejection"),
        }
    }
}
