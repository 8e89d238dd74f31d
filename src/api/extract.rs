//! Request extractors that reject with the API error envelope
//!
//! Drop-in replacements for axum's `Json`, `Query` and `Path`. A body,
//! query string or path segment that fails to parse becomes a
//! `VALIDATION_ERROR` instead of axum's plain-text rejection.

use axum::{
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;

use crate::api::responses::ApiError;

/// JSON request body
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

/// Query string parameters
#[derive(Debug, Clone, Copy, Default)]
pub struct Query<T>(pub T);

/// Path parameters
#[derive(Debug, Clone, Copy, Default)]
pub struct Path<T>(pub T);

impl<T, S> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        axum::Json::<T>::from_request(req, state)
            .await
            .map(|axum::Json(value)| Self(value))
            .map_err(|rejection| ApiError::validation_error(rejection.body_text()))
    }
}

impl<T, S> FromRequestParts<S> for Query<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        axum::extract::Query::<T>::from_request_parts(parts, state)
            .await
            .map(|axum::extract::Query(value)| Self(value))
            .map_err(|rejection| ApiError::validation_error(rejection.body_text()))
    }
}

impl<T, S> FromRequestParts<S> for Path<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        axum::extract::Path::<T>::from_request_parts(parts, state)
            .await
            .map(|axum::extract::Path(value)| Self(value))
            .map_err(|rejection| ApiError::validation_error(rejection.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http, http::StatusCode};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Paging {
        page: u32,
    }

    #[tokio::test]
    async fn test_query_rejection_is_validation_error() {
        let (mut parts, _) = http::Request::builder()
            .uri("/api/blog?page=-1")
            .body(Body::empty())
            .unwrap()
            .into_parts();

        let err = Query::<Paging>::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.error.code, "VALIDATION_ERROR");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_query_accepts_valid_input() {
        let (mut parts, _) = http::Request::builder()
            .uri("/api/blog?page=3")
            .body(Body::empty())
            .unwrap()
            .into_parts();

        let Query(paging) = Query::<Paging>::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(paging.page, 3);
    }

    #[tokio::test]
    async fn test_json_rejection_is_validation_error() {
        let req = http::Request::builder()
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let err = Json::<Paging>::from_request(req, &()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(!err.error.message.is_empty());
    }
}
