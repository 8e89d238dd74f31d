//! Response envelopes shared by every API endpoint
//!
//! Success: `{"success": true, "data": ..., "timestamp": ...}`
//! Failure: `{"success": false, "error": {"code", "message"}, "timestamp": ...}`

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::middleware::generate_etag;
use crate::db::is_unavailable;
use crate::models::PagedResult;
use crate::services::{
    CategoryServiceError, FlightServiceError, PortfolioError, PostServiceError, TagServiceError,
};

/// Successful response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: DateTime<Utc>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: Utc::now(),
        }
    }
}

/// The `ETag` is derived from `data` alone so it stays stable across
/// envelope timestamps.
impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let etag = serde_json::to_vec(&self.data)
            .ok()
            .and_then(|bytes| HeaderValue::from_str(&generate_etag(&bytes)).ok());
        let mut response = Json(self).into_response();
        if let Some(etag) = etag {
            response.headers_mut().insert(header::ETAG, etag);
        }
        response
    }
}

/// Wrap `data` in the success envelope
pub fn ok<T: Serialize>(data: T) -> ApiResponse<T> {
    ApiResponse::new(data)
}

/// Like [`ok`] with `201 Created`
pub fn created<T: Serialize>(data: T) -> (StatusCode, ApiResponse<T>) {
    (StatusCode::CREATED, ApiResponse::new(data))
}

/// Paginated list payload
#[derive(Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> From<PagedResult<T>> for Page<T> {
    fn from(result: PagedResult<T>) -> Self {
        let total_pages = result.total_pages();
        let (has_next, has_prev) = (result.has_next(), result.has_prev());
        Self {
            items: result.items,
            total: result.total,
            page: result.page,
            per_page: result.per_page,
            total_pages,
            has_next,
            has_prev,
        }
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub success: bool,
    pub error: ApiErrorDetail,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
            },
            timestamp: Utc::now(),
        }
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new("SERVICE_UNAVAILABLE", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            "SERVICE_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Map a storage failure: unreachable database → 503, anything else → 500.
    /// The cause is logged; clients only see a generic message.
    pub fn from_internal(err: &anyhow::Error) -> Self {
        if is_unavailable(err) {
            tracing::error!(error = ?err, "Database unavailable");
            Self::unavailable("Database temporarily unavailable")
        } else {
            tracing::error!(error = ?err, "Internal error");
            Self::internal_error("Internal server error")
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<PostServiceError> for ApiError {
    fn from(err: PostServiceError) -> Self {
        match err {
            PostServiceError::NotFound(msg) => Self::not_found(msg),
            PostServiceError::ValidationError(msg) => Self::validation_error(msg),
            PostServiceError::DuplicateSlug(slug) => {
                Self::conflict(format!("Slug already in use: {}", slug))
            }
            PostServiceError::InternalError(e) => Self::from_internal(&e),
        }
    }
}

impl From<CategoryServiceError> for ApiError {
    fn from(err: CategoryServiceError) -> Self {
        match err {
            CategoryServiceError::NotFound(msg) => Self::not_found(msg),
            CategoryServiceError::ValidationError(msg) => Self::validation_error(msg),
            CategoryServiceError::DuplicateName(name) => {
                Self::conflict(format!("Category already exists: {}", name))
            }
            CategoryServiceError::InternalError(e) => Self::from_internal(&e),
        }
    }
}

impl From<TagServiceError> for ApiError {
    fn from(err: TagServiceError) -> Self {
        match err {
            TagServiceError::NotFound(msg) => Self::not_found(msg),
            TagServiceError::ValidationError(msg) => Self::validation_error(msg),
            TagServiceError::InternalError(e) => Self::from_internal(&e),
        }
    }
}

impl From<PortfolioError> for ApiError {
    fn from(err: PortfolioError) -> Self {
        match err {
            PortfolioError::NotFound(msg) => Self::not_found(msg),
            PortfolioError::ValidationError(msg) => Self::validation_error(msg),
            PortfolioError::Duplicate(key) => Self::conflict(format!("Already exists: {}", key)),
            PortfolioError::InternalError(e) => Self::from_internal(&e),
        }
    }
}

impl From<FlightServiceError> for ApiError {
    fn from(err: FlightServiceError) -> Self {
        match err {
            FlightServiceError::NotFound(msg) => Self::not_found(msg),
            FlightServiceError::ValidationError(msg) => Self::validation_error(msg),
            FlightServiceError::Duplicate(key) => {
                Self::conflict(format!("Already exists: {}", key))
            }
            FlightServiceError::InternalError(e) => Self::from_internal(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ListParams;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::unavailable("x").status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ApiError::new("BOOM", "x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_envelope_shape() {
        let json = serde_json::to_value(ApiError::not_found("Post missing")).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "NOT_FOUND");
        assert_eq!(json["error"]["message"], "Post missing");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_success_envelope_shape() {
        let json = serde_json::to_value(ok(vec![1, 2])).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_etag_ignores_timestamp() {
        let first = ok("same").into_response();
        let second = ok("same").into_response();
        assert!(first.headers().contains_key(header::ETAG));
        assert_eq!(first.headers()[header::ETAG], second.headers()[header::ETAG]);
    }

    #[test]
    fn test_service_error_conversion() {
        let err: ApiError = PostServiceError::DuplicateSlug("hello".into()).into();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err: ApiError = PortfolioError::ValidationError("short".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err: ApiError = FlightServiceError::InternalError(anyhow::anyhow!("disk")).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error.message, "Internal server error");
    }

    #[test]
    fn test_closed_pool_maps_to_unavailable() {
        let err = anyhow::Error::new(sqlx::Error::PoolClosed).context("Failed to list posts");
        assert_eq!(ApiError::from_internal(&err).status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_page_from_paged_result() {
        let page: Page<i32> = PagedResult::new(vec![1, 2], 25, &ListParams::new(2, 10)).into();
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.page, 2);
        assert!(page.has_next);
        assert!(page.has_prev);

        let last: Page<i32> = PagedResult::new(vec![1], 21, &ListParams::new(3, 10)).into();
        assert!(!last.has_next);
        assert!(last.has_prev);

        let json = serde_json::to_value(Page::from(PagedResult::new(
            vec![1],
            1,
            &ListParams::new(1, 10),
        )))
        .unwrap();
        assert_eq!(json["has_next"], false);
        assert_eq!(json["has_prev"], false);
    }
}
