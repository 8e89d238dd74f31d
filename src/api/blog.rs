//! Blog API endpoints
//!
//! - GET    /api/blog                      - Published posts (page, per_page, category, tag, q)
//! - GET    /api/blog/search               - Keyword search (q required)
//! - GET    /api/blog/{slug}               - Published post detail
//! - POST   /api/blog                      - Create post (admin)
//! - PUT    /api/blog/{id}                 - Update post (admin)
//! - DELETE /api/blog/{id}                 - Delete post (admin)
//! - GET    /api/blog/categories           - Categories with post counts
//! - POST   /api/blog/categories           - Create category (admin)
//! - DELETE /api/blog/categories/{id}      - Delete category (admin)
//! - GET    /api/blog/tags                 - Tag cloud
//! - GET    /api/blog/tags/{slug}          - Posts with a tag
//! - GET    /rss.xml                       - RSS feed

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::api::extract::{Json, Path, Query};
use crate::api::middleware::AppState;
use crate::api::responses::{created, ok, ApiError, ApiResponse, Page};
use crate::models::{
    Category, CategoryWithCount, CreateCategoryInput, CreatePostInput, ListParams, PostDetail,
    Tag, TagWithCount, UpdatePostInput,
};
use crate::services::PostQuery;

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    10
}

/// Query parameters for the public post list
#[derive(Debug, Deserialize)]
pub struct BlogListQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub q: Option<String>,
}

impl BlogListQuery {
    fn params(&self) -> ListParams {
        ListParams::new(self.page, self.per_page)
    }
}

/// Query parameters for search
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

/// Posts carrying one tag
#[derive(Debug, Serialize)]
pub struct TagPostsResponse {
    pub tag: Tag,
    #[serde(flatten)]
    pub posts: Page<PostDetail>,
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub id: i64,
}

/// GET /api/blog
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<BlogListQuery>,
) -> Result<ApiResponse<Page<PostDetail>>, ApiError> {
    let params = query.params();
    let filters = PostQuery {
        category: query.category,
        tag: query.tag,
        q: query.q,
    };
    let result = state.post_service.list_published(&filters, &params).await?;
    Ok(ok(result.into()))
}

/// GET /api/blog/search
pub async fn search_posts(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<ApiResponse<Page<PostDetail>>, ApiError> {
    if query.q.trim().is_empty() {
        return Err(ApiError::validation_error("Query parameter 'q' is required"));
    }
    let params = ListParams::new(query.page, query.per_page);
    let result = state.post_service.search(&query.q, &params).await?;
    Ok(ok(result.into()))
}

/// GET /api/blog/{slug}
pub async fn get_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<ApiResponse<PostDetail>, ApiError> {
    Ok(ok(state.post_service.get_published(&slug).await?))
}

/// POST /api/blog
pub async fn create_post(
    State(state): State<AppState>,
    Json(input): Json<CreatePostInput>,
) -> Result<(StatusCode, ApiResponse<PostDetail>), ApiError> {
    Ok(created(state.post_service.create(input).await?))
}

/// PUT /api/blog/{id}
pub async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdatePostInput>,
) -> Result<ApiResponse<PostDetail>, ApiError> {
    Ok(ok(state.post_service.update(id, input).await?))
}

/// DELETE /api/blog/{id}
pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<Deleted>, ApiError> {
    state.post_service.delete(id).await?;
    Ok(ok(Deleted { id }))
}

/// GET /api/blog/categories
pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<CategoryWithCount>>, ApiError> {
    Ok(ok(state.category_service.list_with_counts().await?))
}

/// POST /api/blog/categories
pub async fn create_category(
    State(state): State<AppState>,
    Json(input): Json<CreateCategoryInput>,
) -> Result<(StatusCode, ApiResponse<Category>), ApiError> {
    Ok(created(state.category_service.create(input).await?))
}

/// DELETE /api/blog/categories/{id}
///
/// Posts in the category are kept and lose their category.
pub async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<Deleted>, ApiError> {
    state.category_service.delete(id).await?;
    Ok(ok(Deleted { id }))
}

/// GET /api/blog/tags
pub async fn tag_cloud(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<TagWithCount>>, ApiError> {
    Ok(ok(state.tag_service.cloud().await?))
}

/// GET /api/blog/tags/{slug}
pub async fn posts_by_tag(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<ApiResponse<TagPostsResponse>, ApiError> {
    let params = ListParams::new(query.page, query.per_page);
    let (tag, posts) = state.post_service.list_by_tag(&slug, &params).await?;
    Ok(ok(TagPostsResponse {
        tag,
        posts: posts.into(),
    }))
}

/// GET /rss.xml
pub async fn rss_feed(State(state): State<AppState>) -> Result<Response, ApiError> {
    let xml = state.feed_service.rss().await?;
    Ok((
        [(header::CONTENT_TYPE, "application/rss+xml; charset=utf-8")],
        xml,
    )
        .into_response())
}
