//! Portfolio API endpoints
//!
//! Public reads return published projects only; every write requires the
//! admin token.

use axum::{extract::State, http::StatusCode};
use serde::Deserialize;

use crate::api::blog::Deleted;
use crate::api::extract::{Json, Path, Query};
use crate::api::middleware::AppState;
use crate::api::responses::{created, ok, ApiError, ApiResponse};
use crate::models::{
    CreateProjectInput, CreateSkillInput, CreateTestimonialInput, PortfolioOverview,
    PortfolioSearchResult, Project, ProjectFilter, ProjectStatus, Skill, SkillGroup, Testimonial,
    UpdateProjectInput,
};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProjectListQuery {
    pub featured: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TestimonialListQuery {
    #[serde(default)]
    pub featured: bool,
}

/// GET /api/portfolio
pub async fn overview(
    State(state): State<AppState>,
) -> Result<ApiResponse<PortfolioOverview>, ApiError> {
    Ok(ok(state.portfolio_service.overview().await?))
}

/// GET /api/portfolio/search
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<ApiResponse<PortfolioSearchResult>, ApiError> {
    Ok(ok(state.portfolio_service.search(&query.q).await?))
}

/// GET /api/portfolio/projects
pub async fn list_projects(
    State(state): State<AppState>,
    Query(query): Query<ProjectListQuery>,
) -> Result<ApiResponse<Vec<Project>>, ApiError> {
    let filter = ProjectFilter {
        status: Some(ProjectStatus::Published),
        featured: query.featured,
    };
    Ok(ok(state.portfolio_service.list_projects(filter).await?))
}

/// POST /api/portfolio/projects
pub async fn create_project(
    State(state): State<AppState>,
    Json(input): Json<CreateProjectInput>,
) -> Result<(StatusCode, ApiResponse<Project>), ApiError> {
    Ok(created(state.portfolio_service.create_project(input).await?))
}

/// GET /api/portfolio/projects/{slug}
pub async fn get_project(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<ApiResponse<Project>, ApiError> {
    Ok(ok(state.portfolio_service.get_published_project(&slug).await?))
}

/// PUT /api/portfolio/projects/{id}
pub async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateProjectInput>,
) -> Result<ApiResponse<Project>, ApiError> {
    Ok(ok(state.portfolio_service.update_project(id, input).await?))
}

/// DELETE /api/portfolio/projects/{id}
pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<Deleted>, ApiError> {
    state.portfolio_service.delete_project(id).await?;
    Ok(ok(Deleted { id }))
}

/// GET /api/portfolio/skills
pub async fn list_skills(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<SkillGroup>>, ApiError> {
    Ok(ok(state.portfolio_service.skill_groups().await?))
}

/// POST /api/portfolio/skills
pub async fn create_skill(
    State(state): State<AppState>,
    Json(input): Json<CreateSkillInput>,
) -> Result<(StatusCode, ApiResponse<Skill>), ApiError> {
    Ok(created(state.portfolio_service.create_skill(input).await?))
}

/// DELETE /api/portfolio/skills/{id}
pub async fn delete_skill(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<Deleted>, ApiError> {
    state.portfolio_service.delete_skill(id).await?;
    Ok(ok(Deleted { id }))
}

/// GET /api/portfolio/testimonials
pub async fn list_testimonials(
    State(state): State<AppState>,
    Query(query): Query<TestimonialListQuery>,
) -> Result<ApiResponse<Vec<Testimonial>>, ApiError> {
    Ok(ok(state
        .portfolio_service
        .list_testimonials(query.featured)
        .await?))
}

/// POST /api/portfolio/testimonials
pub async fn create_testimonial(
    State(state): State<AppState>,
    Json(input): Json<CreateTestimonialInput>,
) -> Result<(StatusCode, ApiResponse<Testimonial>), ApiError> {
    Ok(created(state.portfolio_service.create_testimonial(input).await?))
}

/// DELETE /api/portfolio/testimonials/{id}
pub async fn delete_testimonial(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<Deleted>, ApiError> {
    state.portfolio_service.delete_testimonial(id).await?;
    Ok(ok(Deleted { id }))
}
