//! Portfolio service: projects, skills and testimonials
//!
//! Projects follow the same draft/published rule as posts. Skill
//! proficiency and testimonial rating are on a 1 to 5 scale.

use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::MemoryCache;
use crate::db::repositories::{ProjectRepository, SkillRepository, TestimonialRepository};
use crate::models::{
    contains_pattern, CreateProjectInput, CreateSkillInput, CreateTestimonialInput,
    PortfolioOverview, PortfolioSearchResult, Project, ProjectFilter, ProjectStatus, Skill,
    SkillGroup, Testimonial, UpdateProjectInput,
};
use crate::services::{generate_slug, non_blank, slug_candidates};

const CACHE_KEY_OVERVIEW: &str = "portfolio:overview";
const CACHE_KEY_SKILLS: &str = "portfolio:skills";
const PORTFOLIO_TTL: Duration = Duration::from_secs(600);

/// Shortest accepted search query, in characters
pub const MIN_QUERY_LEN: usize = 2;

const SCORE_RANGE: std::ops::RangeInclusive<i32> = 1..=5;

#[derive(Debug, thiserror::Error)]
pub enum PortfolioError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Already exists: {0}")]
    Duplicate(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct PortfolioService {
    projects: Arc<dyn ProjectRepository>,
    skills: Arc<dyn SkillRepository>,
    testimonials: Arc<dyn TestimonialRepository>,
    cache: Arc<MemoryCache>,
}

impl PortfolioService {
    pub fn new(
        projects: Arc<dyn ProjectRepository>,
        skills: Arc<dyn SkillRepository>,
        testimonials: Arc<dyn TestimonialRepository>,
        cache: Arc<MemoryCache>,
    ) -> Self {
        Self {
            projects,
            skills,
            testimonials,
            cache,
        }
    }

    // ---- projects ----

    pub async fn create_project(
        &self,
        input: CreateProjectInput,
    ) -> Result<Project, PortfolioError> {
        let title = required(&input.title, "Project title")?;

        let slug = match non_blank(input.slug.as_deref()) {
            Some(requested) => {
                let slug = valid_slug(requested)?;
                if self.slug_taken(&slug, 0).await? {
                    return Err(PortfolioError::Duplicate(slug));
                }
                slug
            }
            None => self.free_slug(title).await?,
        };

        let now = Utc::now();
        let project = Project {
            id: 0,
            slug,
            title: title.to_string(),
            summary: input.summary.trim().to_string(),
            description: input.description,
            tech_stack: normalize_stack(&input.tech_stack),
            repo_url: non_blank(input.repo_url.as_deref()).map(str::to_string),
            live_url: non_blank(input.live_url.as_deref()).map(str::to_string),
            image_url: non_blank(input.image_url.as_deref()).map(str::to_string),
            status: input.status,
            featured: input.featured,
            sort_order: input.sort_order,
            published_at: input.status.published_at(None, now),
            created_at: now,
            updated_at: now,
        };

        let created = self.projects.create(&project).await?;
        tracing::info!(id = created.id, slug = %created.slug, "Project created");
        self.invalidate().await;
        Ok(created)
    }

    /// Projects matching `filter`, in display order
    pub async fn list_projects(&self, filter: ProjectFilter) -> Result<Vec<Project>, PortfolioError> {
        Ok(self
            .projects
            .list(filter)
            .await
            .context("Failed to list projects")?)
    }

    /// A published project by slug
    pub async fn get_published_project(&self, slug: &str) -> Result<Project, PortfolioError> {
        self.projects
            .get_by_slug(slug)
            .await
            .context("Failed to get project")?
            .filter(|p| p.status == ProjectStatus::Published)
            .ok_or_else(|| PortfolioError::NotFound(format!("Project {}", slug)))
    }

    pub async fn update_project(
        &self,
        id: i64,
        input: UpdateProjectInput,
    ) -> Result<Project, PortfolioError> {
        let existing = self
            .projects
            .get_by_id(id)
            .await?
            .ok_or_else(|| PortfolioError::NotFound(format!("Project with ID {}", id)))?;
        let mut project = existing.clone();

        if let Some(title) = input.title.as_deref() {
            project.title = required(title, "Project title")?.to_string();
        }
        if let Some(requested) = input.slug.as_deref() {
            let slug = valid_slug(requested)?;
            if slug != existing.slug && self.slug_taken(&slug, id).await? {
                return Err(PortfolioError::Duplicate(slug));
            }
            project.slug = slug;
        }
        if let Some(summary) = input.summary {
            project.summary = summary.trim().to_string();
        }
        if let Some(description) = input.description {
            project.description = description;
        }
        if let Some(stack) = input.tech_stack.as_deref() {
            project.tech_stack = normalize_stack(stack);
        }
        if let Some(url) = input.repo_url.as_deref() {
            project.repo_url = non_blank(Some(url)).map(str::to_string);
        }
        if let Some(url) = input.live_url.as_deref() {
            project.live_url = non_blank(Some(url)).map(str::to_string);
        }
        if let Some(url) = input.image_url.as_deref() {
            project.image_url = non_blank(Some(url)).map(str::to_string);
        }
        if let Some(featured) = input.featured {
            project.featured = featured;
        }
        if let Some(order) = input.sort_order {
            project.sort_order = order;
        }
        if let Some(status) = input.status {
            project.status = status;
        }

        let now = Utc::now();
        project.published_at = project.status.published_at(existing.published_at, now);
        project.updated_at = now;

        let updated = self.projects.update(&project).await?;
        self.invalidate().await;
        Ok(updated)
    }

    pub async fn delete_project(&self, id: i64) -> Result<(), PortfolioError> {
        if !self.projects.delete(id).await? {
            return Err(PortfolioError::NotFound(format!("Project with ID {}", id)));
        }
        tracing::info!(id, "Project deleted");
        self.invalidate().await;
        Ok(())
    }

    // ---- skills ----

    pub async fn create_skill(&self, input: CreateSkillInput) -> Result<Skill, PortfolioError> {
        let name = required(&input.name, "Skill name")?;
        let category = required(&input.category, "Skill category")?;
        check_score(input.proficiency, "Proficiency")?;

        if self.skills.get_by_name(name).await?.is_some() {
            return Err(PortfolioError::Duplicate(name.to_string()));
        }

        let skill = self
            .skills
            .create(&CreateSkillInput {
                name: name.to_string(),
                category: category.to_string(),
                icon: non_blank(input.icon.as_deref()).map(str::to_string),
                ..input
            })
            .await?;
        self.invalidate().await;
        Ok(skill)
    }

    /// Skills grouped by category, groups and members in display order
    pub async fn skill_groups(&self) -> Result<Vec<SkillGroup>, PortfolioError> {
        if let Ok(Some(cached)) = self.cache.get::<Vec<SkillGroup>>(CACHE_KEY_SKILLS).await {
            return Ok(cached);
        }

        let skills = self.skills.list().await.context("Failed to list skills")?;
        let groups = group_skills(skills);
        if let Err(e) = self.cache.set(CACHE_KEY_SKILLS, &groups, PORTFOLIO_TTL).await {
            tracing::warn!(error = %e, "Failed to cache skills");
        }
        Ok(groups)
    }

    pub async fn delete_skill(&self, id: i64) -> Result<(), PortfolioError> {
        if !self.skills.delete(id).await? {
            return Err(PortfolioError::NotFound(format!("Skill with ID {}", id)));
        }
        self.invalidate().await;
        Ok(())
    }

    // ---- testimonials ----

    pub async fn create_testimonial(
        &self,
        input: CreateTestimonialInput,
    ) -> Result<Testimonial, PortfolioError> {
        let author = required(&input.author_name, "Author name")?;
        let content = required(&input.content, "Testimonial content")?;
        check_score(input.rating, "Rating")?;

        let testimonial = self
            .testimonials
            .create(&CreateTestimonialInput {
                author_name: author.to_string(),
                content: content.to_string(),
                author_role: non_blank(input.author_role.as_deref()).map(str::to_string),
                company: non_blank(input.company.as_deref()).map(str::to_string),
                ..input
            })
            .await?;
        self.invalidate().await;
        Ok(testimonial)
    }

    pub async fn list_testimonials(
        &self,
        featured_only: bool,
    ) -> Result<Vec<Testimonial>, PortfolioError> {
        Ok(self
            .testimonials
            .list(featured_only)
            .await
            .context("Failed to list testimonials")?)
    }

    pub async fn delete_testimonial(&self, id: i64) -> Result<(), PortfolioError> {
        if !self.testimonials.delete(id).await? {
            return Err(PortfolioError::NotFound(format!("Testimonial with ID {}", id)));
        }
        self.invalidate().await;
        Ok(())
    }

    // ---- aggregate views ----

    /// Featured published projects, grouped skills and featured testimonials
    pub async fn overview(&self) -> Result<PortfolioOverview, PortfolioError> {
        if let Ok(Some(cached)) = self.cache.get::<PortfolioOverview>(CACHE_KEY_OVERVIEW).await {
            return Ok(cached);
        }

        let featured_projects = self
            .list_projects(ProjectFilter {
                status: Some(ProjectStatus::Published),
                featured: Some(true),
            })
            .await?;
        let overview = PortfolioOverview {
            featured_projects,
            skills: self.skill_groups().await?,
            testimonials: self.list_testimonials(true).await?,
        };

        if let Err(e) = self.cache.set(CACHE_KEY_OVERVIEW, &overview, PORTFOLIO_TTL).await {
            tracing::warn!(error = %e, "Failed to cache portfolio overview");
        }
        Ok(overview)
    }

    /// Case-insensitive keyword search over published projects and skills
    pub async fn search(&self, query: &str) -> Result<PortfolioSearchResult, PortfolioError> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_LEN {
            return Err(PortfolioError::ValidationError(format!(
                "Search query must be at least {} characters",
                MIN_QUERY_LEN
            )));
        }

        let pattern = contains_pattern(query);
        let projects = self
            .projects
            .search(&pattern)
            .await
            .context("Failed to search projects")?;
        let skills = self
            .skills
            .search(&pattern)
            .await
            .context("Failed to search skills")?;

        tracing::debug!(query, projects = projects.len(), skills = skills.len(), "Portfolio search");
        Ok(PortfolioSearchResult {
            query: query.to_string(),
            projects,
            skills,
        })
    }

    async fn slug_taken(&self, slug: &str, exclude_id: i64) -> Result<bool, PortfolioError> {
        Ok(self
            .projects
            .exists_by_slug_excluding(slug, exclude_id)
            .await
            .context("Failed to check project slug")?)
    }

    async fn free_slug(&self, title: &str) -> Result<String, PortfolioError> {
        let base = match generate_slug(title) {
            slug if slug.is_empty() => "project".to_string(),
            slug => slug,
        };
        for candidate in slug_candidates(&base) {
            if !self.slug_taken(&candidate, 0).await? {
                return Ok(candidate);
            }
        }
        Err(PortfolioError::Duplicate(base))
    }

    async fn invalidate(&self) {
        self.cache.delete_pattern("portfolio:*").await;
    }
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str, PortfolioError> {
    non_blank(Some(value))
        .ok_or_else(|| PortfolioError::ValidationError(format!("{} cannot be empty", field)))
}

fn valid_slug(requested: &str) -> Result<String, PortfolioError> {
    match generate_slug(requested) {
        slug if slug.is_empty() => Err(PortfolioError::ValidationError(format!(
            "Invalid slug: {}",
            requested
        ))),
        slug => Ok(slug),
    }
}

fn check_score(value: i32, field: &str) -> Result<(), PortfolioError> {
    if SCORE_RANGE.contains(&value) {
        Ok(())
    } else {
        Err(PortfolioError::ValidationError(format!(
            "{} must be between {} and {}, got {}",
            field,
            SCORE_RANGE.start(),
            SCORE_RANGE.end(),
            value
        )))
    }
}

/// Trim entries and drop blanks and case-insensitive duplicates
fn normalize_stack(stack: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    stack
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && seen.insert(s.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Group consecutive skills by category; input must be sorted by category.
fn group_skills(skills: Vec<Skill>) -> Vec<SkillGroup> {
    let mut groups: Vec<SkillGroup> = Vec::new();
    for skill in skills {
        match groups.last_mut() {
            Some(group) if group.category == skill.category => group.skills.push(skill),
            _ => groups.push(SkillGroup {
                category: skill.category.clone(),
                skills: vec![skill],
            }),
        }
    }
    groups
}
