//! Portfolio models: projects, skills and testimonials

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PostStatus;

/// Projects share the draft/published lifecycle with posts.
pub type ProjectStatus = PostStatus;

/// Portfolio project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: i64,
    pub slug: String,
    pub title: String,
    /// One-line summary shown on cards
    pub summary: String,
    /// Markdown description
    pub description: String,
    pub tech_stack: Vec<String>,
    pub repo_url: Option<String>,
    pub live_url: Option<String>,
    pub image_url: Option<String>,
    pub status: ProjectStatus,
    pub featured: bool,
    /// Lower sorts first
    pub sort_order: i32,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateProjectInput {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub repo_url: Option<String>,
    #[serde(default)]
    pub live_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub sort_order: i32,
}

impl CreateProjectInput {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Partial update for a project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProjectInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tech_stack: Option<Vec<String>>,
    pub repo_url: Option<String>,
    pub live_url: Option<String>,
    pub image_url: Option<String>,
    pub status: Option<ProjectStatus>,
    pub featured: Option<bool>,
    pub sort_order: Option<i32>,
}

/// Filter for project lists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    pub featured: Option<bool>,
}

/// A skill with a 1..=5 proficiency
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Skill {
    pub id: i64,
    pub name: String,
    /// Grouping label, e.g. "Languages"
    pub category: String,
    pub proficiency: i32,
    pub icon: Option<String>,
    pub sort_order: i32,
}

/// Input for creating a skill
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSkillInput {
    pub name: String,
    pub category: String,
    pub proficiency: i32,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
}

/// Skills sharing a category label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillGroup {
    pub category: String,
    pub skills: Vec<Skill>,
}

/// Client or colleague testimonial
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Testimonial {
    pub id: i64,
    pub author_name: String,
    pub author_role: Option<String>,
    pub company: Option<String>,
    pub content: String,
    /// 1..=5
    pub rating: i32,
    pub featured: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a testimonial
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTestimonialInput {
    pub author_name: String,
    #[serde(default)]
    pub author_role: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    pub content: String,
    pub rating: i32,
    #[serde(default)]
    pub featured: bool,
}

/// Landing data for the portfolio page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioOverview {
    pub featured_projects: Vec<Project>,
    pub skills: Vec<SkillGroup>,
    pub testimonials: Vec<Testimonial>,
}

/// Portfolio search hits
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioSearchResult {
    pub query: String,
    pub projects: Vec<Project>,
    pub skills: Vec<Skill>,
}
