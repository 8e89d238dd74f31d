//! Portfolio project repository
//!
//! The tech stack is stored as a JSON array in a text column.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::{DynDatabasePool, InsertedId};
use crate::models::{Project, ProjectFilter, ProjectStatus};

/// Project repository trait
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn create(&self, project: &Project) -> Result<Project>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Project>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Project>>;

    /// Projects by `sort_order`, then newest
    async fn list(&self, filter: ProjectFilter) -> Result<Vec<Project>>;

    async fn update(&self, project: &Project) -> Result<Project>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn exists_by_slug_excluding(&self, slug: &str, exclude_id: i64) -> Result<bool>;

    /// Published projects whose title, summary, description or tech stack
    /// matches a lowercased `LIKE` pattern
    async fn search(&self, pattern: &str) -> Result<Vec<Project>>;
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: i64,
    slug: String,
    title: String,
    summary: String,
    description: String,
    tech_stack: String,
    repo_url: Option<String>,
    live_url: Option<String>,
    image_url: Option<String>,
    status: String,
    featured: bool,
    sort_order: i32,
    published_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProjectRow> for Project {
    type Error = anyhow::Error;

    fn try_from(row: ProjectRow) -> Result<Self> {
        let status = ProjectStatus::parse(&row.status)
            .ok_or_else(|| anyhow!("Unknown project status '{}'", row.status))?;
        let tech_stack: Vec<String> = serde_json::from_str(&row.tech_stack)
            .with_context(|| format!("Corrupt tech stack on project {}", row.id))?;
        Ok(Project {
            id: row.id,
            slug: row.slug,
            title: row.title,
            summary: row.summary,
            description: row.description,
            tech_stack,
            repo_url: row.repo_url,
            live_url: row.live_url,
            image_url: row.image_url,
            status,
            featured: row.featured,
            sort_order: row.sort_order,
            published_at: row.published_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_projects(rows: Vec<ProjectRow>) -> Result<Vec<Project>> {
    rows.into_iter().map(Project::try_from).collect()
}

const SELECT_PROJECT: &str = r#"
    SELECT id, slug, title, summary, description, tech_stack, repo_url, live_url, image_url,
           status, featured, sort_order, published_at, created_at, updated_at
    FROM projects
"#;

const PROJECT_ORDER: &str = "ORDER BY sort_order, created_at DESC, id DESC";

/// SQLx-based project repository
pub struct SqlxProjectRepository {
    pool: DynDatabasePool,
}

impl SqlxProjectRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ProjectRepository> {
        Arc::new(Self::new(pool))
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<Project>> {
        let sql = format!("{} WHERE {} = ?", SELECT_PROJECT, column);
        let row = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, ProjectRow>(&sql)
                .bind(value)
                .fetch_optional(conn)
                .await
                .with_context(|| format!("Failed to get project by {}", column))?
        });
        row.map(Project::try_from).transpose()
    }
}

#[async_trait]
impl ProjectRepository for SqlxProjectRepository {
    async fn create(&self, project: &Project) -> Result<Project> {
        let tech_stack = serde_json::to_string(&project.tech_stack)?;
        let id = with_driver!(self.pool, conn => {
            sqlx::query(
                r#"
                INSERT INTO projects (slug, title, summary, description, tech_stack, repo_url,
                                      live_url, image_url, status, featured, sort_order,
                                      published_at, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&project.slug)
            .bind(&project.title)
            .bind(&project.summary)
            .bind(&project.description)
            .bind(&tech_stack)
            .bind(&project.repo_url)
            .bind(&project.live_url)
            .bind(&project.image_url)
            .bind(project.status.as_str())
            .bind(project.featured)
            .bind(project.sort_order)
            .bind(project.published_at)
            .bind(project.created_at)
            .bind(project.updated_at)
            .execute(conn)
            .await
            .context("Failed to create project")?
            .inserted_id()
        });

        Ok(Project {
            id,
            ..project.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Project>> {
        let sql = format!("{} WHERE id = ?", SELECT_PROJECT);
        let row = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, ProjectRow>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get project by ID")?
        });
        row.map(Project::try_from).transpose()
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Project>> {
        self.find_one("slug", slug).await
    }

    async fn list(&self, filter: ProjectFilter) -> Result<Vec<Project>> {
        let sql = format!(
            "{} WHERE (? IS NULL OR status = ?) AND (? IS NULL OR featured = ?) {}",
            SELECT_PROJECT, PROJECT_ORDER
        );
        let status = filter.status.map(|s| s.as_str());
        let rows = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, ProjectRow>(&sql)
                .bind(status)
                .bind(status)
                .bind(filter.featured)
                .bind(filter.featured)
                .fetch_all(conn)
                .await
                .context("Failed to list projects")?
        });
        into_projects(rows)
    }

    async fn update(&self, project: &Project) -> Result<Project> {
        let tech_stack = serde_json::to_string(&project.tech_stack)?;
        let affected = with_driver!(self.pool, conn => {
            sqlx::query(
                r#"
                UPDATE projects
                SET slug = ?, title = ?, summary = ?, description = ?, tech_stack = ?,
                    repo_url = ?, live_url = ?, image_url = ?, status = ?, featured = ?,
                    sort_order = ?, published_at = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&project.slug)
            .bind(&project.title)
            .bind(&project.summary)
            .bind(&project.description)
            .bind(&tech_stack)
            .bind(&project.repo_url)
            .bind(&project.live_url)
            .bind(&project.image_url)
            .bind(project.status.as_str())
            .bind(project.featured)
            .bind(project.sort_order)
            .bind(project.published_at)
            .bind(project.updated_at)
            .bind(project.id)
            .execute(conn)
            .await
            .context("Failed to update project")?
            .rows_affected()
        });

        if affected == 0 {
            return Err(anyhow!("Project {} not found", project.id));
        }
        Ok(project.clone())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = with_driver!(self.pool, conn => {
            sqlx::query("DELETE FROM projects WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete project")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn exists_by_slug_excluding(&self, slug: &str, exclude_id: i64) -> Result<bool> {
        let count = with_driver!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM projects WHERE slug = ? AND id <> ?",
            )
            .bind(slug)
            .bind(exclude_id)
            .fetch_one(conn)
            .await
            .context("Failed to check project slug")?
        });
        Ok(count > 0)
    }

    async fn search(&self, pattern: &str) -> Result<Vec<Project>> {
        let sql = format!(
            r#"{} WHERE status = 'published'
                 AND (LOWER(title) LIKE ? ESCAPE '!' OR LOWER(summary) LIKE ? ESCAPE '!'
                      OR LOWER(description) LIKE ? ESCAPE '!'
                      OR LOWER(tech_stack) LIKE ? ESCAPE '!')
               {}"#,
            SELECT_PROJECT, PROJECT_ORDER
        );
        let rows = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, ProjectRow>(&sql)
                .bind(pattern)
                .bind(pattern)
                .bind(pattern)
                .bind(pattern)
                .fetch_all(conn)
                .await
                .context("Failed to search projects")?
        });
        into_projects(rows)
    }
}
