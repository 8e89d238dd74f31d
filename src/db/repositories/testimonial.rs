//! Testimonial repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::{DynDatabasePool, InsertedId};
use crate::models::{CreateTestimonialInput, Testimonial};

#[async_trait]
pub trait TestimonialRepository: Send + Sync {
    async fn create(&self, input: &CreateTestimonialInput) -> Result<Testimonial>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Testimonial>>;

    /// Newest first; `featured_only` restricts to featured entries
    async fn list(&self, featured_only: bool) -> Result<Vec<Testimonial>>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

#[derive(sqlx::FromRow)]
struct TestimonialRow {
    id: i64,
    author_name: String,
    author_role: Option<String>,
    company: Option<String>,
    content: String,
    rating: i32,
    featured: bool,
    created_at: DateTime<Utc>,
}

impl From<TestimonialRow> for Testimonial {
    fn from(row: TestimonialRow) -> Self {
        Testimonial {
            id: row.id,
            author_name: row.author_name,
            author_role: row.author_role,
            company: row.company,
            content: row.content,
            rating: row.rating,
            featured: row.featured,
            created_at: row.created_at,
        }
    }
}

const SELECT_TESTIMONIAL: &str = r#"
    SELECT id, author_name, author_role, company, content, rating, featured, created_at
    FROM testimonials
"#;

pub struct SqlxTestimonialRepository {
    pool: DynDatabasePool,
}

impl SqlxTestimonialRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TestimonialRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TestimonialRepository for SqlxTestimonialRepository {
    async fn create(&self, input: &CreateTestimonialInput) -> Result<Testimonial> {
        let now = Utc::now();
        let id = with_driver!(self.pool, conn => {
            sqlx::query(
                r#"
                INSERT INTO testimonials (author_name, author_role, company, content, rating,
                                          featured, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&input.author_name)
            .bind(&input.author_role)
            .bind(&input.company)
            .bind(&input.content)
            .bind(input.rating)
            .bind(input.featured)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create testimonial")?
            .inserted_id()
        });

        Ok(Testimonial {
            id,
            author_name: input.author_name.clone(),
            author_role: input.author_role.clone(),
            company: input.company.clone(),
            content: input.content.clone(),
            rating: input.rating,
            featured: input.featured,
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Testimonial>> {
        let sql = format!("{} WHERE id = ?", SELECT_TESTIMONIAL);
        let row = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, TestimonialRow>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get testimonial by ID")?
        });
        Ok(row.map(Testimonial::from))
    }

    async fn list(&self, featured_only: bool) -> Result<Vec<Testimonial>> {
        let sql = format!(
            "{} WHERE (? = 0 OR featured = 1) ORDER BY created_at DESC, id DESC",
            SELECT_TESTIMONIAL
        );
        let rows = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, TestimonialRow>(&sql)
                .bind(featured_only)
                .fetch_all(conn)
                .await
                .context("Failed to list testimonials")?
        });
        Ok(rows.into_iter().map(Testimonial::from).collect())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = with_driver!(self.pool, conn => {
            sqlx::query("DELETE FROM testimonials WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete testimonial")?
                .rows_affected()
        });
        Ok(affected > 0)
    }
}
