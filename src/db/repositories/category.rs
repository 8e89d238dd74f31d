//! Category repository
//!
//! Categories are flat. Deleting one leaves its posts uncategorized
//! (`ON DELETE SET NULL`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::{DynDatabasePool, InsertedId};
use crate::models::{Category, CategoryWithCount};

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn create(&self, slug: &str, name: &str, description: Option<&str>)
        -> Result<Category>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Category>>;

    /// All categories, alphabetically
    async fn list(&self) -> Result<Vec<Category>>;

    /// All categories with their published post counts
    async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>>;

    /// Returns false when nothing was deleted
    async fn delete(&self, id: i64) -> Result<bool>;

    async fn exists_by_slug(&self, slug: &str) -> Result<bool>;
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: i64,
    slug: String,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Category {
            id: row.id,
            slug: row.slug,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CategoryCountRow {
    #[sqlx(flatten)]
    category: CategoryRow,
    post_count: i64,
}

const SELECT_CATEGORY: &str =
    "SELECT id, slug, name, description, created_at FROM categories";

/// SQLx-based category repository
pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<Category>> {
        let sql = format!("{} WHERE {} = ?", SELECT_CATEGORY, column);
        let row = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, CategoryRow>(&sql)
                .bind(value)
                .fetch_optional(conn)
                .await
                .with_context(|| format!("Failed to get category by {}", column))?
        });
        Ok(row.map(Category::from))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(
        &self,
        slug: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Category> {
        let now = Utc::now();
        let id = with_driver!(self.pool, conn => {
            sqlx::query(
                "INSERT INTO categories (slug, name, description, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(slug)
            .bind(name)
            .bind(description)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create category")?
            .inserted_id()
        });

        Ok(Category {
            id,
            slug: slug.to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let sql = format!("{} WHERE id = ?", SELECT_CATEGORY);
        let row = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, CategoryRow>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get category by ID")?
        });
        Ok(row.map(Category::from))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        self.find_one("slug", slug).await
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Category>> {
        self.find_one("name", name).await
    }

    async fn list(&self) -> Result<Vec<Category>> {
        let sql = format!("{} ORDER BY name", SELECT_CATEGORY);
        let rows = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, CategoryRow>(&sql)
                .fetch_all(conn)
                .await
                .context("Failed to list categories")?
        });
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>> {
        let rows = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, CategoryCountRow>(
                r#"
                SELECT c.id, c.slug, c.name, c.description, c.created_at,
                       (SELECT COUNT(*) FROM posts p
                        WHERE p.category_id = c.id AND p.status = 'published') AS post_count
                FROM categories c
                ORDER BY c.name
                "#,
            )
            .fetch_all(conn)
            .await
            .context("Failed to list categories with counts")?
        });

        Ok(rows
            .into_iter()
            .map(|row| CategoryWithCount {
                category: row.category.into(),
                post_count: row.post_count,
            })
            .collect())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = with_driver!(self.pool, conn => {
            sqlx::query("DELETE FROM categories WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete category")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn exists_by_slug(&self, slug: &str) -> Result<bool> {
        Ok(self.get_by_slug(slug).await?.is_some())
    }
}
