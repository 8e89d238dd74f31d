//! Category service
//!
//! Categories are flat and unique by name. Deleting a category leaves its
//! posts uncategorized, so cached post data is dropped with it.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::MemoryCache;
use crate::db::repositories::CategoryRepository;
use crate::models::{Category, CategoryWithCount, CreateCategoryInput};
use crate::services::{generate_slug, non_blank};

const CACHE_KEY_CATEGORY_LIST: &str = "categories:list";
const CATEGORY_LIST_TTL: Duration = Duration::from_secs(600);
const MAX_NAME_LEN: usize = 80;

#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("Category not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Category already exists: {0}")]
    DuplicateName(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    cache: Arc<MemoryCache>,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>, cache: Arc<MemoryCache>) -> Self {
        Self { repo, cache }
    }

    pub async fn create(
        &self,
        input: CreateCategoryInput,
    ) -> Result<Category, CategoryServiceError> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(CategoryServiceError::ValidationError(
                "Category name cannot be empty".to_string(),
            ));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(CategoryServiceError::ValidationError(format!(
                "Category name cannot exceed {} characters",
                MAX_NAME_LEN
            )));
        }

        if self
            .repo
            .get_by_name(name)
            .await
            .context("Failed to check category name")?
            .is_some()
        {
            return Err(CategoryServiceError::DuplicateName(name.to_string()));
        }

        let slug = generate_slug(non_blank(input.slug.as_deref()).unwrap_or(name));
        if slug.is_empty() {
            return Err(CategoryServiceError::ValidationError(
                "Category slug cannot be empty".to_string(),
            ));
        }
        if self
            .repo
            .exists_by_slug(&slug)
            .await
            .context("Failed to check category slug")?
        {
            return Err(CategoryServiceError::DuplicateName(slug));
        }

        let category = self
            .repo
            .create(&slug, name, non_blank(input.description.as_deref()))
            .await?;

        tracing::info!(id = category.id, slug = %category.slug, "Category created");
        self.cache.delete(CACHE_KEY_CATEGORY_LIST).await;
        Ok(category)
    }

    pub async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>, CategoryServiceError> {
        if let Ok(Some(cached)) = self
            .cache
            .get::<Vec<CategoryWithCount>>(CACHE_KEY_CATEGORY_LIST)
            .await
        {
            return Ok(cached);
        }

        let categories = self
            .repo
            .list_with_counts()
            .await
            .context("Failed to list categories")?;
        if let Err(e) = self
            .cache
            .set(CACHE_KEY_CATEGORY_LIST, &categories, CATEGORY_LIST_TTL)
            .await
        {
            tracing::warn!(error = %e, "Failed to cache category list");
        }
        Ok(categories)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Category, CategoryServiceError> {
        self.repo
            .get_by_slug(slug)
            .await
            .context("Failed to get category by slug")?
            .ok_or_else(|| CategoryServiceError::NotFound(slug.to_string()))
    }

    pub async fn delete(&self, id: i64) -> Result<(), CategoryServiceError> {
        let deleted = self
            .repo
            .delete(id)
            .await
            .context("Failed to delete category")?;
        if !deleted {
            return Err(CategoryServiceError::NotFound(format!(
                "Category with ID {} not found",
                id
            )));
        }

        tracing::info!(id, "Category deleted");
        self.cache.delete(CACHE_KEY_CATEGORY_LIST).await;
        self.cache.delete_pattern("posts:*").await;
        Ok(())
    }
}
