//! Tag service
//!
//! Tags are created on demand from the names attached to a post and
//! reused by name afterwards. The tag cloud lists them by usage.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::MemoryCache;
use crate::db::repositories::TagRepository;
use crate::models::{Tag, TagWithCount};
use crate::services::{generate_slug, slug_candidates};

const CACHE_KEY_TAG_CLOUD: &str = "tags:cloud";
const TAG_CLOUD_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, thiserror::Error)]
pub enum TagServiceError {
    #[error("Tag not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct TagService {
    repo: Arc<dyn TagRepository>,
    cache: Arc<MemoryCache>,
}

impl TagService {
    pub fn new(repo: Arc<dyn TagRepository>, cache: Arc<MemoryCache>) -> Self {
        Self { repo, cache }
    }

    /// Tag cloud: every tag with its published post count, most used first
    pub async fn cloud(&self) -> Result<Vec<TagWithCount>, TagServiceError> {
        if let Ok(Some(cached)) = self.cache.get::<Vec<TagWithCount>>(CACHE_KEY_TAG_CLOUD).await {
            return Ok(cached);
        }

        let tags = self
            .repo
            .list_with_counts()
            .await
            .context("Failed to load tag cloud")?;

        if let Err(e) = self.cache.set(CACHE_KEY_TAG_CLOUD, &tags, TAG_CLOUD_TTL).await {
            tracing::warn!(error = %e, "Failed to cache tag cloud");
        }
        Ok(tags)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Tag, TagServiceError> {
        self.repo
            .get_by_slug(slug)
            .await
            .context("Failed to get tag by slug")?
            .ok_or_else(|| TagServiceError::NotFound(slug.to_string()))
    }

    pub async fn find_or_create(&self, name: &str) -> Result<Tag, TagServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TagServiceError::ValidationError(
                "Tag name cannot be empty".to_string(),
            ));
        }

        let tag = find_or_create_tag(self.repo.as_ref(), name).await?;
        self.cache.delete(CACHE_KEY_TAG_CLOUD).await;
        Ok(tag)
    }
}

/// Reuse the tag called `name` or create it under a free slug.
pub(crate) async fn find_or_create_tag(repo: &dyn TagRepository, name: &str) -> Result<Tag> {
    if let Some(existing) = repo.get_by_name(name).await? {
        return Ok(existing);
    }

    let base = match generate_slug(name) {
        slug if slug.is_empty() => "tag".to_string(),
        slug => slug,
    };
    for slug in slug_candidates(&base) {
        if repo.get_by_slug(&slug).await?.is_none() {
            tracing::debug!(name, %slug, "Creating tag");
            return repo
                .create(&slug, name)
                .await
                .with_context(|| format!("Failed to create tag '{}'", name));
        }
    }

    anyhow::bail!("No free slug for tag '{}'", name)
}

/// Deduplicate tag names case-insensitively, dropping blanks. First
/// spelling wins.
pub(crate) fn normalize_tag_names(names: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.to_lowercase()))
        .map(str::to_string)
        .collect()
}
