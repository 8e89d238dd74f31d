//! Post service
//!
//! Blog post lifecycle: validation, slugs, markdown rendering, derived
//! excerpt and reading time, tag resolution and the published_at rule.
//! Reads go through the memory cache; every write drops `posts:*`.

use anyhow::Context;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::MemoryCache;
use crate::db::repositories::{CategoryRepository, PostRepository, TagRepository};
use crate::models::{
    CreatePostInput, ListParams, PagedResult, Post, PostDetail, PostFilter, PostStatus, Tag,
    UpdatePostInput,
};
use crate::services::markdown::MarkdownRenderer;
use crate::services::tag::{find_or_create_tag, normalize_tag_names};
use crate::services::{generate_slug, non_blank, slug_candidates};

const CACHE_KEY_POST_BY_SLUG: &str = "posts:slug:";
const CACHE_KEY_POST_LIST: &str = "posts:list:";
const CACHE_KEY_RECENT: &str = "posts:recent:";
const POST_LIST_TTL: Duration = Duration::from_secs(600);

const MAX_TITLE_LEN: usize = 200;
const EXCERPT_CHARS: usize = 200;
const MIN_SEARCH_LEN: usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    #[error("Post not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Post slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Public list filters, addressed by slug
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostQuery {
    pub category: Option<String>,
    pub tag: Option<String>,
    pub q: Option<String>,
}

impl PostQuery {
    fn cache_key(&self, params: &ListParams) -> String {
        format!(
            "{}{}:{}:{}:{}:{}",
            CACHE_KEY_POST_LIST,
            self.category.as_deref().unwrap_or(""),
            self.tag.as_deref().unwrap_or(""),
            self.q.as_deref().map(str::trim).unwrap_or("").to_lowercase(),
            params.page,
            params.per_page
        )
    }
}

pub struct PostService {
    repo: Arc<dyn PostRepository>,
    categories: Arc<dyn CategoryRepository>,
    tags: Arc<dyn TagRepository>,
    cache: Arc<MemoryCache>,
    renderer: MarkdownRenderer,
}

impl PostService {
    pub fn new(
        repo: Arc<dyn PostRepository>,
        categories: Arc<dyn CategoryRepository>,
        tags: Arc<dyn TagRepository>,
        cache: Arc<MemoryCache>,
        renderer: MarkdownRenderer,
    ) -> Self {
        Self {
            repo,
            categories,
            tags,
            cache,
            renderer,
        }
    }

    pub async fn create(&self, input: CreatePostInput) -> Result<PostDetail, PostServiceError> {
        let title = validate_title(&input.title)?;
        let content = validate_content(&input.content)?;

        let slug = match non_blank(input.slug.as_deref()) {
            Some(requested) => {
                let slug = generate_slug(requested);
                if slug.is_empty() {
                    return Err(PostServiceError::ValidationError(format!(
                        "Invalid slug: {}",
                        requested
                    )));
                }
                if self
                    .repo
                    .exists_by_slug(&slug)
                    .await
                    .context("Failed to check slug uniqueness")?
                {
                    return Err(PostServiceError::DuplicateSlug(slug));
                }
                slug
            }
            None => self.free_slug(title).await?,
        };

        self.ensure_category(input.category_id).await?;

        let now = Utc::now();
        let post = Post {
            id: 0,
            slug,
            title: title.to_string(),
            content: input.content.clone(),
            content_html: self.renderer.render(content),
            excerpt: match non_blank(input.excerpt.as_deref()) {
                Some(excerpt) => excerpt.to_string(),
                None => self.renderer.excerpt(content, EXCERPT_CHARS),
            },
            cover_image: non_blank(input.cover_image.as_deref()).map(str::to_string),
            category_id: input.category_id,
            status: input.status,
            reading_minutes: self.renderer.reading_minutes(content),
            published_at: input.status.published_at(None, now),
            created_at: now,
            updated_at: now,
        };

        let created = self.repo.create(&post).await?;
        self.set_tags(created.id, &input.tags).await?;

        tracing::info!(id = created.id, slug = %created.slug, status = %created.status, "Post created");
        self.invalidate().await;
        self.detail(created).await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<PostDetail, PostServiceError> {
        let post = self.load(id).await?;
        self.detail(post).await
    }

    /// A published post by slug. Drafts are reported as not found.
    pub async fn get_published(&self, slug: &str) -> Result<PostDetail, PostServiceError> {
        let cache_key = format!("{}{}", CACHE_KEY_POST_BY_SLUG, slug);
        if let Ok(Some(cached)) = self.cache.get::<PostDetail>(&cache_key).await {
            return Ok(cached);
        }

        let post = self
            .repo
            .get_by_slug(slug)
            .await
            .context("Failed to get post by slug")?
            .filter(Post::is_published)
            .ok_or_else(|| PostServiceError::NotFound(slug.to_string()))?;

        let detail = self.detail(post).await?;
        if let Err(e) = self
            .cache
            .set(&cache_key, &detail, self.cache.default_ttl())
            .await
        {
            tracing::warn!(error = %e, %cache_key, "Failed to cache post");
        }
        Ok(detail)
    }

    /// Any post matching `filter`, newest first
    pub async fn list(
        &self,
        filter: &PostFilter,
        params: &ListParams,
    ) -> Result<PagedResult<PostDetail>, PostServiceError> {
        let posts = self
            .repo
            .list(filter, params.offset(), params.limit())
            .await?;
        let total = self.repo.count(filter).await?;
        let items = self.details(posts).await?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Published posts filtered by category slug, tag slug and keyword.
    /// An unknown category or tag yields an empty page.
    pub async fn list_published(
        &self,
        query: &PostQuery,
        params: &ListParams,
    ) -> Result<PagedResult<PostDetail>, PostServiceError> {
        let cache_key = query.cache_key(params);
        if let Ok(Some(cached)) = self.cache.get::<PagedResult<PostDetail>>(&cache_key).await {
            return Ok(cached);
        }

        let mut filter = PostFilter::published();
        if let Some(slug) = non_blank(query.category.as_deref()) {
            match self.categories.get_by_slug(slug).await? {
                Some(category) => filter.category_id = Some(category.id),
                None => return Ok(PagedResult::new(Vec::new(), 0, params)),
            }
        }
        if let Some(slug) = non_blank(query.tag.as_deref()) {
            match self.tags.get_by_slug(slug).await? {
                Some(tag) => filter.tag_id = Some(tag.id),
                None => return Ok(PagedResult::new(Vec::new(), 0, params)),
            }
        }
        filter.search = non_blank(query.q.as_deref()).map(str::to_string);

        let result = self.list(&filter, params).await?;
        if let Err(e) = self.cache.set(&cache_key, &result, POST_LIST_TTL).await {
            tracing::warn!(error = %e, %cache_key, "Failed to cache post list");
        }
        Ok(result)
    }

    /// Keyword search over published posts. The keyword must have at least
    /// two non-blank characters.
    pub async fn search(
        &self,
        keyword: &str,
        params: &ListParams,
    ) -> Result<PagedResult<PostDetail>, PostServiceError> {
        let keyword = keyword.trim();
        if keyword.chars().count() < MIN_SEARCH_LEN {
            return Err(PostServiceError::ValidationError(format!(
                "Search query must be at least {} characters",
                MIN_SEARCH_LEN
            )));
        }

        let query = PostQuery {
            q: Some(keyword.to_string()),
            ..PostQuery::default()
        };
        self.list_published(&query, params).await
    }

    /// Published posts carrying the tag `slug`
    pub async fn list_by_tag(
        &self,
        slug: &str,
        params: &ListParams,
    ) -> Result<(Tag, PagedResult<PostDetail>), PostServiceError> {
        let tag = self
            .tags
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| PostServiceError::NotFound(format!("Tag {}", slug)))?;

        let filter = PostFilter {
            tag_id: Some(tag.id),
            ..PostFilter::published()
        };
        let posts = self.list(&filter, params).await?;
        Ok((tag, posts))
    }

    /// Latest published posts, for the feed
    pub async fn recent_published(&self, limit: u32) -> Result<Vec<Post>, PostServiceError> {
        let cache_key = format!("{}{}", CACHE_KEY_RECENT, limit);
        if let Ok(Some(cached)) = self.cache.get::<Vec<Post>>(&cache_key).await {
            return Ok(cached);
        }

        let posts = self
            .repo
            .list_published_recent(limit as i64)
            .await
            .context("Failed to load recent posts")?;
        if let Err(e) = self.cache.set(&cache_key, &posts, POST_LIST_TTL).await {
            tracing::warn!(error = %e, "Failed to cache recent posts");
        }
        Ok(posts)
    }

    pub async fn update(
        &self,
        id: i64,
        input: UpdatePostInput,
    ) -> Result<PostDetail, PostServiceError> {
        if !input.has_changes() {
            return Err(PostServiceError::ValidationError(
                "No fields to update".to_string(),
            ));
        }

        let existing = self.load(id).await?;
        let mut post = existing.clone();

        if let Some(title) = input.title.as_deref() {
            post.title = validate_title(title)?.to_string();
        }

        if let Some(requested) = input.slug.as_deref() {
            let slug = generate_slug(requested);
            if slug.is_empty() {
                return Err(PostServiceError::ValidationError(format!(
                    "Invalid slug: {}",
                    requested
                )));
            }
            if slug != existing.slug
                && self
                    .repo
                    .exists_by_slug_excluding(&slug, id)
                    .await
                    .context("Failed to check slug uniqueness")?
            {
                return Err(PostServiceError::DuplicateSlug(slug));
            }
            post.slug = slug;
        }

        if let Some(content) = input.content.as_deref() {
            let trimmed = validate_content(content)?;
            let auto_excerpt = self.renderer.excerpt(&existing.content, EXCERPT_CHARS);
            post.content = content.to_string();
            post.content_html = self.renderer.render(trimmed);
            post.reading_minutes = self.renderer.reading_minutes(trimmed);
            if existing.excerpt == auto_excerpt {
                post.excerpt = self.renderer.excerpt(trimmed, EXCERPT_CHARS);
            }
        }

        if let Some(excerpt) = input.excerpt.as_deref() {
            post.excerpt = match non_blank(Some(excerpt)) {
                Some(excerpt) => excerpt.to_string(),
                None => self.renderer.excerpt(&post.content, EXCERPT_CHARS),
            };
        }

        if let Some(cover) = input.cover_image.as_deref() {
            post.cover_image = non_blank(Some(cover)).map(str::to_string);
        }

        if let Some(category_id) = input.category_id {
            self.ensure_category(category_id).await?;
            post.category_id = category_id;
        }

        let now = Utc::now();
        if let Some(status) = input.status {
            post.status = status;
        }
        post.published_at = post.status.published_at(existing.published_at, now);
        post.updated_at = now;

        let updated = self.repo.update(&post).await?;
        if let Some(tags) = input.tags.as_deref() {
            self.set_tags(id, tags).await?;
        }

        tracing::info!(id, slug = %updated.slug, status = %updated.status, "Post updated");
        self.invalidate().await;
        self.detail(updated).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), PostServiceError> {
        let deleted = self.repo.delete(id).await.context("Failed to delete post")?;
        if !deleted {
            return Err(PostServiceError::NotFound(format!(
                "Post with ID {} not found",
                id
            )));
        }

        tracing::info!(id, "Post deleted");
        self.invalidate().await;
        Ok(())
    }

    async fn load(&self, id: i64) -> Result<Post, PostServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get post")?
            .ok_or_else(|| PostServiceError::NotFound(format!("Post with ID {} not found", id)))
    }

    async fn free_slug(&self, title: &str) -> Result<String, PostServiceError> {
        let base = match generate_slug(title) {
            slug if slug.is_empty() => "post".to_string(),
            slug => slug,
        };
        for candidate in slug_candidates(&base) {
            if !self
                .repo
                .exists_by_slug(&candidate)
                .await
                .context("Failed to check slug uniqueness")?
            {
                return Ok(candidate);
            }
        }
        Err(PostServiceError::DuplicateSlug(base))
    }

    async fn ensure_category(&self, category_id: Option<i64>) -> Result<(), PostServiceError> {
        if let Some(id) = category_id {
            if self.categories.get_by_id(id).await?.is_none() {
                return Err(PostServiceError::ValidationError(format!(
                    "Category {} does not exist",
                    id
                )));
            }
        }
        Ok(())
    }

    async fn set_tags(&self, post_id: i64, names: &[String]) -> Result<(), PostServiceError> {
        let mut tag_ids = Vec::new();
        for name in normalize_tag_names(names) {
            let tag = find_or_create_tag(self.tags.as_ref(), &name).await?;
            tag_ids.push(tag.id);
        }
        self.tags.replace_for_post(post_id, &tag_ids).await?;
        Ok(())
    }

    async fn detail(&self, post: Post) -> Result<PostDetail, PostServiceError> {
        let category = match post.category_id {
            Some(id) => self.categories.get_by_id(id).await?,
            None => None,
        };
        let tags = self.tags.list_for_post(post.id).await?;
        Ok(PostDetail {
            post,
            category,
            tags,
        })
    }

    async fn details(&self, posts: Vec<Post>) -> Result<Vec<PostDetail>, PostServiceError> {
        if posts.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
        let mut tags = self.tags.list_for_posts(&ids).await?;
        let categories: HashMap<i64, _> = self
            .categories
            .list()
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        Ok(posts
            .into_iter()
            .map(|post| PostDetail {
                category: post.category_id.and_then(|id| categories.get(&id).cloned()),
                tags: tags.remove(&post.id).unwrap_or_default(),
                post,
            })
            .collect())
    }

    /// Drop every cached post view, plus taxonomy counts that depend on them
    async fn invalidate(&self) {
        self.cache.delete_pattern("posts:*").await;
        self.cache.delete("tags:cloud").await;
        self.cache.delete("categories:list").await;
    }
}

fn validate_title(title: &str) -> Result<&str, PostServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(PostServiceError::ValidationError(
            "Title cannot be empty".to_string(),
        ));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(PostServiceError::ValidationError(format!(
            "Title cannot exceed {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(title)
}

fn validate_content(content: &str) -> Result<&str, PostServiceError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(PostServiceError::ValidationError(
            "Content cannot be empty".to_string(),
        ));
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxCategoryRepository, SqlxPostRepository, SqlxTagRepository,
    };
    use crate::db::{create_test_pool, migrations::run_migrations};

    async fn setup() -> (PostService, Arc<dyn CategoryRepository>) {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let categories = SqlxCategoryRepository::boxed(pool.clone());
        let service = PostService::new(
            SqlxPostRepository::boxed(pool.clone()),
            categories.clone(),
            SqlxTagRepository::boxed(pool),
            Arc::new(MemoryCache::default()),
            MarkdownRenderer::new(),
        );
        (service, categories)
    }

    fn published(title: &str) -> CreatePostInput {
        CreatePostInput::new(title, "Some *markdown* body.").with_status(PostStatus::Published)
    }

    #[tokio::test]
    async fn test_create_published_sets_published_at() {
        let (service, _) = setup().await;
        let detail = service.create(published("Hello World")).await.unwrap();

        assert_eq!(detail.post.slug, "hello-world");
        assert!(detail.post.published_at.is_some());
        assert!(detail.post.content_html.contains("<em>markdown</em>"));
        assert_eq!(detail.post.excerpt, "Some markdown body.");
        assert_eq!(detail.post.reading_minutes, 1);
    }

    #[tokio::test]
    async fn test_create_draft_has_no_published_at() {
        let (service, _) = setup().await;
        let detail = service
            .create(CreatePostInput::new("Draft", "wip"))
            .await
            .unwrap();
        assert_eq!(detail.post.status, PostStatus::Draft);
        assert_eq!(detail.post.published_at, None);
    }

    #[tokio::test]
    async fn test_create_validates_title_and_content() {
        let (service, _) = setup().await;
        assert!(matches!(
            service.create(CreatePostInput::new("  ", "body")).await,
            Err(PostServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.create(CreatePostInput::new("Title", " \n ")).await,
            Err(PostServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service
                .create(CreatePostInput::new("Title", "body").with_category(999))
                .await,
            Err(PostServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_generated_slugs_are_unique_but_explicit_ones_conflict() {
        let (service, _) = setup().await;
        service.create(published("Same Title")).await.unwrap();
        let second = service.create(published("Same Title")).await.unwrap();
        assert_eq!(second.post.slug, "same-title-2");

        assert!(matches!(
            service
                .create(published("Other").with_slug("same-title"))
                .await,
            Err(PostServiceError::DuplicateSlug(_))
        ));
    }

    #[tokio::test]
    async fn test_tags_are_created_and_reused() {
        let (service, _) = setup().await;
        let first = service
            .create(published("One").with_tags(&["Rust", "rust", "Web"]))
            .await
            .unwrap();
        assert_eq!(first.tags.len(), 2);

        let second = service
            .create(published("Two").with_tags(&["Rust"]))
            .await
            .unwrap();
        let rust_id = first.tags.iter().find(|t| t.slug == "rust").unwrap().id;
        assert_eq!(second.tags[0].id, rust_id);

        let (tag, posts) = service
            .list_by_tag("rust", &ListParams::default())
            .await
            .unwrap();
        assert_eq!(tag.name, "Rust");
        assert_eq!(posts.total, 2);
    }

    #[tokio::test]
    async fn test_get_published_hides_drafts() {
        let (service, _) = setup().await;
        service
            .create(CreatePostInput::new("Secret", "draft").with_slug("secret"))
            .await
            .unwrap();
        assert!(matches!(
            service.get_published("secret").await,
            Err(PostServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_published_filters() {
        let (service, categories) = setup().await;
        let travel = categories.create("travel", "Travel", None).await.unwrap();

        service
            .create(published("Iceland Roadtrip").with_category(travel.id))
            .await
            .unwrap();
        service.create(published("Rust Lifetimes")).await.unwrap();
        service
            .create(CreatePostInput::new("Hidden Draft", "x"))
            .await
            .unwrap();

        let params = ListParams::default();
        let all = service
            .list_published(&PostQuery::default(), &params)
            .await
            .unwrap();
        assert_eq!(all.total, 2);

        let by_category = service
            .list_published(
                &PostQuery {
                    category: Some("travel".into()),
                    ..Default::default()
                },
                &params,
            )
            .await
            .unwrap();
        assert_eq!(by_category.items.len(), 1);
        assert_eq!(by_category.items[0].category.as_ref().unwrap().name, "Travel");

        let unknown = service
            .list_published(
                &PostQuery {
                    category: Some("nope".into()),
                    ..Default::default()
                },
                &params,
            )
            .await
            .unwrap();
        assert_eq!(unknown.total, 0);

        let found = service.search("LIFETIMES", &params).await.unwrap();
        assert_eq!(found.items.len(), 1);
        assert!(matches!(
            service.search(" a ", &params).await,
            Err(PostServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_cached_list_is_invalidated_on_create() {
        let (service, _) = setup().await;
        let params = ListParams::default();
        let query = PostQuery::default();

        assert_eq!(service.list_published(&query, &params).await.unwrap().total, 0);
        service.create(published("Fresh")).await.unwrap();
        assert_eq!(service.list_published(&query, &params).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_update_status_transitions() {
        let (service, _) = setup().await;
        let draft = service
            .create(CreatePostInput::new("Later", "body"))
            .await
            .unwrap();
        let id = draft.post.id;

        let publish = UpdatePostInput {
            status: Some(PostStatus::Published),
            ..Default::default()
        };
        let published = service.update(id, publish.clone()).await.unwrap();
        let first_published_at = published.post.published_at.unwrap();

        let republished = service.update(id, publish).await.unwrap();
        assert_eq!(republished.post.published_at, Some(first_published_at));

        let unpublished = service
            .update(
                id,
                UpdatePostInput {
                    status: Some(PostStatus::Draft),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(unpublished.post.published_at, None);
    }

    #[tokio::test]
    async fn test_update_rerenders_and_replaces_tags() {
        let (service, _) = setup().await;
        let created = service
            .create(published("Edit Me").with_tags(&["old"]))
            .await
            .unwrap();

        let updated = service
            .update(
                created.post.id,
                UpdatePostInput {
                    content: Some("# New heading".into()),
                    tags: Some(vec!["new".into()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.post.content_html.contains("<h1>New heading</h1>"));
        assert_eq!(updated.post.excerpt, "New heading");
        assert_eq!(updated.tags.len(), 1);
        assert_eq!(updated.tags[0].name, "new");
    }

    #[tokio::test]
    async fn test_update_slug_conflict_and_missing_post() {
        let (service, _) = setup().await;
        service.create(published("First")).await.unwrap();
        let second = service.create(published("Second")).await.unwrap();

        assert!(matches!(
            service
                .update(
                    second.post.id,
                    UpdatePostInput {
                        slug: Some("first".into()),
                        ..Default::default()
                    }
                )
                .await,
            Err(PostServiceError::DuplicateSlug(_))
        ));
        assert!(matches!(
            service
                .update(
                    9999,
                    UpdatePostInput {
                        title: Some("x".into()),
                        ..Default::default()
                    }
                )
                .await,
            Err(PostServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.update(second.post.id, UpdatePostInput::default()).await,
            Err(PostServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let (service, _) = setup().await;
        let created = service.create(published("Bye")).await.unwrap();
        service.get_published("bye").await.unwrap();

        service.delete(created.post.id).await.unwrap();
        assert!(matches!(
            service.get_published("bye").await,
            Err(PostServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.delete(created.post.id).await,
            Err(PostServiceError::NotFound(_))
        ));
    }
}
