//! Post repository
//!
//! This module provides:
//! - `PostRepository` trait defining post data access
//! - `SqlxPostRepository` implementing it for SQLite and MySQL
//!
//! List queries take a [`PostFilter`]; unset filter fields are bound as
//! NULL and short-circuit their clause, so one statement serves every
//! combination.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::{DynDatabasePool, InsertedId};
use crate::models::{Post, PostFilter, PostStatus};

/// Post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Insert a post; the `id` field of the argument is ignored
    async fn create(&self, post: &Post) -> Result<Post>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>>;

    /// Posts matching `filter`, newest first
    async fn list(&self, filter: &PostFilter, offset: i64, limit: i64) -> Result<Vec<Post>>;

    async fn count(&self, filter: &PostFilter) -> Result<i64>;

    /// Overwrite every mutable column of an existing post
    async fn update(&self, post: &Post) -> Result<Post>;

    /// Returns false when nothing was deleted
    async fn delete(&self, id: i64) -> Result<bool>;

    async fn exists_by_slug(&self, slug: &str) -> Result<bool>;

    /// Slug taken by a post other than `exclude_id`
    async fn exists_by_slug_excluding(&self, slug: &str, exclude_id: i64) -> Result<bool>;

    /// Latest published posts, for feeds
    async fn list_published_recent(&self, limit: i64) -> Result<Vec<Post>>;
}

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    slug: String,
    title: String,
    content: String,
    content_html: String,
    excerpt: String,
    cover_image: Option<String>,
    category_id: Option<i64>,
    status: String,
    reading_minutes: i32,
    published_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PostRow> for Post {
    type Error = anyhow::Error;

    fn try_from(row: PostRow) -> Result<Self> {
        let status = PostStatus::parse(&row.status)
            .ok_or_else(|| anyhow!("Unknown post status '{}' on post {}", row.status, row.id))?;
        Ok(Post {
            id: row.id,
            slug: row.slug,
            title: row.title,
            content: row.content,
            content_html: row.content_html,
            excerpt: row.excerpt,
            cover_image: row.cover_image,
            category_id: row.category_id,
            status,
            reading_minutes: row.reading_minutes,
            published_at: row.published_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_posts(rows: Vec<PostRow>) -> Result<Vec<Post>> {
    rows.into_iter().map(Post::try_from).collect()
}

const SELECT_POST: &str = r#"
    SELECT p.id, p.slug, p.title, p.content, p.content_html, p.excerpt, p.cover_image,
           p.category_id, p.status, p.reading_minutes, p.published_at, p.created_at, p.updated_at
    FROM posts p
"#;

const FILTER_CLAUSE: &str = r#"
    WHERE (? IS NULL OR p.status = ?)
      AND (? IS NULL OR p.category_id = ?)
      AND (? IS NULL OR EXISTS (
            SELECT 1 FROM post_tags pt WHERE pt.post_id = p.id AND pt.tag_id = ?))
      AND (? IS NULL
            OR LOWER(p.title) LIKE ? ESCAPE '!'
            OR LOWER(p.excerpt) LIKE ? ESCAPE '!'
            OR LOWER(p.content) LIKE ? ESCAPE '!')
"#;

const NEWEST_FIRST: &str = "ORDER BY COALESCE(p.published_at, p.created_at) DESC, p.id DESC";

/// Bind the parameters of `FILTER_CLAUSE` in order.
macro_rules! bind_filter {
    ($query:expr, $filter:expr) => {{
        let status = $filter.status.map(|s| s.as_str());
        let pattern = $filter.search_pattern();
        $query
            .bind(status)
            .bind(status)
            .bind($filter.category_id)
            .bind($filter.category_id)
            .bind($filter.tag_id)
            .bind($filter.tag_id)
            .bind(pattern.clone())
            .bind(pattern.clone())
            .bind(pattern.clone())
            .bind(pattern)
    }};
}

/// SQLx-based post repository
pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, post: &Post) -> Result<Post> {
        let id = with_driver!(self.pool, conn => {
            sqlx::query(
                r#"
                INSERT INTO posts (slug, title, content, content_html, excerpt, cover_image,
                                   category_id, status, reading_minutes, published_at,
                                   created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&post.slug)
            .bind(&post.title)
            .bind(&post.content)
            .bind(&post.content_html)
            .bind(&post.excerpt)
            .bind(&post.cover_image)
            .bind(post.category_id)
            .bind(post.status.as_str())
            .bind(post.reading_minutes)
            .bind(post.published_at)
            .bind(post.created_at)
            .bind(post.updated_at)
            .execute(conn)
            .await
            .context("Failed to create post")?
            .inserted_id()
        });

        Ok(Post {
            id,
            ..post.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        let sql = format!("{} WHERE p.id = ?", SELECT_POST);
        let row = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, PostRow>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get post by ID")?
        });
        row.map(Post::try_from).transpose()
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        let sql = format!("{} WHERE p.slug = ?", SELECT_POST);
        let row = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, PostRow>(&sql)
                .bind(slug)
                .fetch_optional(conn)
                .await
                .context("Failed to get post by slug")?
        });
        row.map(Post::try_from).transpose()
    }

    async fn list(&self, filter: &PostFilter, offset: i64, limit: i64) -> Result<Vec<Post>> {
        let sql = format!(
            "{} {} {} LIMIT ? OFFSET ?",
            SELECT_POST, FILTER_CLAUSE, NEWEST_FIRST
        );
        let rows = with_driver!(self.pool, conn => {
            bind_filter!(sqlx::query_as::<_, PostRow>(&sql), filter)
                .bind(limit)
                .bind(offset)
                .fetch_all(conn)
                .await
                .context("Failed to list posts")?
        });
        into_posts(rows)
    }

    async fn count(&self, filter: &PostFilter) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM posts p {}", FILTER_CLAUSE);
        let count = with_driver!(self.pool, conn => {
            bind_filter!(sqlx::query_scalar::<_, i64>(&sql), filter)
                .fetch_one(conn)
                .await
                .context("Failed to count posts")?
        });
        Ok(count)
    }

    async fn update(&self, post: &Post) -> Result<Post> {
        let affected = with_driver!(self.pool, conn => {
            sqlx::query(
                r#"
                UPDATE posts
                SET slug = ?, title = ?, content = ?, content_html = ?, excerpt = ?,
                    cover_image = ?, category_id = ?, status = ?, reading_minutes = ?,
                    published_at = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&post.slug)
            .bind(&post.title)
            .bind(&post.content)
            .bind(&post.content_html)
            .bind(&post.excerpt)
            .bind(&post.cover_image)
            .bind(post.category_id)
            .bind(post.status.as_str())
            .bind(post.reading_minutes)
            .bind(post.published_at)
            .bind(post.updated_at)
            .bind(post.id)
            .execute(conn)
            .await
            .context("Failed to update post")?
            .rows_affected()
        });

        if affected == 0 {
            return Err(anyhow!("Post {} not found", post.id));
        }
        Ok(post.clone())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = with_driver!(self.pool, conn => {
            sqlx::query("DELETE FROM posts WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete post")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn exists_by_slug(&self, slug: &str) -> Result<bool> {
        let count = with_driver!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts WHERE slug = ?")
                .bind(slug)
                .fetch_one(conn)
                .await
                .context("Failed to check post slug")?
        });
        Ok(count > 0)
    }

    async fn exists_by_slug_excluding(&self, slug: &str, exclude_id: i64) -> Result<bool> {
        let count = with_driver!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts WHERE slug = ? AND id <> ?")
                .bind(slug)
                .bind(exclude_id)
                .fetch_one(conn)
                .await
                .context("Failed to check post slug")?
        });
        Ok(count > 0)
    }

    async fn list_published_recent(&self, limit: i64) -> Result<Vec<Post>> {
        self.list(&PostFilter::published(), 0, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations::run_migrations};
    use chrono::{Duration, TimeZone};

    async fn setup() -> (DynDatabasePool, Arc<dyn PostRepository>) {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        (pool.clone(), SqlxPostRepository::boxed(pool))
    }

    fn post(slug: &str, status: PostStatus, day: u32) -> Post {
        let at = Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap();
        Post {
            id: 0,
            slug: slug.to_string(),
            title: format!("Title {}", slug),
            content: format!("Body of {}", slug),
            content_html: format!("<p>Body of {}</p>", slug),
            excerpt: format!("About {}", slug),
            cover_image: None,
            category_id: None,
            status,
            reading_minutes: 1,
            published_at: status.published_at(None, at),
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (_, repo) = setup().await;
        let created = repo
            .create(&post("hello", PostStatus::Published, 1))
            .await
            .unwrap();
        assert!(created.id > 0);

        let fetched = repo.get_by_slug("hello").await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(repo.get_by_id(created.id).await.unwrap(), Some(created));
        assert!(repo.get_by_slug("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters_and_orders() {
        let (_, repo) = setup().await;
        repo.create(&post("old", PostStatus::Published, 1)).await.unwrap();
        repo.create(&post("new", PostStatus::Published, 5)).await.unwrap();
        repo.create(&post("draft", PostStatus::Draft, 9)).await.unwrap();

        let published = repo.list(&PostFilter::published(), 0, 10).await.unwrap();
        let slugs: Vec<&str> = published.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["new", "old"]);
        assert_eq!(repo.count(&PostFilter::published()).await.unwrap(), 2);
        assert_eq!(repo.count(&PostFilter::default()).await.unwrap(), 3);

        let page = repo.list(&PostFilter::published(), 1, 1).await.unwrap();
        assert_eq!(page[0].slug, "old");
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let (_, repo) = setup().await;
        let mut p = post("ownership", PostStatus::Published, 2);
        p.content = "Borrowing and OWNERSHIP in practice".to_string();
        repo.create(&p).await.unwrap();
        repo.create(&post("other", PostStatus::Published, 3)).await.unwrap();

        let filter = PostFilter::published().with_search("ownership");
        let hits = repo.list(&filter, 0, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slug, "ownership");
        assert_eq!(repo.count(&filter).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_search_wildcards_are_literal() {
        let (_, repo) = setup().await;
        let mut p = post("discount", PostStatus::Published, 2);
        p.title = "Now 50% off".to_string();
        repo.create(&p).await.unwrap();
        repo.create(&post("plain", PostStatus::Published, 3)).await.unwrap();

        let everything = PostFilter::published().with_search("%%");
        assert_eq!(repo.count(&everything).await.unwrap(), 0);

        let underscore = PostFilter::published().with_search("_");
        assert_eq!(repo.count(&underscore).await.unwrap(), 0);

        let percent = PostFilter::published().with_search("50%");
        let hits = repo.list(&percent, 0, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slug, "discount");
    }

    #[tokio::test]
    async fn test_filter_by_tag_and_category() {
        let (pool, repo) = setup().await;
        let conn = pool.as_sqlite().unwrap();
        sqlx::query("INSERT INTO categories (slug, name, created_at) VALUES ('c', 'C', '2024-01-01T00:00:00Z')")
            .execute(conn)
            .await
            .unwrap();
        sqlx::query("INSERT INTO tags (slug, name, created_at) VALUES ('t', 'T', '2024-01-01T00:00:00Z')")
            .execute(conn)
            .await
            .unwrap();

        let mut tagged = post("tagged", PostStatus::Published, 1);
        tagged.category_id = Some(1);
        let tagged = repo.create(&tagged).await.unwrap();
        repo.create(&post("plain", PostStatus::Published, 2)).await.unwrap();
        sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES (?, 1)")
            .bind(tagged.id)
            .execute(conn)
            .await
            .unwrap();

        let by_tag = PostFilter {
            tag_id: Some(1),
            ..PostFilter::published()
        };
        assert_eq!(repo.count(&by_tag).await.unwrap(), 1);

        let by_category = PostFilter {
            category_id: Some(1),
            ..Default::default()
        };
        let hits = repo.list(&by_category, 0, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slug, "tagged");
    }

    #[tokio::test]
    async fn test_update_and_slug_checks() {
        let (_, repo) = setup().await;
        let first = repo.create(&post("first", PostStatus::Draft, 1)).await.unwrap();
        repo.create(&post("second", PostStatus::Draft, 2)).await.unwrap();

        assert!(repo.exists_by_slug("second").await.unwrap());
        assert!(repo
            .exists_by_slug_excluding("second", first.id)
            .await
            .unwrap());
        assert!(!repo
            .exists_by_slug_excluding("first", first.id)
            .await
            .unwrap());

        let mut changed = first.clone();
        changed.title = "Renamed".to_string();
        changed.updated_at = first.updated_at + Duration::hours(1);
        repo.update(&changed).await.unwrap();
        let fetched = repo.get_by_id(first.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Renamed");

        let mut ghost = changed.clone();
        ghost.id = 4242;
        assert!(repo.update(&ghost).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_and_recent() {
        let (_, repo) = setup().await;
        let a = repo.create(&post("a", PostStatus::Published, 1)).await.unwrap();
        repo.create(&post("b", PostStatus::Published, 2)).await.unwrap();
        repo.create(&post("c", PostStatus::Draft, 3)).await.unwrap();

        let recent = repo.list_published_recent(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].slug, "b");

        assert!(repo.delete(a.id).await.unwrap());
        assert!(!repo.delete(a.id).await.unwrap());
    }
}
