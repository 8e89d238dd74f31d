//! Tag repository
//!
//! Tags and the `post_tags` join table.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::DatabaseDriver;
use crate::db::{placeholders, DynDatabasePool, InsertedId};
use crate::models::{Tag, TagWithCount};

/// Tag repository trait
#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn create(&self, slug: &str, name: &str) -> Result<Tag>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// Tags with published post counts, most used first
    async fn list_with_counts(&self) -> Result<Vec<TagWithCount>>;

    /// Tags attached to a post, alphabetically
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<Tag>>;

    /// Tags for several posts at once, keyed by post id
    async fn list_for_posts(&self, post_ids: &[i64]) -> Result<HashMap<i64, Vec<Tag>>>;

    /// Attach a tag; attaching twice is a no-op
    async fn attach(&self, post_id: i64, tag_id: i64) -> Result<()>;

    async fn detach(&self, post_id: i64, tag_id: i64) -> Result<()>;

    /// Replace a post's tag set atomically
    async fn replace_for_post(&self, post_id: i64, tag_ids: &[i64]) -> Result<()>;
}

#[derive(sqlx::FromRow)]
struct TagRow {
    id: i64,
    slug: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl From<TagRow> for Tag {
    fn from(row: TagRow) -> Self {
        Tag {
            id: row.id,
            slug: row.slug,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TagCountRow {
    #[sqlx(flatten)]
    tag: TagRow,
    post_count: i64,
}

#[derive(sqlx::FromRow)]
struct PostTagRow {
    post_id: i64,
    #[sqlx(flatten)]
    tag: TagRow,
}

/// SQLx-based tag repository
pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }

    fn insert_ignore_sql(&self) -> &'static str {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                "INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?, ?)"
            }
            DatabaseDriver::Mysql => "INSERT IGNORE INTO post_tags (post_id, tag_id) VALUES (?, ?)",
        }
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<Tag>> {
        let sql = format!(
            "SELECT id, slug, name, created_at FROM tags WHERE {} = ?",
            column
        );
        let row = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, TagRow>(&sql)
                .bind(value)
                .fetch_optional(conn)
                .await
                .with_context(|| format!("Failed to get tag by {}", column))?
        });
        Ok(row.map(Tag::from))
    }
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn create(&self, slug: &str, name: &str) -> Result<Tag> {
        let now = Utc::now();
        let id = with_driver!(self.pool, conn => {
            sqlx::query("INSERT INTO tags (slug, name, created_at) VALUES (?, ?, ?)")
                .bind(slug)
                .bind(name)
                .bind(now)
                .execute(conn)
                .await
                .context("Failed to create tag")?
                .inserted_id()
        });

        Ok(Tag {
            id,
            slug: slug.to_string(),
            name: name.to_string(),
            created_at: now,
        })
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        self.find_one("slug", slug).await
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>> {
        self.find_one("name", name).await
    }

    async fn list_with_counts(&self) -> Result<Vec<TagWithCount>> {
        let rows = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, TagCountRow>(
                r#"
                SELECT t.id, t.slug, t.name, t.created_at,
                       (SELECT COUNT(*) FROM post_tags pt
                        INNER JOIN posts p ON p.id = pt.post_id
                        WHERE pt.tag_id = t.id AND p.status = 'published') AS post_count
                FROM tags t
                ORDER BY post_count DESC, t.name
                "#,
            )
            .fetch_all(conn)
            .await
            .context("Failed to list tags with counts")?
        });

        Ok(rows
            .into_iter()
            .map(|row| TagWithCount {
                tag: row.tag.into(),
                post_count: row.post_count,
            })
            .collect())
    }

    async fn list_for_post(&self, post_id: i64) -> Result<Vec<Tag>> {
        let rows = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, TagRow>(
                r#"
                SELECT t.id, t.slug, t.name, t.created_at
                FROM tags t
                INNER JOIN post_tags pt ON pt.tag_id = t.id
                WHERE pt.post_id = ?
                ORDER BY t.name
                "#,
            )
            .bind(post_id)
            .fetch_all(conn)
            .await
            .context("Failed to list tags for post")?
        });
        Ok(rows.into_iter().map(Tag::from).collect())
    }

    async fn list_for_posts(&self, post_ids: &[i64]) -> Result<HashMap<i64, Vec<Tag>>> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            r#"
            SELECT pt.post_id, t.id, t.slug, t.name, t.created_at
            FROM tags t
            INNER JOIN post_tags pt ON pt.tag_id = t.id
            WHERE pt.post_id IN ({})
            ORDER BY t.name
            "#,
            placeholders(post_ids.len())
        );

        let rows = with_driver!(self.pool, conn => {
            let mut query = sqlx::query_as::<_, PostTagRow>(&sql);
            for id in post_ids {
                query = query.bind(*id);
            }
            query
                .fetch_all(conn)
                .await
                .context("Failed to list tags for posts")?
        });

        let mut map: HashMap<i64, Vec<Tag>> = HashMap::new();
        for row in rows {
            map.entry(row.post_id).or_default().push(row.tag.into());
        }
        Ok(map)
    }

    async fn attach(&self, post_id: i64, tag_id: i64) -> Result<()> {
        let sql = self.insert_ignore_sql();
        with_driver!(self.pool, conn => {
            sqlx::query(sql)
                .bind(post_id)
                .bind(tag_id)
                .execute(conn)
                .await
                .context("Failed to attach tag")?;
        });
        Ok(())
    }

    async fn detach(&self, post_id: i64, tag_id: i64) -> Result<()> {
        with_driver!(self.pool, conn => {
            sqlx::query("DELETE FROM post_tags WHERE post_id = ? AND tag_id = ?")
                .bind(post_id)
                .bind(tag_id)
                .execute(conn)
                .await
                .context("Failed to detach tag")?;
        });
        Ok(())
    }

    async fn replace_for_post(&self, post_id: i64, tag_ids: &[i64]) -> Result<()> {
        let insert = self.insert_ignore_sql();
        with_driver!(self.pool, conn => {
            let mut tx = conn.begin().await.context("Failed to begin transaction")?;
            sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
                .bind(post_id)
                .execute(&mut *tx)
                .await
                .context("Failed to clear post tags")?;
            for tag_id in tag_ids {
                sqlx::query(insert)
                    .bind(post_id)
                    .bind(*tag_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to attach tag")?;
            }
            tx.commit().await.context("Failed to commit post tags")?;
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations::run_migrations};

    async fn setup() -> (DynDatabasePool, Arc<dyn TagRepository>) {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let repo = SqlxTagRepository::boxed(pool.clone());
        (pool, repo)
    }

    async fn insert_post(pool: &DynDatabasePool, slug: &str, status: &str) -> i64 {
        let published = if status == "published" {
            Some("2024-01-01T00:00:00Z")
        } else {
            None
        };
        sqlx::query(
            "INSERT INTO posts (slug, title, content, content_html, excerpt, status, published_at, created_at, updated_at)
             VALUES (?, ?, '', '', '', ?, ?, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
        )
        .bind(slug)
        .bind(slug)
        .bind(status)
        .bind(published)
        .execute(pool.as_sqlite().unwrap())
        .await
        .unwrap()
        .last_insert_rowid()
    }

    #[tokio::test]
    async fn test_attach_is_idempotent_and_counts_published_only() {
        let (pool, repo) = setup().await;
        let rust = repo.create("rust", "Rust").await.unwrap();
        let live = insert_post(&pool, "live", "published").await;
        let draft = insert_post(&pool, "draft", "draft").await;

        repo.attach(live, rust.id).await.unwrap();
        repo.attach(live, rust.id).await.unwrap();
        repo.attach(draft, rust.id).await.unwrap();

        let counts = repo.list_with_counts().await.unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].post_count, 1);
    }

    #[tokio::test]
    async fn test_replace_for_post() {
        let (pool, repo) = setup().await;
        let a = repo.create("a", "A").await.unwrap();
        let b = repo.create("b", "B").await.unwrap();
        let c = repo.create("c", "C").await.unwrap();
        let post = insert_post(&pool, "p", "draft").await;

        repo.replace_for_post(post, &[a.id, b.id]).await.unwrap();
        repo.replace_for_post(post, &[b.id, c.id]).await.unwrap();

        let names: Vec<String> = repo
            .list_for_post(post)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["B", "C"]);

        repo.detach(post, b.id).await.unwrap();
        assert_eq!(repo.list_for_post(post).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_for_posts_groups_by_post() {
        let (pool, repo) = setup().await;
        let a = repo.create("a", "A").await.unwrap();
        let first = insert_post(&pool, "first", "draft").await;
        let second = insert_post(&pool, "second", "draft").await;
        repo.attach(first, a.id).await.unwrap();

        let map = repo.list_for_posts(&[first, second]).await.unwrap();
        assert_eq!(map.get(&first).map(Vec::len), Some(1));
        assert!(!map.contains_key(&second));
        assert!(repo.list_for_posts(&[]).await.unwrap().is_empty());
    }
}
