//! Blog post model
//!
//! This module provides:
//! - `Post` entity and its `PostStatus`
//! - Input types for creating and updating posts
//! - `PostFilter` for list queries
//! - Pagination types shared by every list endpoint

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Category, Tag};

/// Blog post entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: i64,
    /// URL-friendly slug
    pub slug: String,
    pub title: String,
    /// Markdown source
    pub content: String,
    /// Rendered HTML
    pub content_html: String,
    /// Short plain-text summary
    pub excerpt: String,
    pub cover_image: Option<String>,
    pub category_id: Option<i64>,
    pub status: PostStatus,
    /// Estimated reading time in minutes
    pub reading_minutes: i32,
    /// Set whenever `status` is `Published`
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn is_published(&self) -> bool {
        self.status == PostStatus::Published
    }
}

/// Publication status shared by posts and projects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    /// Not visible to the public
    #[default]
    Draft,
    /// Visible to the public
    Published,
}

impl PostStatus {
    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
        }
    }

    /// Parse the database representation
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(PostStatus::Draft),
            "published" => Some(PostStatus::Published),
            _ => None,
        }
    }

    /// Publication timestamp a row should carry after moving to this status.
    ///
    /// Publishing stamps `now` unless the row was already published, in which
    /// case the original date is kept. Drafts carry no date.
    pub fn published_at(
        &self,
        previous: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self {
            PostStatus::Published => Some(previous.unwrap_or(now)),
            PostStatus::Draft => None,
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Input for creating a post
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatePostInput {
    pub title: String,
    /// Generated from the title when empty
    #[serde(default)]
    pub slug: Option<String>,
    pub content: String,
    /// Derived from the content when absent
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub category_id: Option<i64>,
    /// Tag names; unknown names are created
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: PostStatus,
}

impl CreatePostInput {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: PostStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn with_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }
}

/// Partial update for a post
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePostInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub cover_image: Option<String>,
    /// `Some(None)` clears the category
    #[serde(default, with = "double_option")]
    pub category_id: Option<Option<i64>>,
    /// Replaces the full tag set when present
    pub tags: Option<Vec<String>>,
    pub status: Option<PostStatus>,
}

impl UpdatePostInput {
    pub fn has_changes(&self) -> bool {
        self.title.is_some()
            || self.slug.is_some()
            || self.content.is_some()
            || self.excerpt.is_some()
            || self.cover_image.is_some()
            || self.category_id.is_some()
            || self.tags.is_some()
            || self.status.is_some()
    }
}

/// Distinguishes an absent field from an explicit `null`.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, T>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

/// Criteria for post list queries. Empty fields do not filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostFilter {
    pub status: Option<PostStatus>,
    pub category_id: Option<i64>,
    pub tag_id: Option<i64>,
    /// Case-insensitive keyword matched against title, excerpt and content
    pub search: Option<String>,
}

impl PostFilter {
    pub fn published() -> Self {
        Self {
            status: Some(PostStatus::Published),
            ..Default::default()
        }
    }

    pub fn with_search(mut self, keyword: impl Into<String>) -> Self {
        self.search = Some(keyword.into());
        self
    }

    /// `LIKE` pattern for the search keyword, see [`super::contains_pattern`]
    pub fn search_pattern(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(super::contains_pattern)
    }
}

/// Post with its category and tags resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    pub category: Option<Category>,
    pub tags: Vec<Tag>,
}

/// Pagination parameters for list queries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ListParams {
    /// 1-indexed page number
    pub page: u32,
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
        }
    }
}

impl ListParams {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// A page of results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    /// Total matching items across all pages
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
        }
    }

    pub fn total_pages(&self) -> u32 {
        if self.per_page == 0 || self.total <= 0 {
            return 0;
        }
        let total = self.total as u64;
        let per_page = self.per_page as u64;
        total.div_ceil(per_page) as u32
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn test_status_round_trip_and_case() {
        assert_eq!(PostStatus::parse("Published"), Some(PostStatus::Published));
        assert_eq!(PostStatus::parse("draft"), Some(PostStatus::Draft));
        assert_eq!(PostStatus::parse("archived"), None);
        assert_eq!(PostStatus::Published.to_string(), "published");
    }

    #[test]
    fn test_published_at_rules() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(PostStatus::Published.published_at(None, now), Some(now));
        assert_eq!(
            PostStatus::Published.published_at(Some(earlier), now),
            Some(earlier)
        );
        assert_eq!(PostStatus::Draft.published_at(Some(earlier), now), None);
    }

    #[test]
    fn test_update_input_category_null_vs_absent() {
        let absent: UpdatePostInput = serde_json::from_str(r#"{"title":"x"}"#).unwrap();
        assert_eq!(absent.category_id, None);

        let cleared: UpdatePostInput = serde_json::from_str(r#"{"category_id":null}"#).unwrap();
        assert_eq!(cleared.category_id, Some(None));
        assert!(cleared.has_changes());

        let set: UpdatePostInput = serde_json::from_str(r#"{"category_id":3}"#).unwrap();
        assert_eq!(set.category_id, Some(Some(3)));
    }

    #[test]
    fn test_search_pattern() {
        assert_eq!(
            PostFilter::default().with_search("  Rust ").search_pattern(),
            Some("%rust%".to_string())
        );
        assert_eq!(
            PostFilter::default().with_search("50%").search_pattern(),
            Some("%50!%%".to_string())
        );
        assert_eq!(PostFilter::default().with_search("   ").search_pattern(), None);
        assert_eq!(PostFilter::default().search_pattern(), None);
    }

    #[test]
    fn test_paged_result_navigation() {
        let params = ListParams::new(2, 10);
        let result = PagedResult::new(vec![1, 2, 3], 23, &params);
        assert_eq!(result.total_pages(), 3);
        assert!(result.has_next());
        assert!(result.has_prev());

        let empty: PagedResult<i32> = PagedResult::new(vec![], 0, &ListParams::default());
        assert_eq!(empty.total_pages(), 0);
        assert!(!empty.has_next());
        assert!(!empty.has_prev());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_list_params_are_clamped(page in 0u32..10_000, per_page in 0u32..10_000) {
            let params = ListParams::new(page, per_page);
            prop_assert!(params.page >= 1);
            prop_assert!((1..=100).contains(&params.per_page));
            prop_assert_eq!(params.offset(), (params.page as i64 - 1) * params.per_page as i64);
        }

        #[test]
        fn prop_total_pages_covers_total(total in 0i64..100_000, per_page in 1u32..=100) {
            let params = ListParams::new(1, per_page);
            let result: PagedResult<()> = PagedResult::new(vec![], total, &params);
            let pages = result.total_pages() as i64;
            prop_assert!(pages * per_page as i64 >= total);
            prop_assert!(pages == 0 || (pages - 1) * (per_page as i64) < total);
        }
    }
}
