//! Category and tag models
//!
//! Categories are flat: each post belongs to at most one. Tags are
//! many-to-many through `post_tags`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Blog category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Category with its number of published posts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryWithCount {
    #[serde(flatten)]
    pub category: Category,
    pub post_count: i64,
}

/// Input for creating a category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateCategoryInput {
    pub name: String,
    /// Generated from the name when empty
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl CreateCategoryInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Blog tag
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Tag with its number of published posts, for the tag cloud
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagWithCount {
    #[serde(flatten)]
    pub tag: Tag,
    pub post_count: i64,
}
