//! Post model
//!
//! This module provides:
//! - `Post` entity and `PostWithMeta` (post joined with category and author)
//! - `PostSort` for the public list filters
//! - `PostFilter` used by repository list queries
//! - Input types for creating and updating posts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of posts that may be featured at the same time
pub const MAX_FEATURED_POSTS: i64 = 3;

/// Post entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    /// Unique identifier
    pub id: i64,
    /// URL-friendly slug
    pub slug: String,
    pub title: String,
    /// Short summary shown on cards
    pub description: String,
    /// Rich-text (HTML) body
    pub content: String,
    /// Cover image URL
    pub img: Option<String>,
    pub category_id: i64,
    pub author_id: i64,
    pub is_featured: bool,
    pub visit_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn new(
        slug: String,
        title: String,
        description: String,
        content: String,
        img: Option<String>,
        category_id: i64,
        author_id: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by database
            slug,
            title,
            description,
            content,
            img,
            category_id,
            author_id,
            is_featured: false,
            visit_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Post with the category and author fields needed for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostWithMeta {
    #[serde(flatten)]
    pub post: Post,
    pub category_slug: String,
    pub category_name: String,
    pub author_username: String,
}

/// Ordering of public post lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostSort {
    /// Most recent first
    #[default]
    Newest,
    /// Oldest first
    Oldest,
    /// Most visited first
    Popular,
    /// Most visited among posts from the last week
    Trending,
}

impl PostSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostSort::Newest => "newest",
            PostSort::Oldest => "oldest",
            PostSort::Popular => "popular",
            PostSort::Trending => "trending",
        }
    }

    /// SQL ORDER BY clause for this sort
    pub fn order_clause(&self) -> &'static str {
        match self {
            PostSort::Newest => "p.created_at DESC, p.id DESC",
            PostSort::Oldest => "p.created_at ASC, p.id ASC",
            PostSort::Popular | PostSort::Trending => "p.visit_count DESC, p.created_at DESC",
        }
    }
}

impl fmt::Display for PostSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostSort {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "newest" => Ok(PostSort::Newest),
            "oldest" => Ok(PostSort::Oldest),
            "popular" => Ok(PostSort::Popular),
            "trending" => Ok(PostSort::Trending),
            _ => Err(anyhow::anyhow!("Invalid post filter: {}", s)),
        }
    }
}

/// Repository-level filter for post lists
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub category_id: Option<i64>,
    pub author_id: Option<i64>,
    pub featured: Option<bool>,
    /// Case-insensitive substring match on title or description
    pub search: Option<String>,
    /// Only posts created at or after this instant
    pub created_after: Option<DateTime<Utc>>,
    pub sort: PostSort,
}

/// Input for creating a post
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatePostInput {
    pub title: String,
    #[serde(default, alias = "desc")]
    pub description: String,
    pub content: String,
    /// Category slug or numeric id
    pub category: String,
    #[serde(default)]
    pub img: Option<String>,
}

/// Input for updating a post; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePostInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(alias = "desc", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub img: Option<String>,
}

impl UpdatePostInput {
    pub fn has_changes(&self) -> bool {
        self.title.is_some()
            || self.description.is_some()
            || self.content.is_some()
            || self.category.is_some()
            || self.img.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_parsing() {
        assert_eq!(PostSort::from_str("Popular").unwrap(), PostSort::Popular);
        assert_eq!(PostSort::from_str("trending").unwrap(), PostSort::Trending);
        assert!(PostSort::from_str("random").is_err());
        assert_eq!(PostSort::default(), PostSort::Newest);
    }

    #[test]
    fn test_new_post_is_not_featured() {
        let post = Post::new(
            "slug".into(),
            "Title".into(),
            String::new(),
            "Body".into(),
            None,
            1,
            1,
        );
        assert!(!post.is_featured);
        assert_eq!(post.visit_count, 0);
    }

    #[test]
    fn test_update_has_changes() {
        assert!(!UpdatePostInput::default().has_changes());
        let input = UpdatePostInput {
            img: Some("https://cdn.example.org/a.png".into()),
            ..Default::default()
        };
        assert!(input.has_changes());
    }
}
