//! Post service
//!
//! Implements business logic for posts:
//! - public listing with category, sort filter, search and featured flag
//! - reading a post by slug (counts a visit)
//! - authoring: create, update and delete by the owner or an admin
//! - featured curation, capped at `MAX_FEATURED_POSTS`
//!
//! Featured listings are cached under `post:featured:*`; every write that can
//! change a post card clears the `post:*` keys.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{CategoryRepository, PostRepository};
use crate::models::{
    CreatePostInput, ListParams, PagedResult, Post, PostFilter, PostSort, PostWithMeta, UpdatePostInput,
    User, MAX_FEATURED_POSTS,
};
use crate::services::category::{generate_slug, resolve_category};
use anyhow::Context;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const CACHE_KEY_FEATURED_PREFIX: &str = "post:featured:";
const CACHE_PATTERN_POSTS: &str = "post:*";

/// Window used by the `trending` filter
const TRENDING_WINDOW_DAYS: i64 = 7;

/// Static path segments under `/posts/` that a slug must not shadow
const RESERVED_SLUGS: &[&str] = &["feature"];

/// Error types for post service operations
#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    #[error("Post not found: {0}")]
    NotFound(String),

    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    #[error("You can only modify your own posts")]
    Forbidden,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("There are already {0} featured posts")]
    FeaturedLimitReached(i64),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Query accepted by the public post listing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// Category slug
    pub cat: Option<String>,
    /// `newest`, `oldest`, `popular` or `trending`
    pub filter: Option<String>,
    pub search: Option<String>,
    pub is_featured: Option<bool>,
}

impl PostListQuery {
    pub fn params(&self) -> ListParams {
        ListParams::new(self.page.unwrap_or(1), self.limit.unwrap_or(10))
    }
}

pub struct PostService {
    repo: Arc<dyn PostRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl PostService {
    pub fn new(
        repo: Arc<dyn PostRepository>,
        category_repo: Arc<dyn CategoryRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        let cache_ttl = cache.default_ttl();
        Self {
            repo,
            category_repo,
            cache,
            cache_ttl,
        }
    }

    /// Public listing
    ///
    /// An unknown category slug yields an empty page; an unknown filter
    /// name is a validation error.
    pub async fn list(&self, query: &PostListQuery) -> Result<PagedResult<PostWithMeta>, PostServiceError> {
        let params = query.params();
        let sort = match query.filter.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
            Some(name) => PostSort::from_str(name)
                .map_err(|_| PostServiceError::ValidationError(format!("Unknown filter: {}", name)))?,
            None => PostSort::default(),
        };

        let mut filter = PostFilter {
            featured: query.is_featured,
            search: query
                .search
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            sort,
            ..Default::default()
        };

        if sort == PostSort::Trending {
            filter.created_after = Some(Utc::now() - ChronoDuration::days(TRENDING_WINDOW_DAYS));
        }

        if let Some(cat) = query.cat.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            match self.category_repo.get_by_slug(cat).await? {
                Some(category) => filter.category_id = Some(category.id),
                None => return Ok(PagedResult::new(Vec::new(), 0, &params)),
            }
        }

        // Only the plain featured strip is cached
        let cacheable = filter.featured == Some(true)
            && filter.category_id.is_none()
            && filter.search.is_none()
            && sort == PostSort::Newest;
        let cache_key = format!("{}{}:{}", CACHE_KEY_FEATURED_PREFIX, params.page, params.per_page);

        if cacheable {
            if let Ok(Some(cached)) = self.cache.get::<PagedResult<PostWithMeta>>(&cache_key).await {
                return Ok(cached);
            }
        }

        let result = self.query_page(&filter, &params).await?;

        if cacheable {
            let _ = self.cache.set(&cache_key, &result, self.cache_ttl).await;
        }
        Ok(result)
    }

    /// Read a post and count the visit
    pub async fn get_by_slug(&self, slug: &str) -> Result<PostWithMeta, PostServiceError> {
        let post = self
            .repo
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| PostServiceError::NotFound(slug.to_string()))?;

        self.repo
            .increment_visits(post.post.id)
            .await
            .context("Failed to count visit")?;

        let mut post = post;
        post.post.visit_count += 1;
        Ok(post)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<PostWithMeta, PostServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| PostServiceError::NotFound(id.to_string()))
    }

    /// Fetch a post for editing; authors only see their own
    pub async fn get_for_edit(&self, actor: &User, id: i64) -> Result<PostWithMeta, PostServiceError> {
        let post = self.get_by_id(id).await?;
        if !actor.can_edit(post.post.author_id) {
            return Err(PostServiceError::Forbidden);
        }
        Ok(post)
    }

    pub async fn create(&self, author: &User, input: CreatePostInput) -> Result<PostWithMeta, PostServiceError> {
        let title = required(&input.title, "Title")?;
        let content = required(&input.content, "Content")?;
        let category_ref = required(&input.category, "Category")?;

        let category = resolve_category(self.category_repo.as_ref(), category_ref)
            .await?
            .ok_or_else(|| PostServiceError::CategoryNotFound(category_ref.to_string()))?;

        let slug = self.unique_slug(title, None).await?;
        let post = Post::new(
            slug,
            title.to_string(),
            input.description.trim().to_string(),
            content.to_string(),
            normalize_img(input.img),
            category.id,
            author.id,
        );

        let created = self.repo.create(&post).await?;
        self.invalidate_cache().await;

        tracing::info!(post_id = created.id, slug = %created.slug, author_id = author.id, "Created post");
        self.get_by_id(created.id).await
    }

    /// Apply a partial update; only the owner or an admin may edit
    pub async fn update(
        &self,
        actor: &User,
        id: i64,
        input: UpdatePostInput,
    ) -> Result<PostWithMeta, PostServiceError> {
        let existing = self.get_for_edit(actor, id).await?;
        if !input.has_changes() {
            return Ok(existing);
        }

        let mut post = existing.post;

        if let Some(title) = input.title.as_deref() {
            let title = required(title, "Title")?;
            if title != post.title {
                post.slug = self.unique_slug(title, Some(&post.slug)).await?;
                post.title = title.to_string();
            }
        }
        if let Some(content) = input.content.as_deref() {
            post.content = required(content, "Content")?.to_string();
        }
        if let Some(description) = input.description {
            post.description = description.trim().to_string();
        }
        if let Some(category_ref) = input.category.as_deref() {
            let category = resolve_category(self.category_repo.as_ref(), category_ref)
                .await?
                .ok_or_else(|| PostServiceError::CategoryNotFound(category_ref.to_string()))?;
            post.category_id = category.id;
        }
        if input.img.is_some() {
            post.img = normalize_img(input.img);
        }
        post.updated_at = Utc::now();

        let updated = self.repo.update(&post).await?;
        self.invalidate_cache().await;
        Ok(updated)
    }

    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), PostServiceError> {
        let post = self.get_for_edit(actor, id).await?;
        self.repo.delete(post.post.id).await?;
        self.invalidate_cache().await;
        tracing::info!(post_id = id, actor_id = actor.id, "Deleted post");
        Ok(())
    }

    /// Flip the featured flag.
    ///
    /// Featuring is a single conditional UPDATE, so two concurrent requests
    /// cannot both take the last free slot.
    pub async fn toggle_featured(&self, id: i64) -> Result<PostWithMeta, PostServiceError> {
        let current = self.get_by_id(id).await?;

        if current.post.is_featured {
            self.repo.unfeature(id).await?;
        } else if !self.repo.feature_if_room(id, MAX_FEATURED_POSTS).await? {
            let now = self.get_by_id(id).await?;
            if !now.post.is_featured {
                let featured = self.repo.count_featured().await?;
                tracing::debug!(post_id = id, featured, "Featured limit reached");
                return Err(PostServiceError::FeaturedLimitReached(featured));
            }
        }

        self.invalidate_cache().await;
        self.get_by_id(id).await
    }

    pub async fn list_by_author(
        &self,
        author_id: i64,
        params: &ListParams,
    ) -> Result<PagedResult<PostWithMeta>, PostServiceError> {
        let filter = PostFilter {
            author_id: Some(author_id),
            ..Default::default()
        };
        self.query_page(&filter, params).await
    }

    pub async fn list_all(&self, params: &ListParams) -> Result<PagedResult<PostWithMeta>, PostServiceError> {
        self.query_page(&PostFilter::default(), params).await
    }

    async fn query_page(
        &self,
        filter: &PostFilter,
        params: &ListParams,
    ) -> Result<PagedResult<PostWithMeta>, PostServiceError> {
        let items = self.repo.list(filter, params).await?;
        let total = self.repo.count(filter).await?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Slug from the title, suffixed `-2`, `-3`, ... until free.
    /// `current` is the post's own slug, which never counts as taken.
    /// Reserved route segments always count as taken.
    async fn unique_slug(&self, title: &str, current: Option<&str>) -> Result<String, PostServiceError> {
        let mut base = generate_slug(title);
        if base.is_empty() {
            base = "post".to_string();
        }

        let mut candidate = base.clone();
        let mut n = 2;
        while Some(candidate.as_str()) != current
            && (RESERVED_SLUGS.contains(&candidate.as_str()) || self.repo.exists_by_slug(&candidate).await?)
        {
            candidate = format!("{}-{}", base, n);
            n += 1;
        }
        Ok(candidate)
    }

    async fn invalidate_cache(&self) {
        if let Err(e) = self.cache.delete_pattern(CACHE_PATTERN_POSTS).await {
            tracing::warn!("Failed to clear post cache: {}", e);
        }
    }
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str, PostServiceError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(PostServiceError::ValidationError(format!("{} is required", field)));
    }
    Ok(value)
}

fn normalize_img(img: Option<String>) -> Option<String> {
    img.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
