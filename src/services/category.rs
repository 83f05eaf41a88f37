//! Category service
//!
//! Category creation with slug generation and presentation defaults,
//! a cached category list, and guarded deletion.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::CategoryRepository;
use crate::models::{Category, CreateCategoryInput, DEFAULT_COLOR, DEFAULT_HOVER_COLOR, DEFAULT_ICON};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

pub(crate) const CACHE_KEY_CATEGORY_LIST: &str = "category:list";

/// Error types for category service operations
#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("Category already exists: {0}")]
    Duplicate(String),

    #[error("Category not found: {0}")]
    NotFound(String),

    /// Posts still reference the category
    #[error("Category is used by {0} post(s)")]
    CategoryInUse(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>, cache: Arc<Cache>) -> Self {
        let cache_ttl = cache.default_ttl();
        Self {
            repo,
            cache,
            cache_ttl,
        }
    }

    /// All categories ordered by name, served from cache when possible
    pub async fn list(&self) -> Result<Vec<Category>, CategoryServiceError> {
        if let Some(cached) = self.cache.get::<Vec<Category>>(CACHE_KEY_CATEGORY_LIST).await? {
            return Ok(cached);
        }

        let categories = self.repo.list().await.context("Failed to list categories")?;
        self.cache
            .set(CACHE_KEY_CATEGORY_LIST, &categories, self.cache_ttl)
            .await?;
        Ok(categories)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>, CategoryServiceError> {
        Ok(self.repo.get_by_slug(slug).await?)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Category>, CategoryServiceError> {
        Ok(self.repo.get_by_id(id).await?)
    }

    /// Resolve a category reference given either as a slug or a numeric id
    pub async fn resolve(&self, reference: &str) -> Result<Option<Category>, CategoryServiceError> {
        Ok(resolve_category(self.repo.as_ref(), reference).await?)
    }

    pub async fn create(&self, input: CreateCategoryInput) -> Result<Category, CategoryServiceError> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(CategoryServiceError::ValidationError(
                "Category name is required".to_string(),
            ));
        }

        let slug = generate_slug(name);
        if slug.is_empty() {
            return Err(CategoryServiceError::ValidationError(
                "Category name must contain letters or digits".to_string(),
            ));
        }

        if self.repo.exists(name, &slug).await? {
            return Err(CategoryServiceError::Duplicate(name.to_string()));
        }

        let category = Category::new(
            name.to_string(),
            slug,
            non_blank_or(input.icon, DEFAULT_ICON),
            non_blank_or(input.color, DEFAULT_COLOR),
            non_blank_or(input.hover_color, DEFAULT_HOVER_COLOR),
        );
        let created = self.repo.create(&category).await?;
        self.invalidate_cache().await?;

        tracing::info!(category_id = created.id, slug = %created.slug, "Created category");
        Ok(created)
    }

    /// Delete a category that no post references
    pub async fn delete(&self, id: i64) -> Result<(), CategoryServiceError> {
        if self.repo.get_by_id(id).await?.is_none() {
            return Err(CategoryServiceError::NotFound(id.to_string()));
        }

        let posts = self.repo.post_count(id).await?;
        if posts > 0 {
            return Err(CategoryServiceError::CategoryInUse(posts));
        }

        self.repo.delete(id).await?;
        self.invalidate_cache().await?;
        Ok(())
    }

    async fn invalidate_cache(&self) -> Result<(), CategoryServiceError> {
        self.cache.delete(CACHE_KEY_CATEGORY_LIST).await?;
        Ok(())
    }
}

/// Look a category up by slug first, then by numeric id
pub(crate) async fn resolve_category(
    repo: &dyn CategoryRepository,
    reference: &str,
) -> anyhow::Result<Option<Category>> {
    let reference = reference.trim();
    if let Some(category) = repo.get_by_slug(reference).await? {
        return Ok(Some(category));
    }
    match reference.parse::<i64>() {
        Ok(id) => repo.get_by_id(id).await,
        Err(_) => Ok(None),
    }
}

fn non_blank_or(value: Option<String>, default: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Turn a display string into a URL slug.
///
/// Lowercases, maps spaces, underscores and ASCII punctuation to `-`,
/// keeps non-ASCII letters, collapses runs of `-` and trims them from
/// both ends.
pub fn generate_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut prev_hyphen = false;

    for c in name.to_lowercase().chars() {
        let mapped = if c.is_ascii_alphanumeric() || (!c.is_ascii() && c.is_alphanumeric()) {
            c
        } else {
            '-'
        };

        if mapped == '-' {
            if !prev_hyphen && !slug.is_empty() {
                slug.push('-');
                prev_hyphen = true;
            }
        } else {
            slug.push(mapped);
            prev_hyphen = false;
        }
    }

    slug.trim_end_matches('-').to_string()
}
