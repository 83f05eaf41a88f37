//! Common API utilities and shared types
//!
//! Pagination query parsing and the mapping from service errors to API
//! error codes.

use serde::Deserialize;

use crate::api::middleware::ApiError;
use crate::models::ListParams;
use crate::services::{
    CategoryServiceError, ContactFormServiceError, PostServiceError, UserServiceError,
};

pub fn default_page() -> u32 {
    1
}

pub fn default_limit() -> u32 {
    10
}

/// `?page=&limit=` query parameters
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

impl PageQuery {
    pub fn params(&self) -> ListParams {
        ListParams::new(self.page, self.limit)
    }
}

impl From<PostServiceError> for ApiError {
    fn from(e: PostServiceError) -> Self {
        match e {
            PostServiceError::NotFound(_) => ApiError::not_found("Post not found"),
            PostServiceError::CategoryNotFound(cat) => {
                ApiError::validation_error(format!("Category not found: {}", cat))
            }
            PostServiceError::Forbidden => ApiError::forbidden(e.to_string()),
            PostServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            PostServiceError::FeaturedLimitReached(n) => ApiError::featured_limit(n),
            PostServiceError::InternalError(err) => ApiError::internal_error(err),
        }
    }
}

impl From<CategoryServiceError> for ApiError {
    fn from(e: CategoryServiceError) -> Self {
        match e {
            CategoryServiceError::Duplicate(_) | CategoryServiceError::CategoryInUse(_) => {
                ApiError::conflict(e.to_string())
            }
            CategoryServiceError::NotFound(_) => ApiError::not_found("Category not found"),
            CategoryServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CategoryServiceError::InternalError(err) => ApiError::internal_error(err),
        }
    }
}

impl From<ContactFormServiceError> for ApiError {
    fn from(e: ContactFormServiceError) -> Self {
        match e {
            ContactFormServiceError::NotFound(_) => ApiError::not_found("Contact form not found"),
            ContactFormServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ContactFormServiceError::InternalError(err) => ApiError::internal_error(err),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::SessionExpired | UserServiceError::SessionNotFound => {
                ApiError::unauthorized(e.to_string())
            }
            UserServiceError::InternalError(err) => ApiError::internal_error(err),
        }
    }
}
