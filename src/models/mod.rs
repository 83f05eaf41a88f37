//! Data models
//!
//! This module contains the data structures used throughout the blog:
//! - Database entities (Post, Category, ContactForm, User, Session)
//! - Input types for create/update operations
//! - Pagination types

mod category;
mod contact_form;
mod pagination;
mod post;
mod session;
mod user;

pub use category::{Category, CreateCategoryInput, DEFAULT_COLOR, DEFAULT_HOVER_COLOR, DEFAULT_ICON};
pub use contact_form::{ContactForm, ContactStatus, CreateContactFormInput};
pub use pagination::{ListParams, PagedResult};
pub use post::{
    CreatePostInput, Post, PostFilter, PostSort, PostWithMeta, UpdatePostInput, MAX_FEATURED_POSTS,
};
pub use session::Session;
pub use user::{User, UserRole};
