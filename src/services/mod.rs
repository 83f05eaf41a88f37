//! Services layer - business logic
//!
//! Services implement the blog's rules on top of the repositories and the
//! cache. Each one exposes its own error enum; the HTTP layer maps those to
//! API error codes.

pub mod category;
pub mod contact_form;
pub mod password;
pub mod post;
pub mod user;

pub use category::{generate_slug, CategoryService, CategoryServiceError};
pub use contact_form::{ContactFormService, ContactFormServiceError};
pub use password::{hash_password, verify_password};
pub use post::{PostListQuery, PostService, PostServiceError};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};
