//! Category model
//!
//! Categories group posts and carry their own presentation hints
//! (an icon class plus base and hover color classes).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ICON: &str = "fas fa-folder";
pub const DEFAULT_COLOR: &str = "bg-blue-600 text-white";
pub const DEFAULT_HOVER_COLOR: &str = "hover:bg-blue-700";

/// Category entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    /// Unique identifier
    pub id: i64,
    /// Display name (unique)
    pub name: String,
    /// URL-friendly slug (unique)
    pub slug: String,
    /// Icon class
    pub icon: String,
    /// Base color classes
    pub color: String,
    /// Hover color classes
    pub hover_color: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Category {
    /// Create a new Category; the ID is assigned by the database.
    pub fn new(name: String, slug: String, icon: String, color: String, hover_color: String) -> Self {
        Self {
            id: 0,
            name,
            slug,
            icon,
            color,
            hover_color,
            created_at: Utc::now(),
        }
    }
}

/// Input for creating a category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryInput {
    pub name: String,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub hover_color: Option<String>,
}

impl CreateCategoryInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}
