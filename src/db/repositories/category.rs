//! Category repository
//!
//! Database operations for post categories.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Category;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const CATEGORY_COLUMNS: &str = "id, name, slug, icon, color, hover_color, created_at";

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn create(&self, category: &Category) -> Result<Category>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    /// List all categories ordered by name
    async fn list(&self) -> Result<Vec<Category>>;

    /// Check whether a category with this name or slug exists
    async fn exists(&self, name: &str, slug: &str) -> Result<bool>;

    /// Number of posts referencing the category
    async fn post_count(&self, id: i64) -> Result<i64>;

    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based category repository implementation
pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, category: &Category) -> Result<Category> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_category_sqlite(self.pool.as_sqlite().unwrap(), category).await,
            DatabaseDriver::Mysql => create_category_mysql(self.pool.as_mysql().unwrap(), category).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let sql = format!("SELECT {} FROM categories WHERE id = ?", CATEGORY_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to get category by ID")?;
                Ok(row.as_ref().map(row_to_category_sqlite))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to get category by ID")?;
                Ok(row.as_ref().map(row_to_category_mysql))
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let sql = format!("SELECT {} FROM categories WHERE slug = ?", CATEGORY_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(slug)
                    .fetch_optional(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to get category by slug")?;
                Ok(row.as_ref().map(row_to_category_sqlite))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(slug)
                    .fetch_optional(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to get category by slug")?;
                Ok(row.as_ref().map(row_to_category_mysql))
            }
        }
    }

    async fn list(&self) -> Result<Vec<Category>> {
        let sql = format!("SELECT {} FROM categories ORDER BY name ASC", CATEGORY_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .fetch_all(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to list categories")?;
                Ok(rows.iter().map(row_to_category_sqlite).collect())
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .fetch_all(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to list categories")?;
                Ok(rows.iter().map(row_to_category_mysql).collect())
            }
        }
    }

    async fn exists(&self, name: &str, slug: &str) -> Result<bool> {
        let sql = "SELECT COUNT(*) as count FROM categories WHERE LOWER(name) = LOWER(?) OR slug = ?";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(name)
                .bind(slug)
                .fetch_one(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to check category existence")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(name)
                .bind(slug)
                .fetch_one(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to check category existence")?
                .get("count"),
        };
        Ok(count > 0)
    }

    async fn post_count(&self, id: i64) -> Result<i64> {
        let sql = "SELECT COUNT(*) as count FROM posts WHERE category_id = ?";
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .fetch_one(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to count category posts")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .fetch_one(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to count category posts")?
                .get("count"),
        };
        Ok(count)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM categories WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to delete category")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to delete category")?;
            }
        }
        Ok(())
    }
}

const INSERT_CATEGORY: &str = r#"
    INSERT INTO categories (name, slug, icon, color, hover_color, created_at)
    VALUES (?, ?, ?, ?, ?, ?)
"#;

// SQLite implementations

async fn create_category_sqlite(pool: &SqlitePool, category: &Category) -> Result<Category> {
    let result = sqlx::query(INSERT_CATEGORY)
        .bind(&category.name)
        .bind(&category.slug)
        .bind(&category.icon)
        .bind(&category.color)
        .bind(&category.hover_color)
        .bind(category.created_at)
        .execute(pool)
        .await
        .context("Failed to create category")?;

    Ok(Category {
        id: result.last_insert_rowid(),
        ..category.clone()
    })
}

fn row_to_category_sqlite(row: &sqlx::sqlite::SqliteRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        icon: row.get("icon"),
        color: row.get("color"),
        hover_color: row.get("hover_color"),
        created_at: row.get("created_at"),
    }
}

// MySQL implementations

async fn create_category_mysql(pool: &MySqlPool, category: &Category) -> Result<Category> {
    let result = sqlx::query(INSERT_CATEGORY)
        .bind(&category.name)
        .bind(&category.slug)
        .bind(&category.icon)
        .bind(&category.color)
        .bind(&category.hover_color)
        .bind(category.created_at)
        .execute(pool)
        .await
        .context("Failed to create category")?;

    Ok(Category {
        id: result.last_insert_id() as i64,
        ..category.clone()
    })
}

fn row_to_category_mysql(row: &sqlx::mysql::MySqlRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        icon: row.get("icon"),
        color: row.get("color"),
        hover_color: row.get("hover_color"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::models::{DEFAULT_COLOR, DEFAULT_HOVER_COLOR, DEFAULT_ICON};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxCategoryRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        (pool.clone(), SqlxCategoryRepository::new(pool))
    }

    fn category(name: &str, slug: &str) -> Category {
        Category::new(
            name.to_string(),
            slug.to_string(),
            DEFAULT_ICON.to_string(),
            DEFAULT_COLOR.to_string(),
            DEFAULT_HOVER_COLOR.to_string(),
        )
    }

    #[tokio::test]
    async fn test_create_and_get_category() {
        let (_pool, repo) = setup_test_repo().await;

        let created = repo.create(&category("Nutrition", "nutrition")).await.unwrap();
        assert!(created.id > 0);

        let by_slug = repo.get_by_slug("nutrition").await.unwrap().unwrap();
        assert_eq!(by_slug.id, created.id);
        assert_eq!(by_slug.icon, DEFAULT_ICON);

        let by_id = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.name, "Nutrition");
    }

    #[tokio::test]
    async fn test_list_includes_seeded_category() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&category("Allergies", "allergies")).await.unwrap();

        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Allergies".to_string(), "General".to_string()]);
    }

    #[tokio::test]
    async fn test_exists_checks_name_and_slug() {
        let (_pool, repo) = setup_test_repo().await;
        assert!(repo.exists("general", "something-else").await.unwrap());
        assert!(repo.exists("Other", "general").await.unwrap());
        assert!(!repo.exists("Vaccines", "vaccines").await.unwrap());
    }

    #[tokio::test]
    async fn test_post_count_and_delete() {
        let (pool, repo) = setup_test_repo().await;
        let created = repo.create(&category("Sleep", "sleep")).await.unwrap();
        assert_eq!(repo.post_count(created.id).await.unwrap(), 0);

        pool.execute("INSERT INTO users (username, email, password_hash) VALUES ('a', 'a@x.org', 'h')")
            .await
            .unwrap();
        pool.execute(&format!(
            "INSERT INTO posts (slug, title, content, category_id, author_id) VALUES ('s', 'S', 'c', {}, 1)",
            created.id
        ))
        .await
        .unwrap();
        assert_eq!(repo.post_count(created.id).await.unwrap(), 1);

        let general = repo.get_by_slug("general").await.unwrap().unwrap();
        repo.delete(general.id).await.unwrap();
        assert!(repo.get_by_slug("general").await.unwrap().is_none());
    }
}
