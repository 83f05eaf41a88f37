//! Post repository
//!
//! Database operations for posts. Reads join the category and author so the
//! API can render cards without extra lookups.
//!
//! The featured limit is enforced inside a single UPDATE so that concurrent
//! feature requests cannot push the number of featured posts past the limit.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{ListParams, Post, PostFilter, PostWithMeta};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const POST_SELECT: &str = r#"
    SELECT p.id, p.slug, p.title, p.description, p.content, p.img, p.category_id,
           p.author_id, p.is_featured, p.visit_count, p.created_at, p.updated_at,
           c.slug AS category_slug, c.name AS category_name, u.username AS author_username
    FROM posts p
    JOIN categories c ON c.id = p.category_id
    JOIN users u ON u.id = p.author_id
"#;

// Every optional filter is bound twice: once for the NULL check, once for the comparison.
const POST_FILTER: &str = r#"
    WHERE (? IS NULL OR p.category_id = ?)
      AND (? IS NULL OR p.author_id = ?)
      AND (? IS NULL OR p.is_featured = ?)
      AND (? IS NULL OR LOWER(p.title) LIKE ? OR LOWER(p.description) LIKE ?)
      AND (? IS NULL OR p.created_at >= ?)
"#;

const INSERT_POST: &str = r#"
    INSERT INTO posts (slug, title, description, content, img, category_id, author_id,
                       is_featured, visit_count, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_POST: &str = r#"
    UPDATE posts
    SET slug = ?, title = ?, description = ?, content = ?, img = ?, category_id = ?, updated_at = ?
    WHERE id = ?
"#;

const FEATURE_IF_ROOM_SQLITE: &str = r#"
    UPDATE posts SET is_featured = 1
    WHERE id = ? AND is_featured = 0
      AND (SELECT featured.total FROM (SELECT COUNT(*) AS total FROM posts WHERE is_featured = 1) AS featured) < ?
"#;

// MySQL refuses to read the UPDATE target in a subquery unless it is materialized;
// the aggregate keeps the derived table from being merged.
const FEATURE_IF_ROOM_MYSQL: &str = r#"
    UPDATE posts SET is_featured = 1, updated_at = updated_at
    WHERE id = ? AND is_featured = 0
      AND (SELECT featured.total FROM (SELECT COUNT(*) AS total FROM posts WHERE is_featured = 1) AS featured) < ?
"#;

macro_rules! bind_filter {
    ($query:expr, $filter:expr) => {{
        let filter: &PostFilter = $filter;
        let search = filter
            .search
            .as_ref()
            .map(|s| format!("%{}%", s.trim().to_lowercase()));
        $query
            .bind(filter.category_id)
            .bind(filter.category_id)
            .bind(filter.author_id)
            .bind(filter.author_id)
            .bind(filter.featured)
            .bind(filter.featured)
            .bind(search.clone())
            .bind(search.clone())
            .bind(search)
            .bind(filter.created_after)
            .bind(filter.created_after)
    }};
}

/// Post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, post: &Post) -> Result<Post>;

    async fn get_by_id(&self, id: i64) -> Result<Option<PostWithMeta>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<PostWithMeta>>;

    async fn exists_by_slug(&self, slug: &str) -> Result<bool>;

    /// List posts matching the filter, ordered by the filter's sort
    async fn list(&self, filter: &PostFilter, params: &ListParams) -> Result<Vec<PostWithMeta>>;

    /// Count posts matching the filter
    async fn count(&self, filter: &PostFilter) -> Result<i64>;

    /// Persist editable fields and return the refreshed post
    async fn update(&self, post: &Post) -> Result<PostWithMeta>;

    async fn delete(&self, id: i64) -> Result<()>;

    async fn increment_visits(&self, id: i64) -> Result<()>;

    async fn count_featured(&self) -> Result<i64>;

    /// Mark the post featured only while fewer than `limit` posts are featured.
    /// Returns false when nothing changed.
    async fn feature_if_room(&self, id: i64, limit: i64) -> Result<bool>;

    /// Clear the featured flag, returning false when it was not set
    async fn unfeature(&self, id: i64) -> Result<bool>;
}

/// SQLx-based post repository implementation
pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }

    async fn execute_by_id(&self, sql: &str, id: i64, context: &'static str) -> Result<u64> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context(context)?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context(context)?
                .rows_affected(),
        };
        Ok(affected)
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, post: &Post) -> Result<Post> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_post_sqlite(self.pool.as_sqlite().unwrap(), post).await,
            DatabaseDriver::Mysql => create_post_mysql(self.pool.as_mysql().unwrap(), post).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<PostWithMeta>> {
        let sql = format!("{} WHERE p.id = ?", POST_SELECT);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to get post by ID")?;
                Ok(row.as_ref().map(row_to_post_sqlite))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to get post by ID")?;
                Ok(row.as_ref().map(row_to_post_mysql))
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<PostWithMeta>> {
        let sql = format!("{} WHERE p.slug = ?", POST_SELECT);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(slug)
                    .fetch_optional(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to get post by slug")?;
                Ok(row.as_ref().map(row_to_post_sqlite))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(slug)
                    .fetch_optional(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to get post by slug")?;
                Ok(row.as_ref().map(row_to_post_mysql))
            }
        }
    }

    async fn exists_by_slug(&self, slug: &str) -> Result<bool> {
        let sql = "SELECT COUNT(*) as count FROM posts WHERE slug = ?";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(slug)
                .fetch_one(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to check slug existence")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(slug)
                .fetch_one(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to check slug existence")?
                .get("count"),
        };
        Ok(count > 0)
    }

    async fn list(&self, filter: &PostFilter, params: &ListParams) -> Result<Vec<PostWithMeta>> {
        let sql = format!(
            "{} {} ORDER BY {} LIMIT ? OFFSET ?",
            POST_SELECT,
            POST_FILTER,
            filter.sort.order_clause()
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = bind_filter!(sqlx::query(&sql), filter)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to list posts")?;
                Ok(rows.iter().map(row_to_post_sqlite).collect())
            }
            DatabaseDriver::Mysql => {
                let rows = bind_filter!(sqlx::query(&sql), filter)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to list posts")?;
                Ok(rows.iter().map(row_to_post_mysql).collect())
            }
        }
    }

    async fn count(&self, filter: &PostFilter) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) as count FROM posts p {}", POST_FILTER);
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => bind_filter!(sqlx::query(&sql), filter)
                .fetch_one(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to count posts")?
                .get("count"),
            DatabaseDriver::Mysql => bind_filter!(sqlx::query(&sql), filter)
                .fetch_one(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to count posts")?
                .get("count"),
        };
        Ok(count)
    }

    async fn update(&self, post: &Post) -> Result<PostWithMeta> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(UPDATE_POST)
                    .bind(&post.slug)
                    .bind(&post.title)
                    .bind(&post.description)
                    .bind(&post.content)
                    .bind(&post.img)
                    .bind(post.category_id)
                    .bind(post.updated_at)
                    .bind(post.id)
                    .execute(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to update post")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(UPDATE_POST)
                    .bind(&post.slug)
                    .bind(&post.title)
                    .bind(&post.description)
                    .bind(&post.content)
                    .bind(&post.img)
                    .bind(post.category_id)
                    .bind(post.updated_at)
                    .bind(post.id)
                    .execute(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to update post")?;
            }
        }

        self.get_by_id(post.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Post not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.execute_by_id("DELETE FROM posts WHERE id = ?", id, "Failed to delete post")
            .await?;
        Ok(())
    }

    async fn increment_visits(&self, id: i64) -> Result<()> {
        let sql = match self.pool.driver() {
            DatabaseDriver::Sqlite => "UPDATE posts SET visit_count = visit_count + 1 WHERE id = ?",
            DatabaseDriver::Mysql => {
                "UPDATE posts SET visit_count = visit_count + 1, updated_at = updated_at WHERE id = ?"
            }
        };
        self.execute_by_id(sql, id, "Failed to increment visit count")
            .await?;
        Ok(())
    }

    async fn count_featured(&self) -> Result<i64> {
        let filter = PostFilter {
            featured: Some(true),
            ..PostFilter::default()
        };
        self.count(&filter).await
    }

    async fn feature_if_room(&self, id: i64, limit: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(FEATURE_IF_ROOM_SQLITE)
                .bind(id)
                .bind(limit)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to feature post")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(FEATURE_IF_ROOM_MYSQL)
                .bind(id)
                .bind(limit)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to feature post")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn unfeature(&self, id: i64) -> Result<bool> {
        let sql = match self.pool.driver() {
            DatabaseDriver::Sqlite => "UPDATE posts SET is_featured = 0 WHERE id = ? AND is_featured = 1",
            DatabaseDriver::Mysql => {
                "UPDATE posts SET is_featured = 0, updated_at = updated_at WHERE id = ? AND is_featured = 1"
            }
        };
        let affected = self.execute_by_id(sql, id, "Failed to unfeature post").await?;
        Ok(affected > 0)
    }
}

// SQLite implementations

async fn create_post_sqlite(pool: &SqlitePool, post: &Post) -> Result<Post> {
    let result = sqlx::query(INSERT_POST)
        .bind(&post.slug)
        .bind(&post.title)
        .bind(&post.description)
        .bind(&post.content)
        .bind(&post.img)
        .bind(post.category_id)
        .bind(post.author_id)
        .bind(post.is_featured)
        .bind(post.visit_count)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(pool)
        .await
        .context("Failed to create post")?;

    Ok(Post {
        id: result.last_insert_rowid(),
        ..post.clone()
    })
}

fn row_to_post_sqlite(row: &sqlx::sqlite::SqliteRow) -> PostWithMeta {
    PostWithMeta {
        post: Post {
            id: row.get("id"),
            slug: row.get("slug"),
            title: row.get("title"),
            description: row.get("description"),
            content: row.get("content"),
            img: row.get("img"),
            category_id: row.get("category_id"),
            author_id: row.get("author_id"),
            is_featured: row.get("is_featured"),
            visit_count: row.get("visit_count"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        },
        category_slug: row.get("category_slug"),
        category_name: row.get("category_name"),
        author_username: row.get("author_username"),
    }
}

// MySQL implementations

async fn create_post_mysql(pool: &MySqlPool, post: &Post) -> Result<Post> {
    let result = sqlx::query(INSERT_POST)
        .bind(&post.slug)
        .bind(&post.title)
        .bind(&post.description)
        .bind(&post.content)
        .bind(&post.img)
        .bind(post.category_id)
        .bind(post.author_id)
        .bind(post.is_featured)
        .bind(post.visit_count)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(pool)
        .await
        .context("Failed to create post")?;

    Ok(Post {
        id: result.last_insert_id() as i64,
        ..post.clone()
    })
}

fn row_to_post_mysql(row: &sqlx::mysql::MySqlRow) -> PostWithMeta {
    PostWithMeta {
        post: Post {
            id: row.get("id"),
            slug: row.get("slug"),
            title: row.get("title"),
            description: row.get("description"),
            content: row.get("content"),
            img: row.get("img"),
            category_id: row.get("category_id"),
            author_id: row.get("author_id"),
            is_featured: row.get("is_featured"),
            visit_count: row.get("visit_count"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        },
        category_slug: row.get("category_slug"),
        category_name: row.get("category_name"),
        author_username: row.get("author_username"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::models::{PostSort, MAX_FEATURED_POSTS};
    use chrono::{Duration, Utc};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxPostRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool.execute("INSERT INTO users (id, username, email, password_hash) VALUES (1, 'ana', 'ana@x.org', 'h')")
            .await
            .unwrap();
        pool.execute("INSERT INTO users (id, username, email, password_hash) VALUES (2, 'luis', 'luis@x.org', 'h')")
            .await
            .unwrap();
        pool.execute("INSERT INTO categories (id, name, slug) VALUES (10, 'Vaccines', 'vaccines')")
            .await
            .unwrap();
        (pool.clone(), SqlxPostRepository::new(pool))
    }

    fn post(slug: &str, title: &str, category_id: i64, author_id: i64) -> Post {
        Post::new(
            slug.to_string(),
            title.to_string(),
            format!("About {}", title),
            "<p>Body</p>".to_string(),
            None,
            category_id,
            author_id,
        )
    }

    #[tokio::test]
    async fn test_create_and_get_with_meta() {
        let (_pool, repo) = setup_test_repo().await;

        let created = repo.create(&post("measles", "Measles", 10, 1)).await.unwrap();
        assert!(created.id > 0);

        let found = repo.get_by_slug("measles").await.unwrap().unwrap();
        assert_eq!(found.post.id, created.id);
        assert_eq!(found.category_slug, "vaccines");
        assert_eq!(found.author_username, "ana");

        assert!(repo.exists_by_slug("measles").await.unwrap());
        assert!(!repo.exists_by_slug("mumps").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_filters_and_pagination() {
        let (_pool, repo) = setup_test_repo().await;
        for i in 0..5 {
            repo.create(&post(&format!("v-{}", i), &format!("Vaccine {}", i), 10, 1))
                .await
                .unwrap();
        }
        repo.create(&post("colic", "Colic relief", 1, 2)).await.unwrap();

        let by_category = PostFilter {
            category_id: Some(10),
            ..PostFilter::default()
        };
        assert_eq!(repo.count(&by_category).await.unwrap(), 5);
        let page = repo.list(&by_category, &ListParams::new(2, 2)).await.unwrap();
        assert_eq!(page.len(), 2);

        let by_author = PostFilter {
            author_id: Some(2),
            ..PostFilter::default()
        };
        let posts = repo.list(&by_author, &ListParams::default()).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].post.slug, "colic");

        let search = PostFilter {
            search: Some("COLIC".to_string()),
            ..PostFilter::default()
        };
        assert_eq!(repo.count(&search).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_sorting() {
        let (_pool, repo) = setup_test_repo().await;

        let mut old = post("old", "Old", 10, 1);
        old.created_at = Utc::now() - Duration::days(30);
        let old = repo.create(&old).await.unwrap();
        let new = repo.create(&post("new", "New", 10, 1)).await.unwrap();
        for _ in 0..3 {
            repo.increment_visits(old.id).await.unwrap();
        }

        let newest = repo.list(&PostFilter::default(), &ListParams::default()).await.unwrap();
        assert_eq!(newest[0].post.id, new.id);

        let oldest = PostFilter {
            sort: PostSort::Oldest,
            ..PostFilter::default()
        };
        assert_eq!(repo.list(&oldest, &ListParams::default()).await.unwrap()[0].post.id, old.id);

        let popular = PostFilter {
            sort: PostSort::Popular,
            ..PostFilter::default()
        };
        let popular = repo.list(&popular, &ListParams::default()).await.unwrap();
        assert_eq!(popular[0].post.id, old.id);
        assert_eq!(popular[0].post.visit_count, 3);

        let recent = PostFilter {
            sort: PostSort::Trending,
            created_after: Some(Utc::now() - Duration::days(7)),
            ..PostFilter::default()
        };
        let trending = repo.list(&recent, &ListParams::default()).await.unwrap();
        assert_eq!(trending.len(), 1);
        assert_eq!(trending[0].post.id, new.id);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo.create(&post("draft", "Draft", 10, 1)).await.unwrap();

        let mut changed = created.clone();
        changed.title = "Final".to_string();
        changed.slug = "final".to_string();
        changed.category_id = 1;
        changed.img = Some("https://cdn.example.org/cover.png".to_string());
        let updated = repo.update(&changed).await.unwrap();
        assert_eq!(updated.post.title, "Final");
        assert_eq!(updated.category_slug, "general");
        assert_eq!(updated.post.img.as_deref(), Some("https://cdn.example.org/cover.png"));

        repo.delete(created.id).await.unwrap();
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_feature_respects_limit() {
        let (_pool, repo) = setup_test_repo().await;
        let mut ids = Vec::new();
        for i in 0..4 {
            ids.push(repo.create(&post(&format!("p{}", i), "P", 10, 1)).await.unwrap().id);
        }

        for id in &ids[..3] {
            assert!(repo.feature_if_room(*id, MAX_FEATURED_POSTS).await.unwrap());
        }
        assert!(!repo.feature_if_room(ids[3], MAX_FEATURED_POSTS).await.unwrap());
        assert_eq!(repo.count_featured().await.unwrap(), 3);

        // Featuring an already featured post is a no-op
        assert!(!repo.feature_if_room(ids[0], MAX_FEATURED_POSTS).await.unwrap());

        assert!(repo.unfeature(ids[0]).await.unwrap());
        assert!(!repo.unfeature(ids[0]).await.unwrap());
        assert!(repo.feature_if_room(ids[3], MAX_FEATURED_POSTS).await.unwrap());

        let featured = PostFilter {
            featured: Some(true),
            ..PostFilter::default()
        };
        let slugs: Vec<String> = repo
            .list(&featured, &ListParams::default())
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.post.slug)
            .collect();
        assert_eq!(slugs.len(), 3);
        assert!(!slugs.contains(&"p0".to_string()));
    }

    #[tokio::test]
    async fn test_concurrent_feature_requests_stay_within_limit() {
        let (_pool, repo) = setup_test_repo().await;
        let repo = Arc::new(repo);
        let mut ids = Vec::new();
        for i in 0..6 {
            ids.push(repo.create(&post(&format!("c{}", i), "C", 10, 1)).await.unwrap().id);
        }

        let results = futures::future::join_all(ids.iter().map(|id| {
            let repo = repo.clone();
            let id = *id;
            async move { repo.feature_if_room(id, MAX_FEATURED_POSTS).await.unwrap() }
        }))
        .await;

        assert_eq!(results.iter().filter(|ok| **ok).count(), 3);
        assert_eq!(repo.count_featured().await.unwrap(), 3);
    }
}
