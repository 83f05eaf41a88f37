//! Contact form repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{ContactForm, ContactStatus, ListParams};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const FORM_COLUMNS: &str = r#"
    id, parent_name, parent_surname, child_name, child_gender, child_age, child_birth_date,
    contact_phone, contact_email, consultation_reason, post_id, post_title, status,
    created_at, updated_at
"#;

const INSERT_FORM: &str = r#"
    INSERT INTO contact_forms (parent_name, parent_surname, child_name, child_gender, child_age,
        child_birth_date, contact_phone, contact_email, consultation_reason, post_id, post_title,
        status, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

#[async_trait]
pub trait ContactFormRepository: Send + Sync {
    async fn create(&self, form: &ContactForm) -> Result<ContactForm>;
    async fn get_by_id(&self, id: i64) -> Result<Option<ContactForm>>;
    /// Newest first, optionally restricted to one status
    async fn list(&self, status: Option<ContactStatus>, params: &ListParams) -> Result<Vec<ContactForm>>;
    async fn count(&self, status: Option<ContactStatus>) -> Result<i64>;
    /// Returns false when no form has the given id
    async fn update_status(&self, id: i64, status: ContactStatus) -> Result<bool>;
    /// Returns false when no form has the given id
    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxContactFormRepository {
    pool: DynDatabasePool,
}

impl SqlxContactFormRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ContactFormRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ContactFormRepository for SqlxContactFormRepository {
    async fn create(&self, form: &ContactForm) -> Result<ContactForm> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_sqlite(self.pool.as_sqlite().unwrap(), form).await,
            DatabaseDriver::Mysql => create_mysql(self.pool.as_mysql().unwrap(), form).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<ContactForm>> {
        let sql = format!("SELECT {} FROM contact_forms WHERE id = ?", FORM_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to get contact form")?;
                row.as_ref().map(row_to_form_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to get contact form")?;
                row.as_ref().map(row_to_form_mysql).transpose()
            }
        }
    }

    async fn list(&self, status: Option<ContactStatus>, params: &ListParams) -> Result<Vec<ContactForm>> {
        let sql = format!(
            "SELECT {} FROM contact_forms WHERE (? IS NULL OR status = ?) \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            FORM_COLUMNS
        );
        let status = status.map(|s| s.as_str());
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .bind(status)
                    .bind(status)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to list contact forms")?;
                rows.iter().map(row_to_form_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .bind(status)
                    .bind(status)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to list contact forms")?;
                rows.iter().map(row_to_form_mysql).collect()
            }
        }
    }

    async fn count(&self, status: Option<ContactStatus>) -> Result<i64> {
        let sql = "SELECT COUNT(*) as count FROM contact_forms WHERE (? IS NULL OR status = ?)";
        let status = status.map(|s| s.as_str());
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(status)
                .bind(status)
                .fetch_one(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to count contact forms")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(status)
                .bind(status)
                .fetch_one(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to count contact forms")?
                .get("count"),
        };
        Ok(count)
    }

    async fn update_status(&self, id: i64, status: ContactStatus) -> Result<bool> {
        let sql = "UPDATE contact_forms SET status = ?, updated_at = ? WHERE id = ?";
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(status.as_str())
                .bind(now)
                .bind(id)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to update contact form status")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(status.as_str())
                .bind(now)
                .bind(id)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to update contact form status")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM contact_forms WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to delete contact form")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to delete contact form")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }
}

// SQLite implementations

async fn create_sqlite(pool: &SqlitePool, form: &ContactForm) -> Result<ContactForm> {
    let result = sqlx::query(INSERT_FORM)
        .bind(&form.parent_name)
        .bind(&form.parent_surname)
        .bind(&form.child_name)
        .bind(&form.child_gender)
        .bind(form.child_age)
        .bind(&form.child_birth_date)
        .bind(&form.contact_phone)
        .bind(&form.contact_email)
        .bind(&form.consultation_reason)
        .bind(form.post_id)
        .bind(&form.post_title)
        .bind(form.status.as_str())
        .bind(form.created_at)
        .bind(form.updated_at)
        .execute(pool)
        .await
        .context("Failed to create contact form")?;

    Ok(ContactForm {
        id: result.last_insert_rowid(),
        ..form.clone()
    })
}

fn row_to_form_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<ContactForm> {
    let status: String = row.get("status");
    Ok(ContactForm {
        id: row.get("id"),
        parent_name: row.get("parent_name"),
        parent_surname: row.get("parent_surname"),
        child_name: row.get("child_name"),
        child_gender: row.get("child_gender"),
        child_age: row.get("child_age"),
        child_birth_date: row.get("child_birth_date"),
        contact_phone: row.get("contact_phone"),
        contact_email: row.get("contact_email"),
        consultation_reason: row.get("consultation_reason"),
        post_id: row.get("post_id"),
        post_title: row.get("post_title"),
        status: ContactStatus::from_str(&status)
            .with_context(|| format!("Invalid contact status in database: {}", status))?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// MySQL implementations

async fn create_mysql(pool: &MySqlPool, form: &ContactForm) -> Result<ContactForm> {
    let result = sqlx::query(INSERT_FORM)
        .bind(&form.parent_name)
        .bind(&form.parent_surname)
        .bind(&form.child_name)
        .bind(&form.child_gender)
        .bind(form.child_age)
        .bind(&form.child_birth_date)
        .bind(&form.contact_phone)
        .bind(&form.contact_email)
        .bind(&form.consultation_reason)
        .bind(form.post_id)
        .bind(&form.post_title)
        .bind(form.status.as_str())
        .bind(form.created_at)
        .bind(form.updated_at)
        .execute(pool)
        .await
        .context("Failed to create contact form")?;

    Ok(ContactForm {
        id: result.last_insert_id() as i64,
        ..form.clone()
    })
}

fn row_to_form_mysql(row: &sqlx::mysql::MySqlRow) -> Result<ContactForm> {
    let status: String = row.get("status");
    Ok(ContactForm {
        id: row.get("id"),
        parent_name: row.get("parent_name"),
        parent_surname: row.get("parent_surname"),
        child_name: row.get("child_name"),
        child_gender: row.get("child_gender"),
        child_age: row.get("child_age"),
        child_birth_date: row.get("child_birth_date"),
        contact_phone: row.get("contact_phone"),
        contact_email: row.get("contact_email"),
        consultation_reason: row.get("consultation_reason"),
        post_id: row.get("post_id"),
        post_title: row.get("post_title"),
        status: ContactStatus::from_str(&status)
            .with_context(|| format!("Invalid contact status in database: {}", status))?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxContactFormRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxContactFormRepository::new(pool)
    }

    fn form(child: &str) -> ContactForm {
        let now = Utc::now();
        ContactForm {
            id: 0,
            parent_name: "Ana".into(),
            parent_surname: "Ruiz".into(),
            child_name: child.into(),
            child_gender: "female".into(),
            child_age: 3,
            child_birth_date: Some("2021-04-02".into()),
            contact_phone: "+34 600 111 222".into(),
            contact_email: "ana@example.com".into(),
            consultation_reason: "Recurring fever".into(),
            post_id: None,
            post_title: None,
            status: ContactStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = setup_test_repo().await;
        let created = repo.create(&form("Lucia")).await.unwrap();

        let found = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found.child_name, "Lucia");
        assert_eq!(found.status, ContactStatus::Pending);
        assert_eq!(found.child_birth_date.as_deref(), Some("2021-04-02"));
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let repo = setup_test_repo().await;
        let a = repo.create(&form("A")).await.unwrap();
        repo.create(&form("B")).await.unwrap();
        repo.create(&form("C")).await.unwrap();

        assert!(repo.update_status(a.id, ContactStatus::Contacted).await.unwrap());

        assert_eq!(repo.count(None).await.unwrap(), 3);
        assert_eq!(repo.count(Some(ContactStatus::Pending)).await.unwrap(), 2);

        let contacted = repo
            .list(Some(ContactStatus::Contacted), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(contacted.len(), 1);
        assert_eq!(contacted[0].child_name, "A");

        let first_page = repo.list(None, &ListParams::new(1, 2)).await.unwrap();
        assert_eq!(first_page.len(), 2);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing() {
        let repo = setup_test_repo().await;
        assert!(!repo.update_status(99, ContactStatus::Reviewed).await.unwrap());
        assert!(!repo.delete(99).await.unwrap());

        let created = repo.create(&form("D")).await.unwrap();
        assert!(repo.delete(created.id).await.unwrap());
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }
}
