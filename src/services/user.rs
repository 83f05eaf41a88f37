//! User service
//!
//! Registration, login and session lifecycle:
//! - the first registered user becomes admin, later ones are authors
//! - a session id is the bearer token; it expires after `session_days`
//! - refreshing swaps the session for a new one

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{Session, User, UserRole};
use crate::services::password::{hash_password, verify_password, MIN_PASSWORD_LEN};
use anyhow::Context;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_SESSION_DAYS: i64 = 7;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("Session expired")]
    SessionExpired,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_days: i64,
}

impl UserService {
    pub fn new(user_repo: Arc<dyn UserRepository>, session_repo: Arc<dyn SessionRepository>) -> Self {
        Self::with_session_days(user_repo, session_repo, DEFAULT_SESSION_DAYS)
    }

    pub fn with_session_days(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_days,
        }
    }

    /// Register a new account
    ///
    /// # Errors
    ///
    /// - `ValidationError` for an empty username, an email without `@`,
    ///   or a password shorter than six characters
    /// - `UserExists` if the username or email is taken
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        validate_register_input(&input)?;

        let username = input.username.trim().to_string();
        let email = input.email.trim().to_string();

        if self
            .user_repo
            .get_by_username(&username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Username '{}' is already taken",
                username
            )));
        }

        if self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                email
            )));
        }

        let role = if self.is_first_user().await? {
            UserRole::Admin
        } else {
            UserRole::Author
        };

        let password_hash = hash_password(&input.password)?;
        let user = User::new(username, email, password_hash, role);
        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;

        tracing::info!(user_id = created.id, role = %created.role, "Registered user");
        Ok(created)
    }

    /// Check credentials and open a new session
    pub async fn login(&self, input: LoginInput) -> Result<Session, UserServiceError> {
        let invalid = || UserServiceError::AuthenticationError("Invalid username or password".to_string());

        let user = self
            .find_user_by_username_or_email(&input.username_or_email)
            .await?
            .ok_or_else(invalid)?;

        if !verify_password(&input.password, &user.password_hash)? {
            tracing::debug!(user_id = user.id, "Rejected login with wrong password");
            return Err(invalid());
        }

        self.create_session(user.id).await
    }

    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a token to its user.
    ///
    /// Returns `None` for unknown tokens. Expired sessions are deleted and
    /// also yield `None`.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            self.session_repo
                .delete(token)
                .await
                .context("Failed to delete expired session")?;
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;
        Ok(user)
    }

    /// Exchange a live session for a fresh one; the old token stops working
    pub async fn refresh_session(&self, token: &str) -> Result<Session, UserServiceError> {
        let session = self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
            .ok_or(UserServiceError::SessionNotFound)?;

        if session.is_expired() {
            self.session_repo
                .delete(token)
                .await
                .context("Failed to delete expired session")?;
            return Err(UserServiceError::SessionExpired);
        }

        let fresh = self.create_session(session.user_id).await?;
        self.session_repo
            .delete(token)
            .await
            .context("Failed to delete replaced session")?;

        tracing::debug!(user_id = session.user_id, "Refreshed session");
        Ok(fresh)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?;
        Ok(user)
    }

    pub async fn is_first_user(&self) -> Result<bool, UserServiceError> {
        let count = self.user_repo.count().await.context("Failed to count users")?;
        Ok(count == 0)
    }

    /// Delete all expired sessions, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<i64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;
        Ok(count)
    }

    async fn find_user_by_username_or_email(
        &self,
        username_or_email: &str,
    ) -> Result<Option<User>, UserServiceError> {
        let needle = username_or_email.trim();
        if let Some(user) = self
            .user_repo
            .get_by_username(needle)
            .await
            .context("Failed to get user by username")?
        {
            return Ok(Some(user));
        }

        let user = self
            .user_repo
            .get_by_email(needle)
            .await
            .context("Failed to get user by email")?;
        Ok(user)
    }

    async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let session = Session::new(user_id, Duration::days(self.session_days));
        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;
        Ok(created)
    }
}

fn validate_register_input(input: &RegisterInput) -> Result<(), UserServiceError> {
    if input.username.trim().is_empty() {
        return Err(UserServiceError::ValidationError(
            "Username cannot be empty".to_string(),
        ));
    }
    if !input.email.contains('@') {
        return Err(UserServiceError::ValidationError(
            "Invalid email format".to_string(),
        ));
    }
    if input.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(UserServiceError::ValidationError(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Input for user registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterInput {
    pub fn new(username: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Input for user login
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginInput {
    #[serde(alias = "username", alias = "email")]
    pub username_or_email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username_or_email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username_or_email: username_or_email.into(),
            password: password.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};

    async fn setup_test_service() -> (DynDatabasePool, UserService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        (pool, UserService::new(user_repo, session_repo))
    }

    async fn register(service: &UserService, name: &str) -> User {
        service
            .register(RegisterInput::new(name, format!("{}@hospital.org", name), "secret1"))
            .await
            .expect("Failed to register")
    }

    #[tokio::test]
    async fn test_first_user_is_admin_then_authors() {
        let (_pool, service) = setup_test_service().await;

        let first = register(&service, "chief").await;
        assert_eq!(first.role, UserRole::Admin);

        let second = register(&service, "resident").await;
        assert_eq!(second.role, UserRole::Author);
    }

    #[tokio::test]
    async fn test_register_duplicates_rejected() {
        let (_pool, service) = setup_test_service().await;
        register(&service, "dup").await;

        let same_name = service
            .register(RegisterInput::new("dup", "other@hospital.org", "secret1"))
            .await;
        assert!(matches!(same_name, Err(UserServiceError::UserExists(_))));

        let same_email = service
            .register(RegisterInput::new("other", "dup@hospital.org", "secret1"))
            .await;
        assert!(matches!(same_email, Err(UserServiceError::UserExists(_))));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (_pool, service) = setup_test_service().await;

        let cases = [
            RegisterInput::new("  ", "a@b.org", "secret1"),
            RegisterInput::new("name", "no-at-sign", "secret1"),
            RegisterInput::new("name", "a@b.org", "short"),
        ];
        for input in cases {
            let result = service.register(input).await;
            assert!(matches!(result, Err(UserServiceError::ValidationError(_))));
        }
    }

    #[tokio::test]
    async fn test_login_by_username_or_email() {
        let (_pool, service) = setup_test_service().await;
        let user = register(&service, "nurse").await;

        let by_name = service.login(LoginInput::new("nurse", "secret1")).await.unwrap();
        assert_eq!(by_name.user_id, user.id);

        let by_email = service
            .login(LoginInput::new("nurse@hospital.org", "secret1"))
            .await
            .unwrap();
        assert_eq!(by_email.user_id, user.id);
        assert_ne!(by_name.id, by_email.id);
    }

    #[tokio::test]
    async fn test_login_failures() {
        let (_pool, service) = setup_test_service().await;
        register(&service, "nurse").await;

        let wrong = service.login(LoginInput::new("nurse", "wrong!!")).await;
        assert!(matches!(wrong, Err(UserServiceError::AuthenticationError(_))));

        let missing = service.login(LoginInput::new("ghost", "secret1")).await;
        assert!(matches!(missing, Err(UserServiceError::AuthenticationError(_))));
    }

    #[tokio::test]
    async fn test_validate_and_logout() {
        let (_pool, service) = setup_test_service().await;
        let user = register(&service, "nurse").await;
        let session = service.login(LoginInput::new("nurse", "secret1")).await.unwrap();

        let found = service.validate_session(&session.id).await.unwrap().unwrap();
        assert_eq!(found.id, user.id);

        service.logout(&session.id).await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
        assert!(service.validate_session("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_deleted() {
        let (pool, service) = setup_test_service().await;
        let user = register(&service, "nurse").await;

        let repo = SqlxSessionRepository::new(pool);
        let stale = Session::new(user.id, Duration::hours(-1));
        repo.create(&stale).await.unwrap();

        assert!(service.validate_session(&stale.id).await.unwrap().is_none());
        assert!(repo.get_by_id(&stale.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_replaces_session() {
        let (_pool, service) = setup_test_service().await;
        let user = register(&service, "nurse").await;
        let old = service.login(LoginInput::new("nurse", "secret1")).await.unwrap();

        let fresh = service.refresh_session(&old.id).await.unwrap();
        assert_ne!(fresh.id, old.id);
        assert_eq!(fresh.user_id, user.id);

        assert!(service.validate_session(&old.id).await.unwrap().is_none());
        assert!(service.validate_session(&fresh.id).await.unwrap().is_some());

        let again = service.refresh_session(&old.id).await;
        assert!(matches!(again, Err(UserServiceError::SessionNotFound)));
    }

    #[tokio::test]
    async fn test_refresh_expired_session() {
        let (pool, service) = setup_test_service().await;
        let user = register(&service, "nurse").await;
        let stale = Session::new(user.id, Duration::minutes(-5));
        SqlxSessionRepository::new(pool).create(&stale).await.unwrap();

        let result = service.refresh_session(&stale.id).await;
        assert!(matches!(result, Err(UserServiceError::SessionExpired)));
    }

    #[tokio::test]
    async fn test_cleanup_expired_sessions() {
        let (pool, service) = setup_test_service().await;
        let user = register(&service, "nurse").await;
        let repo = SqlxSessionRepository::new(pool);
        repo.create(&Session::new(user.id, Duration::days(-2))).await.unwrap();
        service.login(LoginInput::new("nurse", "secret1")).await.unwrap();

        assert_eq!(service.cleanup_expired_sessions().await.unwrap(), 1);
        assert_eq!(service.cleanup_expired_sessions().await.unwrap(), 0);
    }

    #[test]
    fn test_login_input_accepts_aliases() {
        let input: LoginInput =
            serde_json::from_str(r#"{"username":"nurse","password":"p"}"#).unwrap();
        assert_eq!(input.username_or_email, "nurse");
        let input: LoginInput =
            serde_json::from_str(r#"{"usernameOrEmail":"n@h.org","password":"p"}"#).unwrap();
        assert_eq!(input.username_or_email, "n@h.org");
    }
}
