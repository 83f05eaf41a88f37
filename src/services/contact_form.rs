//! Contact form service
//!
//! Intake of consultation requests and their review workflow.

use crate::db::repositories::{ContactFormRepository, PostRepository};
use crate::models::{ContactForm, ContactStatus, CreateContactFormInput, ListParams, PagedResult};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

pub(crate) static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\S+@\S+\.\S+$").expect("email pattern is valid"));

pub(crate) static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?(\d[\s-]?){6,14}\d$").expect("phone pattern is valid"));

pub const MAX_CHILD_AGE: i32 = 18;

#[derive(Debug, thiserror::Error)]
pub enum ContactFormServiceError {
    #[error("Contact form not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct ContactFormService {
    repo: Arc<dyn ContactFormRepository>,
    post_repo: Arc<dyn PostRepository>,
}

impl ContactFormService {
    pub fn new(repo: Arc<dyn ContactFormRepository>, post_repo: Arc<dyn PostRepository>) -> Self {
        Self { repo, post_repo }
    }

    /// Validate and store a new request with status `pending`
    pub async fn submit(&self, input: CreateContactFormInput) -> Result<ContactForm, ContactFormServiceError> {
        validate_input(&input)?;

        let post_title = match input.post_id {
            Some(post_id) => {
                let post = self.post_repo.get_by_id(post_id).await?.ok_or_else(|| {
                    ContactFormServiceError::ValidationError(format!("Post {} does not exist", post_id))
                })?;
                input.post_title.clone().or(Some(post.post.title))
            }
            None => None,
        };

        let now = Utc::now();
        let form = ContactForm {
            id: 0,
            parent_name: input.parent_name.trim().to_string(),
            parent_surname: input.parent_surname.trim().to_string(),
            child_name: input.child_name.trim().to_string(),
            child_gender: input.child_gender.trim().to_string(),
            child_age: input.child_age,
            child_birth_date: input.child_birth_date.filter(|d| !d.trim().is_empty()),
            contact_phone: input.contact_phone.trim().to_string(),
            contact_email: input.contact_email.trim().to_string(),
            consultation_reason: input.consultation_reason.trim().to_string(),
            post_id: input.post_id,
            post_title,
            status: ContactStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        let created = self.repo.create(&form).await?;
        tracing::info!(form_id = created.id, post_id = ?created.post_id, "Received contact form");
        Ok(created)
    }

    pub async fn list(
        &self,
        status: Option<ContactStatus>,
        params: &ListParams,
    ) -> Result<PagedResult<ContactForm>, ContactFormServiceError> {
        let items = self.repo.list(status, params).await?;
        let total = self.repo.count(status).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn update_status(
        &self,
        id: i64,
        status: ContactStatus,
    ) -> Result<ContactForm, ContactFormServiceError> {
        if !self.repo.update_status(id, status).await? {
            return Err(ContactFormServiceError::NotFound(id));
        }
        self.repo
            .get_by_id(id)
            .await?
            .ok_or(ContactFormServiceError::NotFound(id))
    }

    pub async fn delete(&self, id: i64) -> Result<(), ContactFormServiceError> {
        if !self.repo.delete(id).await? {
            return Err(ContactFormServiceError::NotFound(id));
        }
        Ok(())
    }
}

/// Field checks shared with the client-side form
pub fn validate_input(input: &CreateContactFormInput) -> Result<(), ContactFormServiceError> {
    let required = [
        ("parentName", &input.parent_name),
        ("parentSurname", &input.parent_surname),
        ("childName", &input.child_name),
        ("childGender", &input.child_gender),
        ("contactPhone", &input.contact_phone),
        ("contactEmail", &input.contact_email),
        ("consultationReason", &input.consultation_reason),
    ];
    let missing: Vec<&str> = required
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        return Err(ContactFormServiceError::ValidationError(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    if !EMAIL_RE.is_match(input.contact_email.trim()) {
        return Err(ContactFormServiceError::ValidationError(
            "Invalid email address".to_string(),
        ));
    }
    if !PHONE_RE.is_match(input.contact_phone.trim()) {
        return Err(ContactFormServiceError::ValidationError(
            "Invalid phone number".to_string(),
        ));
    }
    if !(0..=MAX_CHILD_AGE).contains(&input.child_age) {
        return Err(ContactFormServiceError::ValidationError(format!(
            "Child age must be between 0 and {}",
            MAX_CHILD_AGE
        )));
    }
    Ok(())
}
