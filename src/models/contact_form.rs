//! Contact form model
//!
//! Consultation requests submitted by parents from a post page.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Contact form entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactForm {
    pub id: i64,
    pub parent_name: String,
    pub parent_surname: String,
    pub child_name: String,
    pub child_gender: String,
    pub child_age: i32,
    pub child_birth_date: Option<String>,
    pub contact_phone: String,
    pub contact_email: String,
    pub consultation_reason: String,
    /// Post the form was submitted from
    pub post_id: Option<i64>,
    pub post_title: Option<String>,
    pub status: ContactStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Review state of a contact form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    #[default]
    Pending,
    Reviewed,
    Contacted,
}

impl ContactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::Pending => "pending",
            ContactStatus::Reviewed => "reviewed",
            ContactStatus::Contacted => "contacted",
        }
    }
}

impl fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContactStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ContactStatus::Pending),
            "reviewed" => Ok(ContactStatus::Reviewed),
            "contacted" => Ok(ContactStatus::Contacted),
            _ => Err(anyhow::anyhow!("Invalid contact status: {}", s)),
        }
    }
}

/// Input for submitting a contact form
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContactFormInput {
    pub parent_name: String,
    pub parent_surname: String,
    pub child_name: String,
    pub child_gender: String,
    pub child_age: i32,
    #[serde(default)]
    pub child_birth_date: Option<String>,
    pub contact_phone: String,
    pub contact_email: String,
    pub consultation_reason: String,
    #[serde(default)]
    pub post_id: Option<i64>,
    #[serde(default)]
    pub post_title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!(ContactStatus::from_str("Reviewed").unwrap(), ContactStatus::Reviewed);
        assert_eq!(ContactStatus::from_str("contacted").unwrap(), ContactStatus::Contacted);
        assert!(ContactStatus::from_str("all").is_err());
        assert_eq!(ContactStatus::default(), ContactStatus::Pending);
    }

    #[test]
    fn test_input_uses_camel_case() {
        let json = r#"{
            "parentName": "Ana", "parentSurname": "Ruiz", "childName": "Leo",
            "childGender": "male", "childAge": 4, "contactPhone": "600000000",
            "contactEmail": "ana@example.com", "consultationReason": "Cough",
            "postId": 3
        }"#;
        let input: CreateContactFormInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.parent_name, "Ana");
        assert_eq!(input.post_id, Some(3));
        assert!(input.child_birth_date.is_none());
    }
}
