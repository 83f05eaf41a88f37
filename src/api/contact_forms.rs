//! Contact form API endpoints
//!
//! - POST /api/contact-forms - Submit a consultation request (public)
//! - GET /api/contact-forms - Paged review list (admin)
//! - DELETE /api/contact-forms/{id} - Remove a request (admin)
//! - PATCH /api/contact-forms/{id}/status - Move through the review workflow (admin)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use std::str::FromStr;

use crate::api::common::{default_limit, default_page};
use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::{ContactFormListResponse, ContactFormResponse};
use crate::models::{ContactStatus, CreateContactFormInput, ListParams};

#[derive(Debug, Deserialize)]
pub struct ContactFormListQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// `pending`, `reviewed`, `contacted`, or `all`
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/api/contact-forms", post(submit_form))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/api/contact-forms", get(list_forms))
        .route("/api/contact-forms/{id}", delete(delete_form))
        .route("/api/contact-forms/{id}/status", patch(update_status))
}

/// `all` and an empty value mean no filter
fn parse_status_filter(raw: Option<&str>) -> Result<Option<ContactStatus>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") | Some("all") => Ok(None),
        Some(value) => ContactStatus::from_str(value)
            .map(Some)
            .map_err(|_| ApiError::validation_error(format!("Invalid status: {}", value))),
    }
}

async fn submit_form(
    State(state): State<AppState>,
    Json(input): Json<CreateContactFormInput>,
) -> Result<impl IntoResponse, ApiError> {
    let form = state.contact_form_service.submit(input).await?;
    Ok((StatusCode::CREATED, Json(ContactFormResponse::from(form))))
}

async fn list_forms(
    State(state): State<AppState>,
    Query(query): Query<ContactFormListQuery>,
) -> Result<Json<ContactFormListResponse>, ApiError> {
    let status = parse_status_filter(query.status.as_deref())?;
    let params = ListParams::new(query.page, query.limit);
    let page = state.contact_form_service.list(status, &params).await?;
    Ok(Json(page.into()))
}

async fn delete_form(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.contact_form_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<StatusUpdateRequest>,
) -> Result<Json<ContactFormResponse>, ApiError> {
    let status = ContactStatus::from_str(body.status.trim())
        .map_err(|_| ApiError::validation_error(format!("Invalid status: {}", body.status)))?;
    let form = state.contact_form_service.update_status(id, status).await?;
    Ok(Json(form.into()))
}
