//! Category API endpoints
//!
//! - GET /api/categories - List all categories
//! - POST /api/categories - Create a category (admin)
//! - DELETE /api/categories/{id} - Delete an unused category (admin)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState};
use crate::models::{Category, CreateCategoryInput};

pub fn public_router() -> Router<AppState> {
    Router::new().route("/api/categories", get(list_categories))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/api/categories", post(create_category))
        .route("/api/categories/{id}", delete(delete_category))
}

async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(state.category_service.list().await?))
}

async fn create_category(
    State(state): State<AppState>,
    Json(input): Json<CreateCategoryInput>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state.category_service.create(input).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.category_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
