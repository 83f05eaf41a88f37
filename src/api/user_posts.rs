//! Dashboard endpoints for managing posts
//!
//! Authors see and edit their own posts; admins can reach every post
//! through the `/all` and `/admin/{id}` routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::api::common::PageQuery;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{PostCard, UserPostsResponse};
use crate::models::UpdatePostInput;

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/api/user-posts", get(list_own_posts))
        .route(
            "/api/user-posts/{id}",
            get(get_own_post).put(update_own_post).delete(delete_own_post),
        )
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/api/user-posts/all", get(list_all_posts))
        .route("/api/user-posts/admin/{id}", get(admin_get_post).put(admin_update_post))
}

/// GET /api/user-posts
async fn list_own_posts(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<UserPostsResponse>, ApiError> {
    let page = state
        .post_service
        .list_by_author(user.0.id, &query.params())
        .await?;
    Ok(Json(page.into()))
}

async fn get_own_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<PostCard>, ApiError> {
    let post = state.post_service.get_for_edit(&user.0, id).await?;
    Ok(Json(post.into()))
}

async fn update_own_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdatePostInput>,
) -> Result<Json<PostCard>, ApiError> {
    let post = state.post_service.update(&user.0, id, input).await?;
    Ok(Json(post.into()))
}

async fn delete_own_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.post_service.delete(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/user-posts/all
async fn list_all_posts(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<UserPostsResponse>, ApiError> {
    let page = state.post_service.list_all(&query.params()).await?;
    Ok(Json(page.into()))
}

async fn admin_get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PostCard>, ApiError> {
    let post = state.post_service.get_by_id(id).await?;
    Ok(Json(post.into()))
}

async fn admin_update_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdatePostInput>,
) -> Result<Json<PostCard>, ApiError> {
    let post = state.post_service.update(&user.0, id, input).await?;
    Ok(Json(post.into()))
}
