//! Post API endpoints
//!
//! - GET /posts - Public listing with category, filter, search and featured
//! - GET /posts/{slug} - Single post (counts a visit)
//! - POST /posts - Create a post (authenticated)
//! - PATCH /posts/feature - Toggle the featured flag (admin)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{PostCard, PostListResponse};
use crate::models::CreatePostInput;
use crate::services::PostListQuery;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRequest {
    pub post_id: i64,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts))
        .route("/posts/{slug}", get(get_post))
}

pub fn protected_router() -> Router<AppState> {
    Router::new().route("/posts", post(create_post))
}

pub fn admin_router() -> Router<AppState> {
    Router::new().route("/posts/feature", patch(toggle_featured))
}

/// GET /posts
async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostListQuery>,
) -> Result<Json<PostListResponse>, ApiError> {
    let page = state.post_service.list(&query).await?;
    Ok(Json(page.into()))
}

/// GET /posts/{slug}
async fn get_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<PostCard>, ApiError> {
    let post = state.post_service.get_by_slug(&slug).await?;
    Ok(Json(post.into()))
}

/// POST /posts
async fn create_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(input): Json<CreatePostInput>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state.post_service.create(&user.0, input).await?;
    Ok((StatusCode::CREATED, Json(PostCard::from(post))))
}

/// PATCH /posts/feature
async fn toggle_featured(
    State(state): State<AppState>,
    Json(body): Json<FeatureRequest>,
) -> Result<Json<PostCard>, ApiError> {
    let post = state.post_service.toggle_featured(body.post_id).await?;
    Ok(Json(post.into()))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{create_post, TestApp};
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_create_and_fetch_by_slug() {
        let app = TestApp::new().await;
        let token = app.register("chief", "chief@clinic.org").await;

        let response = app
            .server
            .post("/posts")
            .authorization_bearer(&token)
            .json(&json!({
                "title": "Fever in infants",
                "desc": "When to call",
                "content": "<p>Body</p>",
                "category": "general"
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let created: Value = response.json();
        assert_eq!(created["slug"], "fever-in-infants");
        assert_eq!(created["desc"], "When to call");
        assert_eq!(created["user"]["username"], "chief");

        let fetched: Value = app.server.get("/posts/fever-in-infants").await.json();
        assert_eq!(fetched["title"], "Fever in infants");
        assert_eq!(fetched["visit"], 1);
    }

    #[tokio::test]
    async fn test_post_titled_like_admin_route_stays_readable() {
        let app = TestApp::new().await;
        let token = app.register("chief", "chief@clinic.org").await;
        create_post(&app, &token, "Feature").await;

        let posts: Value = app.server.get("/posts").await.json();
        let slug = posts["posts"][0]["slug"].as_str().unwrap().to_string();
        assert_eq!(slug, "feature-2");

        let response = app.server.get(&format!("/posts/{}", slug)).await;
        response.assert_status_ok();
        let fetched: Value = response.json();
        assert_eq!(fetched["title"], "Feature");
    }

    #[tokio::test]
    async fn test_create_requires_auth() {
        let app = TestApp::new().await;
        let response = app
            .server
            .post("/posts")
            .json(&json!({"title": "x", "content": "y", "category": "general"}))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_category_is_validation_error() {
        let app = TestApp::new().await;
        let token = app.register("chief", "chief@clinic.org").await;
        let response = app
            .server
            .post("/posts")
            .authorization_bearer(&token)
            .json(&json!({"title": "x", "content": "y", "category": "nope"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_list_pagination_and_filter() {
        let app = TestApp::new().await;
        let token = app.register("chief", "chief@clinic.org").await;
        for title in ["One", "Two", "Three"] {
            create_post(&app, &token, title).await;
        }

        let body: Value = app.server.get("/posts").add_query_param("limit", 2).await.json();
        assert_eq!(body["total"], 3);
        assert_eq!(body["hasMore"], true);
        assert_eq!(body["posts"].as_array().unwrap().len(), 2);

        let body: Value = app
            .server
            .get("/posts")
            .add_query_param("filter", "oldest")
            .await
            .json();
        assert_eq!(body["posts"][0]["title"], "One");

        let response = app.server.get("/posts").add_query_param("filter", "random").await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let body: Value = app.server.get("/posts").add_query_param("cat", "missing").await.json();
        assert_eq!(body["total"], 0);
    }

    #[tokio::test]
    async fn test_fourth_featured_post_rejected() {
        let app = TestApp::new().await;
        let admin = app.register("chief", "chief@clinic.org").await;

        let mut ids = Vec::new();
        for title in ["A", "B", "C", "D"] {
            ids.push(create_post(&app, &admin, title).await);
        }
        for id in &ids[..3] {
            app.server
                .patch("/posts/feature")
                .authorization_bearer(&admin)
                .json(&json!({ "postId": id }))
                .await
                .assert_status_ok();
        }

        let response = app
            .server
            .patch("/posts/feature")
            .authorization_bearer(&admin)
            .json(&json!({ "postId": ids[3] }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"]["code"], "FEATURED_LIMIT");

        let featured: Value = app
            .server
            .get("/posts")
            .add_query_param("isFeatured", true)
            .await
            .json();
        assert_eq!(featured["total"], 3);

        // Unfeaturing frees a slot
        app.server
            .patch("/posts/feature")
            .authorization_bearer(&admin)
            .json(&json!({ "postId": ids[0] }))
            .await
            .assert_status_ok();
        app.server
            .patch("/posts/feature")
            .authorization_bearer(&admin)
            .json(&json!({ "postId": ids[3] }))
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn test_feature_requires_admin() {
        let app = TestApp::new().await;
        let admin = app.register("chief", "chief@clinic.org").await;
        let author = app.register("ana", "ana@clinic.org").await;
        let id = create_post(&app, &admin, "A").await;

        let response = app
            .server
            .patch("/posts/feature")
            .authorization_bearer(&author)
            .json(&json!({ "postId": id }))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
    }
}
