//! Typed endpoint calls
//!
//! Reads go through the [`QueryCache`] and are retried there under the query
//! policy. Mutations are retried under the mutation policy and invalidate
//! the query keys that depend on them.

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::auth::AuthResponse;
use crate::api::responses::{
    ContactFormListResponse, ContactFormResponse, PostCard, PostListResponse, UserPostsResponse, UserResponse,
};
use crate::client::backoff::RetryPolicy;
use crate::client::connectivity::TokenRefresher;
use crate::client::http::{decode, encode, ApiRequest, HttpClient};
use crate::client::notify::Notice;
use crate::client::query_cache::{QueryCache, QueryKey};
use crate::client::{ClientError, REFRESH_PATH};
use crate::models::{
    Category, ContactStatus, CreateCategoryInput, CreateContactFormInput, CreatePostInput, UpdatePostInput,
    MAX_FEATURED_POSTS,
};
use crate::services::contact_form::{validate_input, ContactFormServiceError};
use crate::services::{LoginInput, RegisterInput};

const RELATED_POSTS: u32 = 2;

/// Query keys shared between reads and invalidations
pub mod keys {
    pub const POSTS: &str = "posts";
    pub const POST: &str = "post";
    pub const RELATED_POSTS: &str = "relatedPosts";
    pub const FEATURED_POSTS: &str = "featuredPosts";
    pub const CATEGORIES: &str = "categories";
    pub const USER_POSTS: &str = "userPosts";
    pub const ALL_USER_POSTS: &str = "allUserPosts";
    pub const CONTACT_FORMS: &str = "contactForms";
    pub const CURRENT_USER: &str = "currentUser";
}

/// Parameters for `GET /posts`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// Category slug
    pub cat: Option<String>,
    pub filter: Option<String>,
    pub search: Option<String>,
    pub featured: Option<bool>,
}

impl PostQuery {
    pub fn page(page: u32) -> Self {
        Self {
            page: Some(page),
            ..Self::default()
        }
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn category(mut self, slug: impl Into<String>) -> Self {
        self.cat = Some(slug.into());
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn featured(mut self, featured: bool) -> Self {
        self.featured = Some(featured);
        self
    }

    fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(cat) = &self.cat {
            pairs.push(("cat", cat.clone()));
        }
        if let Some(filter) = &self.filter {
            pairs.push(("filter", filter.clone()));
        }
        if let Some(search) = &self.search {
            pairs.push(("search", search.clone()));
        }
        if let Some(featured) = self.featured {
            pairs.push(("isFeatured", featured.to_string()));
        }
        pairs
    }

    /// `?page=1&cat=...`, or empty when no parameter is set
    pub fn to_query_string(&self) -> String {
        let encoded: Vec<String> = self
            .pairs()
            .into_iter()
            .map(|(name, value)| format!("{}={}", name, urlencoding::encode(&value)))
            .collect();
        if encoded.is_empty() {
            String::new()
        } else {
            format!("?{}", encoded.join("&"))
        }
    }

    fn key(&self, root: &str) -> QueryKey {
        self.pairs()
            .into_iter()
            .fold(QueryKey::new([root]), |key, (name, value)| {
                key.with(format!("{}={}", name, value))
            })
    }
}

pub struct BlogApi {
    http: Arc<HttpClient>,
    queries: Arc<QueryCache>,
    mutation_policy: RetryPolicy,
}

impl BlogApi {
    pub fn new(http: Arc<HttpClient>, queries: Arc<QueryCache>, mutation_policy: RetryPolicy) -> Self {
        Self {
            http,
            queries,
            mutation_policy,
        }
    }

    pub fn http(&self) -> &Arc<HttpClient> {
        &self.http
    }

    pub fn queries(&self) -> &Arc<QueryCache> {
        &self.queries
    }

    async fn read<T: DeserializeOwned>(&self, key: QueryKey, path: String) -> Result<T, ClientError> {
        let request = ApiRequest::get(path);
        let no_retry = RetryPolicy::none();
        self.queries
            .fetch_as(&key, || self.http.execute_with(&request, &no_retry))
            .await
    }

    async fn mutate(&self, request: ApiRequest, invalidates: &[&str]) -> Result<Value, ClientError> {
        self.mutate_with(request, &self.mutation_policy, invalidates).await
    }

    async fn mutate_with(
        &self,
        request: ApiRequest,
        policy: &RetryPolicy,
        invalidates: &[&str],
    ) -> Result<Value, ClientError> {
        let body = self.http.execute_with(&request, policy).await?;
        for root in invalidates {
            self.queries.invalidate(&QueryKey::new([*root])).await;
        }
        Ok(body)
    }

    async fn mutate_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: String,
        body: &B,
        invalidates: &[&str],
    ) -> Result<T, ClientError> {
        let request = ApiRequest::new(method, path).with_body(encode(body)?);
        decode(self.mutate(request, invalidates).await?)
    }

    // Posts

    pub async fn posts(&self, query: &PostQuery) -> Result<PostListResponse, ClientError> {
        self.read(query.key(keys::POSTS), format!("/posts{}", query.to_query_string()))
            .await
    }

    pub async fn post(&self, slug: &str) -> Result<PostCard, ClientError> {
        self.read(
            QueryKey::new([keys::POST, slug]),
            format!("/posts/{}", urlencoding::encode(slug)),
        )
        .await
    }

    /// Up to two other posts from the same category
    pub async fn related_posts(&self, post: &PostCard) -> Result<Vec<PostCard>, ClientError> {
        let query = PostQuery::page(1).limit(RELATED_POSTS).category(post.category.clone());
        let key = QueryKey::new([keys::RELATED_POSTS, post.category.as_str()]).with(format!("exclude={}", post.id));
        let list: PostListResponse = self
            .read(key, format!("/posts{}", query.to_query_string()))
            .await?;

        Ok(list
            .posts
            .into_iter()
            .filter(|related| related.id != post.id)
            .take(RELATED_POSTS as usize)
            .collect())
    }

    pub async fn featured_posts(&self) -> Result<Vec<PostCard>, ClientError> {
        let query = PostQuery::default().featured(true).limit(MAX_FEATURED_POSTS as u32);
        let list: PostListResponse = self
            .read(
                QueryKey::new([keys::FEATURED_POSTS]),
                format!("/posts{}", query.to_query_string()),
            )
            .await?;
        Ok(list.posts)
    }

    pub async fn create_post(&self, input: &CreatePostInput) -> Result<PostCard, ClientError> {
        self.mutate_json(
            Method::POST,
            "/posts".to_string(),
            input,
            &[keys::POSTS, keys::USER_POSTS],
        )
        .await
    }

    /// Toggle a post's featured flag
    ///
    /// Sent once without retry: the toggle is not idempotent, so resending
    /// after a lost response could flip the flag back.
    ///
    /// A full carousel is reported as [`ClientError::FeaturedLimit`] and
    /// raises the matching notice.
    pub async fn toggle_featured(&self, post_id: i64) -> Result<PostCard, ClientError> {
        let request = ApiRequest::patch("/posts/feature", json!({ "postId": post_id }));
        let result = self
            .mutate_with(
                request,
                &RetryPolicy::none(),
                &[
                    keys::USER_POSTS,
                    keys::ALL_USER_POSTS,
                    keys::FEATURED_POSTS,
                    keys::POSTS,
                ],
            )
            .await
            .and_then(decode);

        match result {
            Err(e) if is_featured_limit(&e) => {
                tracing::warn!(post_id, "Featured post limit reached");
                self.http.notifier().notify(Notice::FeaturedLimitReached);
                Err(ClientError::FeaturedLimit(MAX_FEATURED_POSTS))
            }
            other => other,
        }
    }

    // Own posts

    pub async fn user_posts(&self, page: u32) -> Result<UserPostsResponse, ClientError> {
        self.read(
            QueryKey::new([keys::USER_POSTS]).with(format!("page={}", page)),
            format!("/api/user-posts?page={}", page),
        )
        .await
    }

    pub async fn user_post(&self, id: i64) -> Result<PostCard, ClientError> {
        self.read(
            QueryKey::new([keys::USER_POSTS]).with(format!("id={}", id)),
            format!("/api/user-posts/{}", id),
        )
        .await
    }

    pub async fn update_post(&self, id: i64, input: &UpdatePostInput) -> Result<PostCard, ClientError> {
        self.mutate_json(
            Method::PUT,
            format!("/api/user-posts/{}", id),
            input,
            &[keys::POSTS, keys::USER_POSTS, keys::POST],
        )
        .await
    }

    pub async fn delete_post(&self, id: i64) -> Result<(), ClientError> {
        self.mutate(
            ApiRequest::delete(format!("/api/user-posts/{}", id)),
            &[keys::POSTS, keys::USER_POSTS, keys::POST],
        )
        .await
        .map(|_| ())
    }

    // Admin post management

    pub async fn all_user_posts(&self, page: u32) -> Result<UserPostsResponse, ClientError> {
        self.read(
            QueryKey::new([keys::ALL_USER_POSTS]).with(format!("page={}", page)),
            format!("/api/user-posts/all?page={}", page),
        )
        .await
    }

    pub async fn admin_post(&self, id: i64) -> Result<PostCard, ClientError> {
        self.read(
            QueryKey::new([keys::ALL_USER_POSTS]).with(format!("id={}", id)),
            format!("/api/user-posts/admin/{}", id),
        )
        .await
    }

    pub async fn admin_update_post(&self, id: i64, input: &UpdatePostInput) -> Result<PostCard, ClientError> {
        self.mutate_json(
            Method::PUT,
            format!("/api/user-posts/admin/{}", id),
            input,
            &[keys::POSTS, keys::USER_POSTS, keys::ALL_USER_POSTS, keys::POST],
        )
        .await
    }

    // Categories

    pub async fn categories(&self) -> Result<Vec<Category>, ClientError> {
        self.read(QueryKey::new([keys::CATEGORIES]), "/api/categories".to_string())
            .await
    }

    pub async fn create_category(&self, input: &CreateCategoryInput) -> Result<Category, ClientError> {
        self.mutate_json(
            Method::POST,
            "/api/categories".to_string(),
            input,
            &[keys::CATEGORIES],
        )
        .await
    }

    pub async fn delete_category(&self, id: i64) -> Result<(), ClientError> {
        self.mutate(
            ApiRequest::delete(format!("/api/categories/{}", id)),
            &[keys::CATEGORIES],
        )
        .await
        .map(|_| ())
    }

    // Contact forms

    /// Validate locally, then submit
    pub async fn submit_contact_form(&self, input: &CreateContactFormInput) -> Result<ContactFormResponse, ClientError> {
        validate_input(input).map_err(|e| match e {
            ContactFormServiceError::ValidationError(message) => ClientError::Validation(message),
            other => ClientError::Validation(other.to_string()),
        })?;

        self.mutate_json(
            Method::POST,
            "/api/contact-forms".to_string(),
            input,
            &[keys::CONTACT_FORMS],
        )
        .await
    }

    /// `status: None` lists every status
    pub async fn contact_forms(
        &self,
        page: u32,
        status: Option<ContactStatus>,
    ) -> Result<ContactFormListResponse, ClientError> {
        let status = status.map_or("all", |s| s.as_str());
        self.read(
            QueryKey::new([keys::CONTACT_FORMS])
                .with(format!("status={}", status))
                .with(format!("page={}", page)),
            format!("/api/contact-forms?page={}&status={}", page, status),
        )
        .await
    }

    pub async fn delete_contact_form(&self, id: i64) -> Result<(), ClientError> {
        self.mutate(
            ApiRequest::delete(format!("/api/contact-forms/{}", id)),
            &[keys::CONTACT_FORMS],
        )
        .await
        .map(|_| ())
    }

    pub async fn update_contact_status(&self, id: i64, status: ContactStatus) -> Result<ContactFormResponse, ClientError> {
        self.mutate_json(
            Method::PATCH,
            format!("/api/contact-forms/{}/status", id),
            &json!({ "status": status.as_str() }),
            &[keys::CONTACT_FORMS],
        )
        .await
    }

    // Auth

    /// Create an account and keep its session token
    pub async fn register(&self, input: &RegisterInput) -> Result<AuthResponse, ClientError> {
        let auth: AuthResponse = self
            .mutate_json(Method::POST, "/api/auth/register".to_string(), input, &[])
            .await?;
        self.http.tokens().set(Some(auth.token.clone()));
        self.queries.invalidate_all();
        Ok(auth)
    }

    pub async fn login(&self, input: &LoginInput) -> Result<AuthResponse, ClientError> {
        let request = ApiRequest::post("/api/auth/login", encode(input)?).silent();
        let auth: AuthResponse = decode(self.http.execute_with(&request, &self.mutation_policy).await?)?;
        self.http.tokens().set(Some(auth.token.clone()));
        self.queries.invalidate_all();
        Ok(auth)
    }

    /// Close the session; the local token is dropped even if the call fails
    pub async fn logout(&self) -> Result<(), ClientError> {
        let request = ApiRequest::new(Method::POST, "/api/auth/logout").silent();
        let result = self.http.execute(&request).await;
        self.http.tokens().set(None);
        self.queries.invalidate_all();
        result.map(|_| ())
    }

    pub async fn me(&self) -> Result<UserResponse, ClientError> {
        self.read(QueryKey::new([keys::CURRENT_USER]), "/api/auth/me".to_string())
            .await
    }
}

fn is_featured_limit(error: &ClientError) -> bool {
    error.status() == Some(400) && matches!(error.code(), Some("FEATURED_LIMIT") | None)
}

/// Refreshes the session through `POST /api/auth/refresh`
pub struct HttpTokenRefresher {
    http: Arc<HttpClient>,
}

impl HttpTokenRefresher {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self) -> Result<String, ClientError> {
        let request = ApiRequest::new(Method::POST, REFRESH_PATH).silent();
        let auth: AuthResponse = decode(self.http.execute(&request).await?)?;
        Ok(auth.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{create_post, TestApp};
    use crate::client::focus::ErrorCooldown;
    use crate::client::http::{ApiResponse, ReqwestTransport, TokenStore};
    use crate::client::test_support::{RecordingNotifier, ScriptedTransport};
    use std::time::Duration;

    fn queries() -> Arc<QueryCache> {
        Arc::new(QueryCache::new(
            Duration::from_secs(300),
            Duration::from_secs(7200),
            RetryPolicy::query(),
            ErrorCooldown::new(Duration::from_secs(30)),
        ))
    }

    fn scripted_api(transport: Arc<ScriptedTransport>, notifier: Arc<RecordingNotifier>) -> BlogApi {
        let http = HttpClient::new(transport, TokenStore::new(Some("tok".into())), notifier, RetryPolicy::http());
        BlogApi::new(Arc::new(http), queries(), RetryPolicy::mutation())
    }

    fn card(id: i64, category: &str) -> Value {
        json!({
            "id": id,
            "slug": format!("post-{}", id),
            "title": format!("Post {}", id),
            "desc": "",
            "content": "",
            "img": null,
            "category": category,
            "categoryName": category,
            "user": {"id": 1, "username": "ana"},
            "isFeatured": false,
            "visit": 0,
            "createdAt": "2024-01-01T00:00:00+00:00",
            "updatedAt": "2024-01-01T00:00:00+00:00"
        })
    }

    fn listing(posts: Vec<Value>) -> Value {
        let total = posts.len();
        json!({"posts": posts, "hasMore": false, "total": total, "page": 1})
    }

    #[test]
    fn test_post_query_string_is_encoded() {
        let query = PostQuery::page(2).limit(5).category("salud infantil").search("fiebre & tos");
        assert_eq!(
            query.to_query_string(),
            "?page=2&limit=5&cat=salud%20infantil&search=fiebre%20%26%20tos"
        );
        assert_eq!(PostQuery::default().to_query_string(), "");
        assert_eq!(
            PostQuery::default().featured(true).limit(3).to_query_string(),
            "?limit=3&isFeatured=true"
        );
    }

    #[tokio::test]
    async fn test_reads_are_cached_until_a_mutation_invalidates_them() {
        let transport = ScriptedTransport::handler(|request, _| {
            let body = if request.method == Method::POST {
                card(9, "general")
            } else {
                listing(vec![card(1, "general")])
            };
            Ok(ApiResponse::new(200, body))
        });
        let api = scripted_api(transport.clone(), RecordingNotifier::new());

        let first = api.posts(&PostQuery::page(1)).await.unwrap();
        api.posts(&PostQuery::page(1)).await.unwrap();
        assert_eq!(first.posts.len(), 1);
        assert_eq!(transport.call_count(), 1);

        api.create_post(&CreatePostInput {
            title: "New".into(),
            description: "d".into(),
            content: "c".into(),
            category: "general".into(),
            img: None,
        })
        .await
        .unwrap();
        api.posts(&PostQuery::page(1)).await.unwrap();

        let paths: Vec<String> = transport.requests().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["/posts?page=1", "/posts", "/posts?page=1"]);
    }

    #[tokio::test]
    async fn test_related_posts_exclude_current_post() {
        let transport = ScriptedTransport::always(Ok(ApiResponse::new(
            200,
            listing(vec![card(1, "vacunas"), card(2, "vacunas")]),
        )));
        let api = scripted_api(transport.clone(), RecordingNotifier::new());
        let current: PostCard = serde_json::from_value(card(1, "vacunas")).unwrap();

        let related = api.related_posts(&current).await.unwrap();

        assert_eq!(related.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2]);
        assert_eq!(transport.requests()[0].path, "/posts?page=1&limit=2&cat=vacunas");
    }

    #[tokio::test]
    async fn test_featured_posts_request() {
        let transport = ScriptedTransport::always(Ok(ApiResponse::new(200, listing(vec![]))));
        let api = scripted_api(transport.clone(), RecordingNotifier::new());
        assert!(api.featured_posts().await.unwrap().is_empty());
        assert_eq!(transport.requests()[0].path, "/posts?limit=3&isFeatured=true");
    }

    #[tokio::test]
    async fn test_contact_form_validated_before_sending() {
        let transport = ScriptedTransport::always(Ok(ApiResponse::new(201, Value::Null)));
        let api = scripted_api(transport.clone(), RecordingNotifier::new());
        let input = CreateContactFormInput {
            parent_name: "Ana".into(),
            parent_surname: "Ruiz".into(),
            child_name: "Leo".into(),
            child_gender: "male".into(),
            child_age: 4,
            contact_phone: "600 000 000".into(),
            contact_email: "not-an-email".into(),
            consultation_reason: "Cough".into(),
            ..Default::default()
        };

        let result = api.submit_contact_form(&input).await;

        assert!(matches!(result, Err(ClientError::Validation(_))));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_featured_is_not_resent_after_server_error() {
        let transport = ScriptedTransport::new(vec![
            Ok(ApiResponse::new(500, Value::Null)),
            Ok(ApiResponse::new(200, card(1, "general"))),
        ]);
        let notifier = RecordingNotifier::new();
        let api = scripted_api(transport.clone(), notifier.clone());

        let result = api.toggle_featured(1).await;

        assert_eq!(result.unwrap_err().status(), Some(500));
        assert_eq!(transport.call_count(), 1);
        assert!(notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn test_logout_drops_token_even_on_failure() {
        let transport = ScriptedTransport::always(Ok(ApiResponse::new(401, Value::Null)));
        let notifier = RecordingNotifier::new();
        let api = scripted_api(transport, notifier.clone());

        tokio_test::assert_err!(api.logout().await);
        assert_eq!(api.http().tokens().get(), None);
        assert!(notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn test_refresher_reads_token() {
        let transport = ScriptedTransport::always(Ok(ApiResponse::new(
            200,
            json!({
                "user": {"id": 1, "username": "ana", "email": "a@x.org", "role": "admin", "createdAt": "2024-01-01T00:00:00+00:00"},
                "token": "rotated"
            }),
        )));
        let http = HttpClient::new(
            transport.clone(),
            TokenStore::new(Some("old".into())),
            RecordingNotifier::new(),
            RetryPolicy::http(),
        );
        let refresher = HttpTokenRefresher::new(Arc::new(http));

        assert_eq!(refresher.refresh().await.unwrap(), "rotated");
        assert_eq!(transport.requests()[0].path, "/api/auth/refresh");
        assert_eq!(transport.tokens(), vec![Some("old".to_string())]);
    }

    #[tokio::test]
    async fn test_fourth_featured_post_reports_limit_end_to_end() {
        let app = TestApp::new().await;
        let token = app.register("admin", "admin@example.com").await;
        let mut ids = Vec::new();
        for title in ["Fever", "Sleep", "Teething", "Allergies"] {
            ids.push(create_post(&app, &token, title).await);
        }

        let base_url = app.serve_http().await;
        let transport = Arc::new(ReqwestTransport::new(base_url, Duration::from_secs(5)).unwrap());
        let notifier = RecordingNotifier::new();
        let http = HttpClient::new(transport, TokenStore::new(Some(token)), notifier.clone(), RetryPolicy::http());
        let api = BlogApi::new(Arc::new(http), queries(), RetryPolicy::mutation());

        for id in &ids[..3] {
            assert!(api.toggle_featured(*id).await.unwrap().is_featured);
        }
        assert_eq!(api.featured_posts().await.unwrap().len(), 3);

        let result = api.toggle_featured(ids[3]).await;

        assert_eq!(result.unwrap_err(), ClientError::FeaturedLimit(3));
        assert_eq!(notifier.notices(), vec![Notice::FeaturedLimitReached]);

        // Unfeaturing frees a slot
        assert!(!api.toggle_featured(ids[0]).await.unwrap().is_featured);
        assert!(api.toggle_featured(ids[3]).await.unwrap().is_featured);
    }
}
