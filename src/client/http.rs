//! HTTP wrapper with bearer auth and retry-with-backoff
//!
//! Requests go through a [`Transport`] so tests can script responses.
//! Network errors and 404/500/503 responses are retried with exponential
//! backoff. Timeouts are not retried. Once retries run out the error is
//! logged and returned. A 401 on a non-silent request first tries one
//! session refresh and resend when a refresh path is set. A 401 or 403 that
//! still comes back raises a notice unless the request is marked silent.

use async_trait::async_trait;
use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::client::backoff::RetryPolicy;
use crate::client::notify::{Notice, Notifier};
use crate::client::ClientError;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path and query, relative to the API base URL
    pub path: String,
    pub body: Option<Value>,
    /// Suppress auth notices for this request
    pub silent: bool,
    /// Overrides the transport's default timeout
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            silent: false,
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PATCH, path).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Raw response; the body is JSON when it parses, a JSON string otherwise
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request. Non-2xx statuses are returned as responses.
    async fn send(&self, request: &ApiRequest, token: Option<&str>) -> Result<ApiResponse, ClientError>;
}

/// Production transport backed by `reqwest`
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pediablog-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Network(format!("HTTP client error: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest, token: Option<&str>) -> Result<ApiResponse, ClientError> {
        let mut builder = self
            .client
            .request(request.method.clone(), self.url(&request.path))
            .timeout(request.timeout.unwrap_or(self.timeout));
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(map_reqwest_error)?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok(ApiResponse { status, body })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::Network(e.to_string())
    }
}

/// Shared bearer token; the latest stored value wins
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    inner: Arc<RwLock<Option<String>>>,
}

impl TokenStore {
    pub fn new(token: Option<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(token)),
        }
    }

    pub fn get(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, token: Option<String>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = token;
    }
}

pub struct HttpClient {
    transport: Arc<dyn Transport>,
    tokens: TokenStore,
    notifier: Arc<dyn Notifier>,
    policy: RetryPolicy,
    refresh_path: Option<String>,
}

impl HttpClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        tokens: TokenStore,
        notifier: Arc<dyn Notifier>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            tokens,
            notifier,
            policy,
            refresh_path: None,
        }
    }

    /// Refresh the session through `path` when a request comes back 401
    pub fn with_session_refresh(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = Some(path.into());
        self
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Send with the client's retry policy and return the JSON body
    pub async fn execute(&self, request: &ApiRequest) -> Result<Value, ClientError> {
        self.execute_with(request, &self.policy).await
    }

    /// Send with an explicit retry policy
    pub async fn execute_with(&self, request: &ApiRequest, policy: &RetryPolicy) -> Result<Value, ClientError> {
        let label = format!("{} {}", request.method, request.path);
        let result = policy
            .retry(&label, || self.send_once(request), ClientError::is_retryable)
            .await;

        let mut error = match result {
            Ok(body) => return Ok(body),
            Err(e) => e,
        };

        if error.status() == Some(401) && !request.silent {
            match self.refresh_and_resend(request).await {
                Some(Ok(body)) => return Ok(body),
                Some(Err(e)) => error = e,
                None => {}
            }
        }

        if error.is_retryable() {
            if policy.max_retries == 0 {
                tracing::debug!(request = %label, "Request failed: {}", error);
                return Err(error);
            }
            tracing::error!(
                request = %label,
                retries = policy.max_retries,
                "Request failed after retries: {}",
                error
            );
        } else if !request.silent {
            match error.status() {
                Some(401) => self.notifier.notify(Notice::SessionExpired),
                Some(403) => self.notifier.notify(Notice::Forbidden),
                _ => {}
            }
        }
        Err(error)
    }

    /// One refresh, then one resend with the new token.
    /// `None` when there is no refresh path or no session, or the refresh failed.
    async fn refresh_and_resend(&self, request: &ApiRequest) -> Option<Result<Value, ClientError>> {
        let path = self.refresh_path.as_deref()?;
        self.tokens.get()?;

        let refresh = ApiRequest::new(Method::POST, path).silent();
        let token = match self.send_once(&refresh).await {
            Ok(body) => body.get("token").and_then(Value::as_str).map(str::to_string),
            Err(e) => {
                tracing::debug!(request = %path, "Session refresh failed: {}", e);
                None
            }
        }?;

        tracing::debug!(request = %request.path, "Session refreshed, resending");
        self.tokens.set(Some(token));
        Some(self.send_once(request).await)
    }

    async fn send_once(&self, request: &ApiRequest) -> Result<Value, ClientError> {
        let token = self.tokens.get();
        let response = self.transport.send(request, token.as_deref()).await?;
        if response.is_success() {
            Ok(response.body)
        } else {
            Err(ClientError::from_response(response.status, &response.body))
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        decode(self.execute(&ApiRequest::get(path)).await?)
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ClientError> {
        decode(self.execute(&ApiRequest::post(path, encode(body)?)).await?)
    }

    pub async fn put_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ClientError> {
        decode(self.execute(&ApiRequest::put(path, encode(body)?)).await?)
    }

    pub async fn patch_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ClientError> {
        decode(self.execute(&ApiRequest::patch(path, encode(body)?)).await?)
    }

    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        self.execute(&ApiRequest::delete(path)).await.map(|_| ())
    }
}

pub(crate) fn encode<B: Serialize>(body: &B) -> Result<Value, ClientError> {
    serde_json::to_value(body).map_err(|e| ClientError::Decode(e.to_string()))
}

pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ClientError> {
    serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::{RecordingNotifier, ScriptedTransport};
    use serde_json::json;
    use tokio::time::Instant;

    fn client(transport: Arc<ScriptedTransport>, notifier: Arc<RecordingNotifier>) -> HttpClient {
        HttpClient::new(transport, TokenStore::new(Some("t0".into())), notifier, RetryPolicy::http())
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_retries_three_times_with_growing_delays() {
        let transport = ScriptedTransport::always(Err(ClientError::Network("reset".into())));
        let notifier = RecordingNotifier::new();
        let http = client(transport.clone(), notifier.clone());

        let result = http.execute(&ApiRequest::get("/posts")).await;

        assert_eq!(result, Err(ClientError::Network("reset".into())));
        let times = transport.call_times();
        assert_eq!(times.len(), 4);
        let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
        );
        assert!(notifier.notices().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_retryable_status() {
        let transport = ScriptedTransport::new(vec![
            Ok(ApiResponse::new(503, Value::Null)),
            Ok(ApiResponse::new(404, Value::Null)),
            Ok(ApiResponse::new(200, json!({"ok": true}))),
        ]);
        let http = client(transport.clone(), RecordingNotifier::new());

        let body = http.execute(&ApiRequest::get("/posts")).await.unwrap();
        assert_eq!(body, json!({"ok": true}));
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_and_client_errors_not_retried() {
        let transport = ScriptedTransport::always(Err(ClientError::Timeout));
        let http = client(transport.clone(), RecordingNotifier::new());
        let start = Instant::now();
        assert_eq!(http.execute(&ApiRequest::get("/posts")).await, Err(ClientError::Timeout));
        assert_eq!(transport.call_count(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);

        let transport = ScriptedTransport::always(Ok(ApiResponse::new(400, Value::Null)));
        let http = client(transport.clone(), RecordingNotifier::new());
        tokio_test::assert_err!(http.execute(&ApiRequest::get("/posts")).await);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_auth_notices_and_silent_requests() {
        let notifier = RecordingNotifier::new();

        let http = client(
            ScriptedTransport::always(Ok(ApiResponse::new(401, Value::Null))),
            notifier.clone(),
        );
        tokio_test::assert_err!(http.execute(&ApiRequest::get("/api/auth/me")).await);
        tokio_test::assert_err!(http.execute(&ApiRequest::get("/api/auth/me").silent()).await);

        let http = client(
            ScriptedTransport::always(Ok(ApiResponse::new(403, Value::Null))),
            notifier.clone(),
        );
        tokio_test::assert_err!(http.execute(&ApiRequest::get("/api/user-posts/all")).await);

        assert_eq!(notifier.notices(), vec![Notice::SessionExpired, Notice::Forbidden]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_refreshes_once_and_resends() {
        let transport = ScriptedTransport::handler(|request, _| {
            Ok(match request.path.as_str() {
                "/api/auth/refresh" => ApiResponse::new(200, json!({"token": "t1"})),
                _ => ApiResponse::new(401, Value::Null),
            })
        });
        let notifier = RecordingNotifier::new();
        let http = client(transport.clone(), notifier.clone()).with_session_refresh("/api/auth/refresh");
        let start = Instant::now();

        let result = http.execute(&ApiRequest::get("/api/auth/me")).await;

        assert_eq!(result.unwrap_err().status(), Some(401));
        let paths: Vec<String> = transport.requests().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["/api/auth/me", "/api/auth/refresh", "/api/auth/me"]);
        assert_eq!(
            transport.tokens(),
            vec![Some("t0".to_string()), Some("t0".to_string()), Some("t1".to_string())]
        );
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(notifier.notices(), vec![Notice::SessionExpired]);
    }

    #[tokio::test]
    async fn test_refreshed_session_succeeds_without_notice() {
        let transport = ScriptedTransport::handler(|request, n| {
            Ok(match (n, request.path.as_str()) {
                (0, _) => ApiResponse::new(401, Value::Null),
                (_, "/api/auth/refresh") => ApiResponse::new(200, json!({"token": "t1"})),
                _ => ApiResponse::new(200, json!({"ok": true})),
            })
        });
        let notifier = RecordingNotifier::new();
        let http = client(transport.clone(), notifier.clone()).with_session_refresh("/api/auth/refresh");

        let body = http.execute(&ApiRequest::get("/api/user-posts")).await.unwrap();

        assert_eq!(body, json!({"ok": true}));
        assert_eq!(http.tokens().get().as_deref(), Some("t1"));
        assert!(notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn test_no_refresh_without_session_or_for_silent_requests() {
        let transport = ScriptedTransport::always(Ok(ApiResponse::new(401, Value::Null)));
        let http = HttpClient::new(
            transport.clone(),
            TokenStore::new(None),
            RecordingNotifier::new(),
            RetryPolicy::http(),
        )
        .with_session_refresh("/api/auth/refresh");
        tokio_test::assert_err!(http.execute(&ApiRequest::get("/api/auth/me")).await);
        assert_eq!(transport.call_count(), 1);

        let transport = ScriptedTransport::always(Ok(ApiResponse::new(401, Value::Null)));
        let http = client(transport.clone(), RecordingNotifier::new()).with_session_refresh("/api/auth/refresh");
        tokio_test::assert_err!(http.execute(&ApiRequest::get("/api/auth/me").silent()).await);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_latest_token_is_sent() {
        let transport = ScriptedTransport::always(Ok(ApiResponse::new(200, Value::Null)));
        let http = client(transport.clone(), RecordingNotifier::new());

        http.execute(&ApiRequest::get("/a")).await.unwrap();
        http.tokens().set(Some("t1".into()));
        http.execute(&ApiRequest::get("/b")).await.unwrap();

        assert_eq!(
            transport.tokens(),
            vec![Some("t0".to_string()), Some("t1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_decode_error() {
        let transport = ScriptedTransport::always(Ok(ApiResponse::new(200, json!("not a list"))));
        let http = client(transport, RecordingNotifier::new());
        let result: Result<Vec<i64>, _> = http.get_json("/x").await;
        assert!(matches!(result, Err(ClientError::Decode(_))));
    }

    #[test]
    fn test_reqwest_url_join() {
        let transport = ReqwestTransport::new("http://localhost:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(transport.url("/posts?limit=1"), "http://localhost:8080/posts?limit=1");
        assert_eq!(transport.url("posts"), "http://localhost:8080/posts");
    }
}
