//! Client synchronization layer
//!
//! Keeps a headless client's view of the blog in sync with the server:
//!
//! - [`http`]: bearer-token requests with retry and backoff
//! - [`query_cache`]: stale-while-revalidate cache of read results
//! - [`focus`]: refocus refetches held back after recent errors
//! - [`connectivity`]: probe, token refresh and cache invalidation on reconnect
//! - [`api`]: typed calls for every endpoint
//!
//! Page and network events that a browser would raise are fed in as
//! [`SyncEvent`]s.

pub mod api;
pub mod backoff;
pub mod connectivity;
pub mod error;
pub mod focus;
pub mod http;
pub mod notify;
pub mod query_cache;

use std::sync::Arc;

pub use api::{BlogApi, HttpTokenRefresher, PostQuery};
pub use backoff::RetryPolicy;
pub use connectivity::{ConnectionState, ConnectivityWatcher, HttpProbe, SyncEvent};
pub use error::ClientError;
pub use focus::{ErrorCooldown, FocusManager};
pub use http::{ApiRequest, ApiResponse, HttpClient, ReqwestTransport, TokenStore, Transport};
pub use notify::{Notice, Notifier, TracingNotifier};
pub use query_cache::{QueryCache, QueryKey};

use crate::config::ClientConfig;

pub(crate) const REFRESH_PATH: &str = "/api/auth/refresh";

/// Every client component wired together from configuration
pub struct SyncClient {
    pub api: Arc<BlogApi>,
    pub watcher: Arc<ConnectivityWatcher>,
}

impl SyncClient {
    pub fn from_config(
        config: &ClientConfig,
        token: Option<String>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ClientError> {
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(
            config.api_base_url.clone(),
            config.request_timeout(),
        )?);
        Ok(Self::with_transport(config, transport, token, notifier))
    }

    pub fn with_transport(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        token: Option<String>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let tokens = TokenStore::new(token);
        let http = Arc::new(
            HttpClient::new(
                transport.clone(),
                tokens.clone(),
                notifier.clone(),
                RetryPolicy::http_from(config),
            )
            .with_session_refresh(REFRESH_PATH),
        );

        let cooldown = ErrorCooldown::new(config.error_cooldown());
        let queries = Arc::new(QueryCache::from_config(config, cooldown.clone()));
        let focus = Arc::new(FocusManager::new(queries.clone(), cooldown, config.focus_delay()));

        let probe = Arc::new(HttpProbe::new(
            transport,
            tokens.clone(),
            &config.probe_path,
            config.probe_timeout(),
        ));
        let watcher = ConnectivityWatcher::new(probe, tokens, queries.clone(), focus, notifier, config)
            .with_refresher(Arc::new(HttpTokenRefresher::new(http.clone())));

        let api = Arc::new(BlogApi::new(http, queries, RetryPolicy::mutation_from(config)));
        Self {
            api,
            watcher: Arc::new(watcher),
        }
    }
}
