//! Query cache
//!
//! Keeps the last JSON result of each query. A result is fresh for
//! `stale_time` after it was fetched; after that, or once invalidated, the
//! next `fetch` goes back to the network. Entries are evicted `cache_time`
//! after their last write.
//!
//! A failed refetch keeps serving the previous result and marks the shared
//! error cooldown.

use async_trait::async_trait;
use moka::future::Cache;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::client::backoff::RetryPolicy;
use crate::client::focus::{ErrorCooldown, FocusHandler};
use crate::client::http::decode;
use crate::client::ClientError;
use crate::config::ClientConfig;

const SEGMENT_SEPARATOR: char = '\u{1f}';

/// Hierarchical query key such as `["posts", "cat=vaccines", "page=1"]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Append a segment
    pub fn with(mut self, segment: impl Into<String>) -> Self {
        self.0.push(segment.into());
        self
    }

    fn id(&self) -> String {
        let mut id = String::new();
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                id.push(SEGMENT_SEPARATOR);
            }
            id.push_str(segment);
        }
        id
    }

    fn is_prefix_of(&self, id: &str) -> bool {
        let prefix = self.id();
        id == prefix
            || (id.starts_with(&prefix) && id[prefix.len()..].starts_with(SEGMENT_SEPARATOR))
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

#[derive(Debug, Clone)]
struct CachedQuery {
    data: Arc<Value>,
    fetched_at: Instant,
    epoch: u64,
    /// Shared by every clone of the entry, so invalidating never rewrites it
    invalidated: Arc<AtomicBool>,
}

pub struct QueryCache {
    entries: Cache<String, CachedQuery>,
    stale_time: Duration,
    policy: RetryPolicy,
    cooldown: ErrorCooldown,
    epoch: AtomicU64,
}

impl QueryCache {
    pub fn new(stale_time: Duration, cache_time: Duration, policy: RetryPolicy, cooldown: ErrorCooldown) -> Self {
        let entries = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(cache_time)
            .build();
        Self {
            entries,
            stale_time,
            policy,
            cooldown,
            epoch: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &ClientConfig, cooldown: ErrorCooldown) -> Self {
        Self::new(
            config.stale_time(),
            config.cache_time(),
            RetryPolicy::query_from(config),
            cooldown,
        )
    }

    pub fn cooldown(&self) -> &ErrorCooldown {
        &self.cooldown
    }

    fn is_entry_stale(&self, entry: &CachedQuery) -> bool {
        entry.invalidated.load(Ordering::SeqCst)
            || entry.epoch < self.epoch.load(Ordering::SeqCst)
            || entry.fetched_at.elapsed() >= self.stale_time
    }

    /// Return cached data while fresh, otherwise run `fetcher`
    ///
    /// The fetcher is retried under the query policy, except for client
    /// errors. On failure the previous data, if any, is returned instead.
    pub async fn fetch<F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<Value, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Value, ClientError>>,
    {
        let id = key.id();
        let previous = self.entries.get(&id).await;
        if let Some(entry) = &previous {
            if !self.is_entry_stale(entry) {
                tracing::trace!(key = %key, "Query cache hit");
                return Ok(entry.data.as_ref().clone());
            }
        }

        // Captured before fetching so an invalidation that lands mid-flight
        // leaves the new entry stale
        let epoch = self.epoch.load(Ordering::SeqCst);
        let label = key.to_string();
        let result = self
            .policy
            .retry(&label, fetcher, |e| !e.is_client_error())
            .await;

        match result {
            Ok(data) => {
                let entry = CachedQuery {
                    data: Arc::new(data.clone()),
                    fetched_at: Instant::now(),
                    epoch,
                    invalidated: Arc::new(AtomicBool::new(false)),
                };
                self.entries.insert(id, entry).await;
                Ok(data)
            }
            Err(e) => {
                self.cooldown.mark_error();
                match previous {
                    Some(entry) => {
                        tracing::warn!(key = %key, "Refetch failed, keeping previous data: {}", e);
                        Ok(entry.data.as_ref().clone())
                    }
                    None => {
                        tracing::warn!(key = %key, "Query failed: {}", e);
                        Err(e)
                    }
                }
            }
        }
    }

    /// Typed wrapper around [`fetch`](Self::fetch)
    pub async fn fetch_as<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Value, ClientError>>,
    {
        decode(self.fetch(key, fetcher).await?)
    }

    /// Cached data regardless of freshness
    pub async fn peek(&self, key: &QueryKey) -> Option<Value> {
        self.entries
            .get(&key.id())
            .await
            .map(|entry| entry.data.as_ref().clone())
    }

    pub async fn is_stale(&self, key: &QueryKey) -> bool {
        match self.entries.get(&key.id()).await {
            Some(entry) => self.is_entry_stale(&entry),
            None => true,
        }
    }

    /// Mark every entry under `prefix` stale
    ///
    /// Entries are flagged in place; their data and expiry are untouched.
    pub async fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut count = 0;
        for (id, entry) in self.entries.iter() {
            if prefix.is_prefix_of(&id) {
                entry.invalidated.store(true, Ordering::SeqCst);
                count += 1;
            }
        }
        tracing::debug!(prefix = %prefix, count, "Invalidated queries");
        count
    }

    /// Mark every entry stale, including fetches already in flight
    pub fn invalidate_all(&self) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(epoch, "Invalidated all queries");
    }

    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }
}

#[async_trait]
impl FocusHandler for QueryCache {
    async fn on_focus_change(&self, focused: bool) {
        if focused {
            self.invalidate_all();
        }
    }
}
