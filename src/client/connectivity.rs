//! Connectivity watcher
//!
//! Tracks whether the backend is reachable and, when the page comes back
//! (visible again, network online, or a probe succeeding after failures),
//! runs the recovery sequence:
//!
//! 1. probe the backend
//! 2. refresh the session token, if a refresher is configured
//! 3. invalidate every cached query
//!
//! Only one recovery runs at a time. Page and network events arrive as
//! [`SyncEvent`]s on a channel consumed by [`ConnectivityWatcher::run`],
//! which also drives the periodic probe.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::client::focus::FocusManager;
use crate::client::http::{ApiRequest, TokenStore, Transport};
use crate::client::notify::{Notice, Notifier};
use crate::client::query_cache::QueryCache;
use crate::client::ClientError;
use crate::config::ClientConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    /// Page visibility changed; `true` means visible
    Visibility(bool),
    Online,
    Offline,
    /// Window focus changed
    Focus(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    Recovered,
    /// Another recovery was already running
    Skipped,
}

/// Reachability check
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self) -> Result<(), ClientError>;
}

/// `GET {path}` straight through the transport, without the retry wrapper
pub struct HttpProbe {
    transport: Arc<dyn Transport>,
    tokens: TokenStore,
    request: ApiRequest,
}

impl HttpProbe {
    pub fn new(transport: Arc<dyn Transport>, tokens: TokenStore, path: &str, timeout: Duration) -> Self {
        Self {
            transport,
            tokens,
            request: ApiRequest::get(path).silent().with_timeout(timeout),
        }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self) -> Result<(), ClientError> {
        let token = self.tokens.get();
        let response = self.transport.send(&self.request, token.as_deref()).await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(ClientError::from_response(response.status, &response.body))
        }
    }
}

/// Obtains a fresh session token
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self) -> Result<String, ClientError>;
}

#[derive(Debug, Clone, Copy)]
struct Timing {
    probe_interval: Duration,
    reconnect_retry: Duration,
    online_settle: Duration,
}

#[derive(Debug, Clone, Copy)]
enum Delayed {
    /// Network came back; wait for it to settle
    Settle,
    /// Previous probe failed
    Retry,
}

#[derive(Debug)]
struct PageState {
    connection: ConnectionState,
    online: bool,
    visible: bool,
}

/// Resets the reconnecting flag however the recovery ends
struct ReconnectGuard<'a>(&'a AtomicBool);

impl Drop for ReconnectGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ConnectivityWatcher {
    probe: Arc<dyn Probe>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    tokens: TokenStore,
    queries: Arc<QueryCache>,
    focus: Arc<FocusManager>,
    notifier: Arc<dyn Notifier>,
    timing: Timing,
    page: Mutex<PageState>,
    reconnecting: AtomicBool,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectivityWatcher {
    pub fn new(
        probe: Arc<dyn Probe>,
        tokens: TokenStore,
        queries: Arc<QueryCache>,
        focus: Arc<FocusManager>,
        notifier: Arc<dyn Notifier>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            probe,
            refresher: None,
            tokens,
            queries,
            focus,
            notifier,
            timing: Timing {
                probe_interval: config.probe_interval(),
                reconnect_retry: config.reconnect_retry(),
                online_settle: config.online_settle(),
            },
            page: Mutex::new(PageState {
                connection: ConnectionState::Connected,
                online: true,
                visible: true,
            }),
            reconnecting: AtomicBool::new(false),
            pending: Mutex::new(None),
        }
    }

    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    fn page(&self) -> std::sync::MutexGuard<'_, PageState> {
        self.page.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ConnectionState {
        self.page().connection
    }

    pub fn is_online(&self) -> bool {
        self.page().online
    }

    pub fn is_visible(&self) -> bool {
        self.page().visible
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting.load(Ordering::SeqCst)
    }

    /// Returns the previous state
    fn set_state(&self, next: ConnectionState) -> ConnectionState {
        let previous = std::mem::replace(&mut self.page().connection, next);
        if previous != next {
            tracing::info!(from = ?previous, to = ?next, "Connection state changed");
        }
        previous
    }

    /// Run the recovery sequence unless one is already running
    pub async fn reconnect(&self) -> Result<ReconnectOutcome, ClientError> {
        if self.reconnecting.swap(true, Ordering::SeqCst) {
            tracing::debug!("Recovery already running, skipping");
            return Ok(ReconnectOutcome::Skipped);
        }
        let _guard = ReconnectGuard(&self.reconnecting);

        if let Err(e) = self.probe.probe().await {
            tracing::warn!("Backend unreachable: {}", e);
            self.set_state(ConnectionState::Degraded);
            return Err(e);
        }

        // Anonymous clients have no session to refresh
        let refresher = self.refresher.as_ref().filter(|_| self.tokens.get().is_some());
        if let Some(refresher) = refresher {
            match refresher.refresh().await {
                Ok(token) => {
                    self.tokens.set(Some(token));
                    tracing::debug!("Session token refreshed");
                }
                Err(e) => tracing::warn!("Token refresh failed: {}", e),
            }
        }

        self.queries.invalidate_all();
        self.set_state(ConnectionState::Connected);
        tracing::info!("Recovered; cached queries will refetch");
        Ok(ReconnectOutcome::Recovered)
    }

    /// Replace any pending delayed recovery
    fn schedule(self: &Arc<Self>, delay: Duration, kind: Delayed) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tracing::debug!(?kind, "Running delayed recovery");
            match kind {
                Delayed::Settle => {
                    let _ = this.reconnect().await;
                }
                Delayed::Retry => this.recover_visible().await,
            }
        });

        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn cancel_pending(&self) {
        if let Some(handle) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }

    /// Visibility-triggered recovery; a failed probe retries later
    async fn recover_visible(self: &Arc<Self>) {
        if !self.is_online() {
            tracing::debug!("Offline, waiting for the network before reconnecting");
            return;
        }
        if !self.is_visible() {
            return;
        }
        if self.reconnect().await.is_err() {
            self.schedule(self.timing.reconnect_retry, Delayed::Retry);
        }
    }

    pub async fn handle_event(self: &Arc<Self>, event: SyncEvent) {
        tracing::debug!(?event, "Sync event");
        match event {
            SyncEvent::Visibility(visible) => {
                self.page().visible = visible;
                if visible {
                    self.recover_visible().await;
                }
            }
            SyncEvent::Online => {
                self.page().online = true;
                self.notifier.notify(Notice::ConnectionRestored);
                self.schedule(self.timing.online_settle, Delayed::Settle);
            }
            SyncEvent::Offline => {
                self.page().online = false;
                tracing::info!("Network offline");
            }
            SyncEvent::Focus(focused) => {
                self.focus.set_focused(focused).await;
            }
        }
    }

    /// Periodic reachability check; only while online, visible and idle
    pub async fn periodic_probe(self: &Arc<Self>) {
        {
            let page = self.page();
            if !page.online || !page.visible {
                return;
            }
        }
        if self.is_reconnecting() {
            return;
        }

        match self.probe.probe().await {
            Ok(()) => {
                if self.state() == ConnectionState::Degraded {
                    tracing::info!("Backend reachable again");
                    let _ = self.reconnect().await;
                }
            }
            Err(e) => {
                tracing::warn!("Periodic probe failed: {}", e);
                self.set_state(ConnectionState::Degraded);
                self.queries.invalidate_all();
                self.schedule(self.timing.reconnect_retry, Delayed::Retry);
            }
        }
    }

    /// Consume events until the sender side closes
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<SyncEvent>) {
        let interval = self.timing.probe_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(probe_interval_secs = interval.as_secs(), "Connectivity watcher started");
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
                _ = ticker.tick() => self.periodic_probe().await,
            }
        }

        self.cancel_pending();
        tracing::info!("Connectivity watcher stopped");
    }
}
