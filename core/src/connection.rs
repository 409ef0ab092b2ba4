// Shared real-time connection ownership
// Reference-counted acquire/release around a single live channel, with a
// debounced teardown so rapid navigation between two chat screens reuses the
// connection instead of closing and reopening it

use crate::keys;
use crate::store::{KeyValueStore, StoreError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Grace window after the last release before the channel is closed
const TEARDOWN_GRACE: Duration = Duration::from_millis(250);

/// Lifecycle events emitted by a live channel. Business events ride on the
/// host's own subscriptions; this core consumes these only for logging.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    Error(String),
}

/// A live bidirectional channel. The transport library behind it is the
/// host's choice; this core only needs close semantics and lifecycle events.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Subscribe to lifecycle events (connect/disconnect/error)
    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent>;
    /// Close the channel; must be idempotent
    async fn close(&self);
}

/// Connection-time handshake parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub user_id: String,
    pub auth_token: String,
}

impl ConnectParams {
    /// Query parameters carried on the connect handshake
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("userId".to_string(), self.user_id.clone()),
            ("token".to_string(), format!("Bearer {}", self.auth_token)),
        ]
    }
}

/// Opens the single reliable channel for a set of handshake parameters
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn connect(&self, params: ConnectParams) -> anyhow::Result<Box<dyn RealtimeChannel>>;
}

/// What an acquire bought the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    /// A channel is open (or opening); real-time updates will flow
    Live,
    /// Missing credentials or connect failure; the caller keeps working
    /// without real-time updates and may acquire again later to retry
    Degraded,
}

/// Connection lifecycle; at most one channel exists process-wide
enum LinkState {
    /// No channel and none wanted
    Idle,
    /// A connect is in flight; no second connect may start
    Opening,
    /// Channel is live with at least one consumer (or just installed)
    Open(Box<dyn RealtimeChannel>),
    /// All consumers released; the channel closes when the grace task fires
    ClosingScheduled {
        channel: Box<dyn RealtimeChannel>,
        teardown: JoinHandle<()>,
    },
}

struct Inner {
    consumers: u32,
    link: LinkState,
}

/// Owns the single real-time channel and hands out reference-counted access.
/// Screens call `acquire` on mount and `release` on unmount; the channel is
/// opened lazily and closed only after the count stays at zero for the full
/// grace window.
#[derive(Clone)]
pub struct ConnectionManager {
    store: Arc<dyn KeyValueStore>,
    transport: Arc<dyn RealtimeTransport>,
    inner: Arc<Mutex<Inner>>,
}

impl ConnectionManager {
    pub fn new(store: Arc<dyn KeyValueStore>, transport: Arc<dyn RealtimeTransport>) -> Self {
        Self {
            store,
            transport,
            inner: Arc::new(Mutex::new(Inner {
                consumers: 0,
                link: LinkState::Idle,
            })),
        }
    }

    /// Register a consumer. Cancels a pending teardown (the channel is reused
    /// without a reconnect round-trip) or opens the channel when none exists.
    ///
    /// A failed open is not an error: the consumer is still counted and runs
    /// degraded, and a later acquire retries. Only a store failure propagates,
    /// and that acquire is rolled back, so it needs no matching release.
    pub async fn acquire(&self) -> Result<Acquired, StoreError> {
        {
            let mut inner = self.inner.lock().await;
            inner.consumers += 1;
            match std::mem::replace(&mut inner.link, LinkState::Idle) {
                LinkState::ClosingScheduled { channel, teardown } => {
                    teardown.abort();
                    inner.link = LinkState::Open(channel);
                    debug!("teardown cancelled, reusing live channel");
                    return Ok(Acquired::Live);
                }
                live @ (LinkState::Open(_) | LinkState::Opening) => {
                    inner.link = live;
                    return Ok(Acquired::Live);
                }
                LinkState::Idle => inner.link = LinkState::Opening,
            }
        }

        // We own the single in-flight open; the lock is not held across it
        self.open_channel().await
    }

    /// Drop a consumer. When the count reaches zero the teardown is scheduled
    /// after the grace window rather than closing immediately.
    pub async fn release(&self) {
        let mut inner = self.inner.lock().await;
        if inner.consumers == 0 {
            warn!("release without matching acquire");
            return;
        }
        inner.consumers -= 1;
        if inner.consumers == 0 {
            self.schedule_teardown(&mut inner);
        }
    }

    pub async fn consumer_count(&self) -> u32 {
        self.inner.lock().await.consumers
    }

    /// True while a channel exists, including during the grace window
    pub async fn is_open(&self) -> bool {
        matches!(
            self.inner.lock().await.link,
            LinkState::Open(_) | LinkState::ClosingScheduled { .. }
        )
    }

    async fn open_channel(&self) -> Result<Acquired, StoreError> {
        let params = match self.connect_params().await {
            Ok(Some(params)) => params,
            Ok(None) => {
                debug!("session credentials missing, realtime features unavailable");
                self.reset_opening().await;
                return Ok(Acquired::Degraded);
            }
            Err(err) => {
                // Unexpected store failure: undo this acquire before propagating
                let mut inner = self.inner.lock().await;
                inner.consumers = inner.consumers.saturating_sub(1);
                if matches!(inner.link, LinkState::Opening) {
                    inner.link = LinkState::Idle;
                }
                return Err(err);
            }
        };

        match self.transport.connect(params).await {
            Ok(channel) => {
                self.spawn_event_logger(channel.subscribe());
                let mut inner = self.inner.lock().await;
                inner.link = LinkState::Open(channel);
                if inner.consumers == 0 {
                    // Every consumer released while the open was in flight;
                    // schedule the close so the channel is not leaked
                    self.schedule_teardown(&mut inner);
                }
                Ok(Acquired::Live)
            }
            Err(err) => {
                warn!(error = %err, "realtime connect failed, continuing without live updates");
                self.reset_opening().await;
                Ok(Acquired::Degraded)
            }
        }
    }

    async fn connect_params(&self) -> Result<Option<ConnectParams>, StoreError> {
        let user_id = self.store.get(keys::USER_ID).await?;
        let auth_token = self.store.get(keys::AUTH_TOKEN).await?;
        match (user_id, auth_token) {
            (Some(user_id), Some(auth_token)) => Ok(Some(ConnectParams {
                user_id,
                auth_token,
            })),
            _ => Ok(None),
        }
    }

    async fn reset_opening(&self) {
        let mut inner = self.inner.lock().await;
        if matches!(inner.link, LinkState::Opening) {
            inner.link = LinkState::Idle;
        }
    }

    /// Move an open channel into the grace window. The spawned task re-checks
    /// the consumer count at fire time and never closes a revived channel.
    fn schedule_teardown(&self, inner: &mut Inner) {
        if let LinkState::Open(channel) = std::mem::replace(&mut inner.link, LinkState::Idle) {
            let shared = Arc::clone(&self.inner);
            let teardown = tokio::spawn(async move {
                tokio::time::sleep(TEARDOWN_GRACE).await;
                let channel = {
                    let mut inner = shared.lock().await;
                    if inner.consumers > 0 {
                        return;
                    }
                    match std::mem::replace(&mut inner.link, LinkState::Idle) {
                        LinkState::ClosingScheduled { channel, .. } => Some(channel),
                        other => {
                            inner.link = other;
                            None
                        }
                    }
                };
                if let Some(channel) = channel {
                    channel.close().await;
                    debug!("realtime channel closed after grace window");
                }
            });
            inner.link = LinkState::ClosingScheduled { channel, teardown };
        }
    }

    fn spawn_event_logger(&self, mut events: broadcast::Receiver<ChannelEvent>) {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => debug!(?event, "realtime channel event"),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "realtime channel events dropped")
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}
