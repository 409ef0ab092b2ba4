// Pending-navigation capture and deep-link routing for push notifications
// Decouples "a notification woke or reached the app" from "a screen is ready
// to navigate": the payload is captured durably and resolved on demand, across
// foreground delivery, background tap, and cold-start tap

use crate::keys;
use crate::store::{KeyValueStore, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Captured payloads older than this are treated as absent and purged
const FRESHNESS_WINDOW_MS: i64 = 5 * 60 * 1000;

/// Delay before issuing the replace-navigation, letting the navigation stack
/// finish mounting after an app open
const MOUNT_SETTLE_DELAY: Duration = Duration::from_millis(1500);

// Payload keys recognized for routing, in precedence order
const ROOM_ID_KEY: &str = "room_id";
const SERVICE_ID_KEY: &str = "service_id";
const ROUTE_KEY: &str = "route";

/// Opaque key/value payload carried by a notification
pub type NotificationPayload = BTreeMap<String, String>;

/// Named logical routes a notification may point at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedRoute {
    Chat,
    Profile,
    Wallet,
    Explore,
}

impl std::fmt::Display for NamedRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NamedRoute::Chat => write!(f, "chat"),
            NamedRoute::Profile => write!(f, "profile"),
            NamedRoute::Wallet => write!(f, "wallet"),
            NamedRoute::Explore => write!(f, "explore"),
        }
    }
}

impl std::str::FromStr for NamedRoute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(NamedRoute::Chat),
            "profile" => Ok(NamedRoute::Profile),
            "wallet" => Ok(NamedRoute::Wallet),
            "explore" => Ok(NamedRoute::Explore),
            _ => Err(format!("Unknown route: {}", s)),
        }
    }
}

/// Concrete in-app destination a payload resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// A specific chat room
    ChatRoom(String),
    /// A specific service/product detail page
    Service(String),
    /// One of the named tab routes
    Tab(NamedRoute),
    /// Default destination when nothing matches or navigation fails
    Home,
}

impl Destination {
    pub fn deep_link(&self) -> String {
        match self {
            Destination::ChatRoom(id) => format!("mela://chat/{}", id),
            Destination::Service(id) => format!("mela://service/{}", id),
            Destination::Tab(route) => format!("mela://{}", route),
            Destination::Home => "mela://home".to_string(),
        }
    }
}

/// Map a payload to a destination with fixed precedence: an explicit chat-room
/// reference wins over a service reference, which wins over a named route.
/// Anything else routes home.
pub fn route(payload: &NotificationPayload) -> Destination {
    if let Some(room_id) = payload.get(ROOM_ID_KEY).filter(|v| !v.is_empty()) {
        return Destination::ChatRoom(room_id.clone());
    }
    if let Some(service_id) = payload.get(SERVICE_ID_KEY).filter(|v| !v.is_empty()) {
        return Destination::Service(service_id.clone());
    }
    if let Some(name) = payload.get(ROUTE_KEY) {
        if let Ok(named) = name.parse::<NamedRoute>() {
            return Destination::Tab(named);
        }
    }
    Destination::Home
}

/// A captured notification payload awaiting navigation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingNavigation {
    pub payload: NotificationPayload,
    #[serde(rename = "capturedAt", with = "chrono::serde::ts_milliseconds")]
    pub captured_at: DateTime<Utc>,
}

impl PendingNavigation {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.captured_at).num_milliseconds() <= FRESHNESS_WINDOW_MS
    }
}

/// Issues replace-style navigations for the host's navigation stack
#[async_trait::async_trait]
pub trait Navigator: Send + Sync {
    async fn replace(&self, destination: Destination) -> anyhow::Result<()>;
}

/// Holds the single pending-navigation slot, in memory and durably. A newer
/// capture overwrites an older unconsumed one; expiry is checked lazily at
/// resolve time.
#[derive(Clone)]
pub struct NotificationRouter {
    store: Arc<dyn KeyValueStore>,
    pending: Arc<StdMutex<Option<PendingNavigation>>>,
}

impl NotificationRouter {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            pending: Arc::new(StdMutex::new(None)),
        }
    }

    /// Store a payload with the current capture time, overwriting any prior
    /// unconsumed entry. Never navigates.
    pub async fn capture(&self, payload: NotificationPayload) -> Result<(), StoreError> {
        let entry = PendingNavigation {
            payload,
            captured_at: Utc::now(),
        };
        let raw = serde_json::to_string(&entry).map_err(|source| StoreError::Malformed {
            context: keys::PENDING_NAV.to_string(),
            source,
        })?;

        *self.pending.lock().unwrap() = Some(entry);
        self.store.put(keys::PENDING_NAV, &raw).await?;
        debug!("notification payload captured");
        Ok(())
    }

    /// Return the pending navigation if present and unexpired. Falls back to
    /// durable storage when memory is empty (the process just restarted);
    /// an expired entry is purged and reported absent.
    pub async fn resolve(&self) -> Result<Option<PendingNavigation>, StoreError> {
        let cached = self.pending.lock().unwrap().clone();
        let entry = match cached {
            Some(entry) => Some(entry),
            None => match self.store.get(keys::PENDING_NAV).await? {
                Some(raw) => Some(serde_json::from_str(&raw).map_err(|source| {
                    StoreError::Malformed {
                        context: keys::PENDING_NAV.to_string(),
                        source,
                    }
                })?),
                None => None,
            },
        };

        match entry {
            Some(entry) if entry.is_fresh(Utc::now()) => {
                *self.pending.lock().unwrap() = Some(entry.clone());
                Ok(Some(entry))
            }
            Some(_) => {
                debug!("pending navigation expired, purging");
                self.consume().await?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Clear the pending slot, memory and durable, after a navigation so the
    /// destination is never replayed on the next foregrounding
    pub async fn consume(&self) -> Result<(), StoreError> {
        *self.pending.lock().unwrap() = None;
        self.store.remove(keys::PENDING_NAV).await
    }

    /// Resolve and navigate once the stack has settled after an app open.
    ///
    /// Waits the fixed settle delay, resolves the pending payload, and issues
    /// a replace-navigation. A navigation error falls back to the home
    /// destination; either way the pending entry is consumed. Returns the
    /// destination that was issued, or `None` when nothing was pending.
    pub async fn dispatch(
        &self,
        navigator: &dyn Navigator,
    ) -> Result<Option<Destination>, StoreError> {
        tokio::time::sleep(MOUNT_SETTLE_DELAY).await;

        let Some(entry) = self.resolve().await? else {
            return Ok(None);
        };

        let destination = route(&entry.payload);
        let issued = match navigator.replace(destination.clone()).await {
            Ok(()) => destination,
            Err(err) => {
                warn!(error = %err, "navigation failed, falling back to home");
                // Best effort; a failing home navigation is the host's problem
                let _ = navigator.replace(Destination::Home).await;
                Destination::Home
            }
        };

        self.consume().await?;
        Ok(Some(issued))
    }
}
