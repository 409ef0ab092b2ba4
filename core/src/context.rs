// Explicitly constructed core context
// Owns the store handle and the three lifecycle components. There are no
// module-level globals: tests and hosts build and tear down a ClientCore each

use crate::bootstrap::SessionBootstrap;
use crate::connection::{ConnectionManager, RealtimeTransport};
use crate::router::NotificationRouter;
use crate::store::{FileStore, KeyValueStore, StoreConfig, StoreError};
use std::sync::Arc;

/// Scope file holding the session, profile, and pending-navigation keys
const SESSION_SCOPE: &str = "session";

/// The embedded core consumed by the screen layer. The connection manager,
/// notification router, and session bootstrap share one durable store and are
/// the sole mutators of their own state slices.
pub struct ClientCore {
    store: Arc<dyn KeyValueStore>,
    connection: ConnectionManager,
    router: NotificationRouter,
    bootstrap: SessionBootstrap,
}

impl ClientCore {
    /// Build a core over an explicit store (tests, hosts with their own
    /// persistence)
    pub fn new(store: Arc<dyn KeyValueStore>, transport: Arc<dyn RealtimeTransport>) -> Self {
        Self {
            connection: ConnectionManager::new(Arc::clone(&store), transport),
            router: NotificationRouter::new(Arc::clone(&store)),
            bootstrap: SessionBootstrap::new(Arc::clone(&store)),
            store,
        }
    }

    /// Build a core over the default on-disk store
    pub fn open(
        config: &StoreConfig,
        transport: Arc<dyn RealtimeTransport>,
    ) -> Result<Self, StoreError> {
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(config, SESSION_SCOPE)?);
        Ok(Self::new(store, transport))
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn router(&self) -> &NotificationRouter {
        &self.router
    }

    pub fn bootstrap(&self) -> &SessionBootstrap {
        &self.bootstrap
    }
}
