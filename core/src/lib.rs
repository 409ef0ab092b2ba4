//! Session, navigation, and real-time connection core for the mela app.
//!
//! This crate is the embedded library behind the screen layer. It owns the
//! three lifecycle concerns that outlive any single screen:
//!
//! - [`ConnectionManager`]: at most one live real-time channel, shared by
//!   every screen that needs it via reference-counted acquire/release, with a
//!   debounced teardown that absorbs rapid navigation.
//! - [`NotificationRouter`]: captures notification payloads durably and
//!   resolves them into in-app destinations once a screen is ready to
//!   navigate, across foreground, background-tap, and cold-start delivery.
//! - [`SessionBootstrap`]: trusts the cached session at cold start to unblock
//!   navigation immediately, then reconciles with the authoritative profile
//!   in the background.
//!
//! All three share one durable [`KeyValueStore`] and are wired together by an
//! explicitly constructed [`ClientCore`]. The GraphQL backend, push transport,
//! and real-time wire protocol stay behind the [`ProfileFetcher`],
//! [`Navigator`], and [`RealtimeTransport`] seams the host implements.

pub mod bootstrap;
pub mod connection;
pub mod context;
pub mod keys;
pub mod profile;
pub mod router;
pub mod store;

pub use bootstrap::{AuthVerdict, BootstrapPhase, ProfileFetcher, SessionBootstrap};
pub use connection::{
    Acquired, ChannelEvent, ConnectParams, ConnectionManager, RealtimeChannel, RealtimeTransport,
};
pub use context::ClientCore;
pub use profile::{ProfileFields, SessionIdentity, SessionProfile};
pub use router::{
    route, Destination, NamedRoute, Navigator, NotificationPayload, NotificationRouter,
    PendingNavigation,
};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreConfig, StoreError};
