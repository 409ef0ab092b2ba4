//! End-to-end lifecycle tests across the bootstrap, router, and connection
//! components sharing one durable store
//!
//! These cover the cross-component scenarios a single module test cannot: a
//! cold start racing a background reconcile, a notification captured before
//! the process restarts, and a pending destination resolved after bootstrap.

use async_trait::async_trait;
use mela_core::{
    keys, Acquired, AuthVerdict, ChannelEvent, ClientCore, ConnectParams, Destination, FileStore,
    KeyValueStore, MemoryStore, Navigator, NotificationPayload, ProfileFetcher, ProfileFields,
    RealtimeChannel, RealtimeTransport, SessionIdentity, StoreConfig,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::broadcast;

struct MockChannel {
    events: broadcast::Sender<ChannelEvent>,
}

#[async_trait]
impl RealtimeChannel for MockChannel {
    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    async fn close(&self) {
        let _ = self.events.send(ChannelEvent::Disconnected);
    }
}

#[derive(Default)]
struct MockTransport {
    connects: AtomicUsize,
    seen_params: Mutex<Vec<ConnectParams>>,
}

#[async_trait]
impl RealtimeTransport for MockTransport {
    async fn connect(&self, params: ConnectParams) -> anyhow::Result<Box<dyn RealtimeChannel>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.seen_params.lock().unwrap().push(params);
        let (events, _) = broadcast::channel(8);
        Ok(Box::new(MockChannel { events }))
    }
}

struct StaticFetcher(ProfileFields);

#[async_trait]
impl ProfileFetcher for StaticFetcher {
    async fn fetch(&self, _auth_token: &str) -> anyhow::Result<ProfileFields> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
struct RecordingNavigator {
    destinations: Mutex<Vec<Destination>>,
}

#[async_trait]
impl Navigator for RecordingNavigator {
    async fn replace(&self, destination: Destination) -> anyhow::Result<()> {
        self.destinations.lock().unwrap().push(destination);
        Ok(())
    }
}

fn payload(pairs: &[(&str, &str)]) -> NotificationPayload {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn seeded_store() -> Arc<dyn KeyValueStore> {
    let store = MemoryStore::new();
    store.put(keys::AUTHENTICATED, "true").await.unwrap();
    store.put(keys::USER_ID, "u1").await.unwrap();
    store.put(keys::AUTH_TOKEN, "t1").await.unwrap();
    store.put(keys::PHONE, "+910000000000").await.unwrap();
    Arc::new(store)
}

/// Cold start with required keys and no cached profile: the verdict is an
/// immediate LoggedIn with an empty profile, and the background fetch lands
/// in the store without blocking anyone.
#[tokio::test]
async fn cold_start_trusts_cache_then_reconciles_in_background() {
    let store = seeded_store().await;
    let core = ClientCore::new(Arc::clone(&store), Arc::new(MockTransport::default()));

    let fetcher = Arc::new(StaticFetcher(ProfileFields {
        fullname: Some("A".to_string()),
        ..Default::default()
    }));
    let verdict = core.bootstrap().start(fetcher).await.unwrap();

    let AuthVerdict::LoggedIn(session) = verdict else {
        panic!("expected LoggedIn");
    };
    assert_eq!(session.profile, ProfileFields::default());

    // The spawned reconcile persists the fetched field
    let mut persisted = None;
    for _ in 0..200 {
        persisted = store.get(keys::FULLNAME).await.unwrap();
        if persisted.is_some() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(persisted.as_deref(), Some("A"));

    let session = core.bootstrap().session().unwrap();
    assert_eq!(session.profile.fullname.as_deref(), Some("A"));
}

/// A notification captured before a process restart is still resolvable from
/// durable storage afterwards, provided it is within the freshness window.
#[tokio::test]
async fn captured_payload_survives_process_restart() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

    let first = ClientCore::new(Arc::clone(&store), Arc::new(MockTransport::default()));
    first
        .router()
        .capture(payload(&[("room_id", "r1")]))
        .await
        .unwrap();
    drop(first);

    // Memory cleared, durable store retained
    let restarted = ClientCore::new(store, Arc::new(MockTransport::default()));
    let resolved = restarted.router().resolve().await.unwrap().unwrap();
    assert_eq!(
        resolved.payload.get("room_id").map(String::as_str),
        Some("r1")
    );
}

/// A notification that arrived before the session was verified takes effect
/// once bootstrap has run and a screen dispatches it; the connection opens
/// with the persisted credentials.
#[tokio::test(start_paused = true)]
async fn pending_destination_applies_after_bootstrap() {
    let store = seeded_store().await;
    let transport = Arc::new(MockTransport::default());
    let core = ClientCore::new(Arc::clone(&store), Arc::clone(&transport) as _);

    // Notification lands first, before any verdict exists
    core.router()
        .capture(payload(&[("room_id", "r1"), ("route", "wallet")]))
        .await
        .unwrap();

    let verdict = core.bootstrap().local_verdict().await.unwrap();
    assert!(matches!(verdict, AuthVerdict::LoggedIn(_)));

    // The chat screen mounts: dispatch navigates (room wins over the named
    // route) and the realtime connection opens with the stored credentials
    let navigator = RecordingNavigator::default();
    let issued = core.router().dispatch(&navigator).await.unwrap();
    assert_eq!(issued, Some(Destination::ChatRoom("r1".to_string())));

    let acquired = core.connection().acquire().await.unwrap();
    assert_eq!(acquired, Acquired::Live);
    let params = transport.seen_params.lock().unwrap().clone();
    assert_eq!(
        params,
        vec![ConnectParams {
            user_id: "u1".to_string(),
            auth_token: "t1".to_string(),
        }]
    );

    // Consumed: the destination is not replayed on the next foregrounding
    assert_eq!(core.router().resolve().await.unwrap(), None);
}

/// Full on-disk round trip: a session established through one core instance
/// is trusted by a second instance reading the same scope file.
#[tokio::test]
async fn file_backed_session_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let config = StoreConfig {
        data_dir: temp_dir.path().to_path_buf(),
    };

    let core = ClientCore::open(&config, Arc::new(MockTransport::default())).unwrap();
    core.bootstrap()
        .establish_session(
            SessionIdentity {
                user_id: "u1".to_string(),
                phone: "+910000000000".to_string(),
                auth_token: "t1".to_string(),
                refresh_token: None,
            },
            ProfileFields {
                fullname: Some("A".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    drop(core);

    let restarted = ClientCore::open(&config, Arc::new(MockTransport::default())).unwrap();
    let AuthVerdict::LoggedIn(session) = restarted.bootstrap().local_verdict().await.unwrap()
    else {
        panic!("expected LoggedIn from the scope file");
    };
    assert_eq!(session.identity.user_id, "u1");
    assert_eq!(session.profile.fullname.as_deref(), Some("A"));

    // Logout through the restarted core clears the file-backed session too
    restarted.bootstrap().logout().await.unwrap();
    let third = ClientCore::open(&config, Arc::new(MockTransport::default())).unwrap();
    assert_eq!(
        third.bootstrap().local_verdict().await.unwrap(),
        AuthVerdict::LoggedOut
    );
}

/// FileStore can be shared across components through the trait object just
/// like the in-memory store.
#[tokio::test]
async fn file_store_backs_the_pending_slot() {
    let temp_dir = TempDir::new().unwrap();
    let config = StoreConfig {
        data_dir: temp_dir.path().to_path_buf(),
    };

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&config, "session").unwrap());
    let core = ClientCore::new(Arc::clone(&store), Arc::new(MockTransport::default()));
    core.router()
        .capture(payload(&[("service_id", "s9")]))
        .await
        .unwrap();

    let reopened: Arc<dyn KeyValueStore> =
        Arc::new(FileStore::open(&config, "session").unwrap());
    let restarted = ClientCore::new(reopened, Arc::new(MockTransport::default()));
    let resolved = restarted.router().resolve().await.unwrap().unwrap();
    assert_eq!(mela_core::route(&resolved.payload), Destination::Service("s9".to_string()));
}
