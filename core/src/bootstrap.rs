// Cold-start session bootstrap
// Trusts the cached session synchronously so navigation is never blocked on
// the network, then reconciles against the authoritative profile in the
// background (stale-while-revalidate)

use crate::keys;
use crate::profile::{ProfileFields, SessionIdentity, SessionProfile};
use crate::store::{KeyValueStore, StoreError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex as StdMutex};
use tracing::{debug, error, info, warn};

/// Authentication verdict emitted at process start
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthVerdict {
    /// Required durable fields are missing; the user must re-authenticate
    LoggedOut,
    /// Cached session is trusted; the profile may be stale until reconciled
    LoggedIn(SessionProfile),
}

/// Bootstrap progress. `Reconciled` and `LoggedOut` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    /// No verdict yet
    Unknown,
    /// Cached verdict emitted, reconciliation still pending
    LocalVerdict,
    /// Reconciliation finished, successfully or not
    Reconciled,
    /// Required fields missing at cold start, or an explicit logout
    LoggedOut,
}

/// Fetches the authoritative profile keyed by the cached auth token.
/// An empty or partial field set is a valid response, not a failure.
#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    async fn fetch(&self, auth_token: &str) -> anyhow::Result<ProfileFields>;
}

struct BootstrapState {
    phase: BootstrapPhase,
    session: Option<SessionProfile>,
}

/// Produces the cold-start authentication verdict and owns the in-memory
/// session for the rest of the process lifetime. Only `logout` ever clears an
/// established session; a failed reconciliation never downgrades it.
#[derive(Clone)]
pub struct SessionBootstrap {
    store: Arc<dyn KeyValueStore>,
    state: Arc<StdMutex<BootstrapState>>,
}

impl SessionBootstrap {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            state: Arc::new(StdMutex::new(BootstrapState {
                phase: BootstrapPhase::Unknown,
                session: None,
            })),
        }
    }

    /// Read the cached session and emit a verdict without touching the
    /// network. Any missing required field means `LoggedOut`; otherwise the
    /// cached profile (possibly empty) is trusted as-is.
    pub async fn local_verdict(&self) -> Result<AuthVerdict, StoreError> {
        let store = self.store.as_ref();

        let authenticated = store
            .get(keys::AUTHENTICATED)
            .await?
            .map(|v| v == "true")
            .unwrap_or(false);
        let user_id = store.get(keys::USER_ID).await?;
        let auth_token = store.get(keys::AUTH_TOKEN).await?;
        let phone = store.get(keys::PHONE).await?;

        let (user_id, auth_token, phone) = match (authenticated, user_id, auth_token, phone) {
            (true, Some(user_id), Some(auth_token), Some(phone)) => (user_id, auth_token, phone),
            _ => {
                debug!("required session fields missing, treating as logged out");
                let mut state = self.state.lock().unwrap();
                state.session = None;
                state.phase = BootstrapPhase::LoggedOut;
                return Ok(AuthVerdict::LoggedOut);
            }
        };

        let refresh_token = store.get(keys::REFRESH_TOKEN).await?;
        let profile = ProfileFields::load(store).await?;
        let session = SessionProfile {
            identity: SessionIdentity {
                user_id,
                phone,
                auth_token,
                refresh_token,
            },
            profile,
        };

        {
            let mut state = self.state.lock().unwrap();
            state.session = Some(session.clone());
            state.phase = BootstrapPhase::LocalVerdict;
        }
        Ok(AuthVerdict::LoggedIn(session))
    }

    /// Fetch the authoritative profile and merge it over the cached one,
    /// fresh fields winning. Any fetch failure keeps the session exactly as
    /// the local verdict left it; it is logged and never surfaced. Either way
    /// the phase ends at `Reconciled`.
    pub async fn reconcile(&self, fetcher: &dyn ProfileFetcher) -> Result<(), StoreError> {
        let token = {
            let state = self.state.lock().unwrap();
            state
                .session
                .as_ref()
                .map(|s| s.identity.auth_token.clone())
        };
        let Some(token) = token else {
            // Nothing cached to reconcile against
            return Ok(());
        };

        match fetcher.fetch(&token).await {
            Ok(fresh) => {
                let merged = {
                    let mut state = self.state.lock().unwrap();
                    let Some(session) = state.session.as_mut() else {
                        // Logged out while the fetch was in flight; discard
                        return Ok(());
                    };
                    let merged = ProfileFields::merged(&session.profile, &fresh);
                    session.profile = merged.clone();
                    state.phase = BootstrapPhase::Reconciled;
                    merged
                };
                merged.persist(self.store.as_ref()).await?;
                debug!("profile reconciled");
            }
            Err(err) => {
                warn!(error = %err, "profile fetch failed, keeping cached session");
                let mut state = self.state.lock().unwrap();
                if state.session.is_some() {
                    state.phase = BootstrapPhase::Reconciled;
                }
            }
        }
        Ok(())
    }

    /// Emit the local verdict, then reconcile in the background. The spawned
    /// fetch is not cancellable; its result is applied opportunistically even
    /// if navigation has already happened.
    pub async fn start(&self, fetcher: Arc<dyn ProfileFetcher>) -> Result<AuthVerdict, StoreError> {
        let verdict = self.local_verdict().await?;
        if matches!(verdict, AuthVerdict::LoggedIn(_)) {
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(err) = this.reconcile(fetcher.as_ref()).await {
                    error!(error = %err, "failed to persist reconciled profile");
                }
            });
        }
        Ok(verdict)
    }

    /// Persist a freshly verified session (called after OTP verification)
    /// and prime the in-memory state with it
    pub async fn establish_session(
        &self,
        identity: SessionIdentity,
        profile: ProfileFields,
    ) -> Result<(), StoreError> {
        let store = self.store.as_ref();
        store.put(keys::AUTHENTICATED, "true").await?;
        store.put(keys::USER_ID, &identity.user_id).await?;
        store.put(keys::AUTH_TOKEN, &identity.auth_token).await?;
        store.put(keys::PHONE, &identity.phone).await?;
        if let Some(token) = &identity.refresh_token {
            store.put(keys::REFRESH_TOKEN, token).await?;
        }
        profile.persist(store).await?;

        let mut state = self.state.lock().unwrap();
        state.session = Some(SessionProfile { identity, profile });
        // The profile came straight from the verification flow
        state.phase = BootstrapPhase::Reconciled;
        info!("session established");
        Ok(())
    }

    /// Merge-and-persist path for explicit profile mutations (name change,
    /// wallet update, KYC result)
    pub async fn apply_profile_mutation(&self, fields: ProfileFields) -> Result<(), StoreError> {
        let merged = {
            let mut state = self.state.lock().unwrap();
            let Some(session) = state.session.as_mut() else {
                warn!("profile mutation with no active session, ignoring");
                return Ok(());
            };
            let merged = ProfileFields::merged(&session.profile, &fields);
            session.profile = merged.clone();
            merged
        };
        merged.persist(self.store.as_ref()).await
    }

    /// Destroy the session: every durable session and profile key is cleared
    /// along with the in-memory state. The only path from logged-in to
    /// logged-out.
    pub async fn logout(&self) -> Result<(), StoreError> {
        for key in keys::ALL_SESSION_KEYS {
            self.store.remove(key).await?;
        }
        let mut state = self.state.lock().unwrap();
        state.session = None;
        state.phase = BootstrapPhase::LoggedOut;
        info!("session cleared");
        Ok(())
    }

    pub fn phase(&self) -> BootstrapPhase {
        self.state.lock().unwrap().phase
    }

    pub fn session(&self) -> Option<SessionProfile> {
        self.state.lock().unwrap().session.clone()
    }

    /// Current verdict derived from the in-memory session
    pub fn verdict(&self) -> AuthVerdict {
        match &self.state.lock().unwrap().session {
            Some(session) => AuthVerdict::LoggedIn(session.clone()),
            None => AuthVerdict::LoggedOut,
        }
    }
}
