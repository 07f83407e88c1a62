//! Session & Identity Resolver
//!
//! Owns [`SessionState`] and drives every transition of the session state
//! machine:
//!
//! ```text
//! INITIALIZING ──► AUTHENTICATED(remote | fallback)
//!      │                 ▲        │
//!      ▼                 │        ▼
//! UNAUTHENTICATED ◄──────┴── logout / remote sign-out
//! ```
//!
//! Remote notifications are consumed by a single listener task in delivery
//! order. `login`, `register`, `logout` and `refresh_session` queue behind
//! one another, and the listener takes the same gate, so no two identity
//! mutations ever interleave.

use crate::credentials::CredentialTable;
use crate::fallback::{FallbackIdentityCache, MemoryFallbackStore, DEFAULT_STORAGE_KEY};
use crate::records::MemoryRecordStore;
use crate::state::{SessionPhase, SessionSource, SessionState};
use crate::strategy::{RoleResolver, RoleStrategy};
use academia_core::{
    log_operation_error, log_operation_start, log_operation_success, performance, AuthConfig,
    AuthError, AuthResult, FallbackStore, Identity, RecordStore, RecordsConfig,
    RemoteIdentityService, RemoteSession, Role, SessionEvent, SessionEventKind,
};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Single source of truth for the caller's session
pub struct SessionResolver {
    /// Authoritative identity service
    remote: Arc<dyn RemoteIdentityService>,
    /// Role strategy chain run for every adopted remote session
    roles: RoleResolver,
    /// Cached fallback identity
    cache: FallbackIdentityCache,
    /// Credentials accepted when the remote service rejects a login
    credentials: Arc<CredentialTable>,
    fallback_login_enabled: bool,
    /// Current state; consumers hold receivers
    state: watch::Sender<SessionState>,
    /// Serializes identity mutations
    gate: Mutex<()>,
    initialized: AtomicBool,
    listener: StdMutex<Option<JoinHandle<()>>>,
}

/// Builder for [`SessionResolver`]
pub struct SessionResolverBuilder {
    remote: Arc<dyn RemoteIdentityService>,
    fallback_store: Option<Arc<dyn FallbackStore>>,
    storage_key: String,
    strategies: Option<Vec<Arc<dyn RoleStrategy>>>,
    record_store: Option<Arc<dyn RecordStore>>,
    records_config: RecordsConfig,
    credentials: Option<CredentialTable>,
    fallback_login_enabled: bool,
}

impl SessionResolverBuilder {
    fn new(remote: Arc<dyn RemoteIdentityService>) -> Self {
        Self {
            remote,
            fallback_store: None,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            strategies: None,
            record_store: None,
            records_config: RecordsConfig::default(),
            credentials: None,
            fallback_login_enabled: true,
        }
    }

    pub fn fallback_store(mut self, store: Arc<dyn FallbackStore>) -> Self {
        self.fallback_store = Some(store);
        self
    }

    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    /// Replace the standard chain with a custom strategy list
    pub fn strategies(mut self, strategies: Vec<Arc<dyn RoleStrategy>>) -> Self {
        self.strategies = Some(strategies);
        self
    }

    /// Record store consulted by the standard chain
    pub fn record_store(mut self, records: Arc<dyn RecordStore>) -> Self {
        self.record_store = Some(records);
        self
    }

    pub fn records_config(mut self, config: RecordsConfig) -> Self {
        self.records_config = config;
        self
    }

    pub fn credentials(mut self, table: CredentialTable) -> Self {
        self.credentials = Some(table);
        self
    }

    pub fn fallback_login_enabled(mut self, enabled: bool) -> Self {
        self.fallback_login_enabled = enabled;
        self
    }

    /// Construct the resolver and run startup resolution before returning it
    pub async fn build(self) -> Arc<SessionResolver> {
        let resolver = self.assemble();
        resolver.initialize().await;
        resolver
    }

    fn assemble(self) -> Arc<SessionResolver> {
        let credentials = Arc::new(self.credentials.unwrap_or_else(|| {
            CredentialTable::new(AuthConfig::default().fallback.credentials)
        }));

        let roles = match self.strategies {
            Some(strategies) => RoleResolver::new(strategies),
            None => {
                let records = self
                    .record_store
                    .unwrap_or_else(|| Arc::new(MemoryRecordStore::new()));
                RoleResolver::standard(records, &self.records_config, credentials.clone())
            }
        };

        let store = self
            .fallback_store
            .unwrap_or_else(|| Arc::new(MemoryFallbackStore::new()));

        let (state, _) = watch::channel(SessionState::initial());

        debug!(
            strategies = ?roles.strategy_names(),
            fallback_login = self.fallback_login_enabled,
            "Session resolver built"
        );

        Arc::new(SessionResolver {
            remote: self.remote,
            roles,
            cache: FallbackIdentityCache::new(store, self.storage_key),
            credentials,
            fallback_login_enabled: self.fallback_login_enabled,
            state,
            gate: Mutex::new(()),
            initialized: AtomicBool::new(false),
            listener: StdMutex::new(None),
        })
    }
}

impl SessionResolver {
    pub fn builder(remote: Arc<dyn RemoteIdentityService>) -> SessionResolverBuilder {
        SessionResolverBuilder::new(remote)
    }

    /// Resolver wired with the standard chain and fallback settings of `config`
    pub async fn from_config(
        config: &AuthConfig,
        remote: Arc<dyn RemoteIdentityService>,
        records: Arc<dyn RecordStore>,
        store: Arc<dyn FallbackStore>,
    ) -> Arc<Self> {
        Self::builder(remote)
            .record_store(records)
            .records_config(config.records.clone())
            .credentials(CredentialTable::new(config.fallback.credentials.clone()))
            .fallback_store(store)
            .storage_key(config.fallback.storage_key.clone())
            .fallback_login_enabled(config.fallback.allow_fallback_login)
            .build()
            .await
    }

    /// Run startup resolution. [`SessionResolverBuilder::build`] already
    /// does this, so later calls only log a warning.
    ///
    /// The notification subscription is taken before the one-shot session
    /// query so that no change slips in between.
    pub async fn initialize(self: &Arc<Self>) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            warn!("Session resolver already initialized");
            return;
        }

        log_operation_start!("initialize");
        let events = self.remote.subscribe();
        self.spawn_listener(events);

        performance::measure_async("initialize", async {
            let _gate = self.gate.lock().await;

            match self.remote.current_session().await {
                Ok(Some(session)) => self.adopt_remote(session).await,
                Ok(None) => self.restore_fallback().await,
                Err(e) => {
                    // Unreachable service counts as "no remote session"
                    log_operation_error!("initialize", e, stage = "current_session");
                    self.restore_fallback().await;
                }
            }

            self.state.send_if_modified(|state| state.finish_resolution());
        })
        .await;

        let state = self.state();
        log_operation_success!(
            "initialize",
            authenticated = state.is_authenticated(),
            source = ?state.source()
        );
    }

    fn spawn_listener(self: &Arc<Self>, mut events: broadcast::Receiver<SessionEvent>) {
        let resolver = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            loop {
                let received = events.recv().await;
                let Some(resolver) = resolver.upgrade() else {
                    break;
                };

                match received {
                    Ok(event) => resolver.on_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "Session notifications dropped, resyncing");
                        resolver.resync().await;
                    }
                    Err(RecvError::Closed) => {
                        debug!("Session notification channel closed");
                        break;
                    }
                }
            }
        });

        let mut listener = self.listener.lock().unwrap_or_else(|e| e.into_inner());
        *listener = Some(handle);
    }

    async fn on_event(&self, event: SessionEvent) {
        let _gate = self.gate.lock().await;
        debug!(kind = ?event.kind, has_session = event.session.is_some(), "Session notification");

        match (event.kind, event.session) {
            (_, None) => self.end_remote_session(),
            (SessionEventKind::TokenRefreshed, Some(session)) if self.is_current_user(&session) => {
                self.state.send_if_modified(|state| {
                    let changed = !state.holds_session(&session);
                    state.replace_session(session);
                    changed
                });
            }
            (SessionEventKind::UserUpdated, Some(session)) => {
                self.authenticate_remote(session).await;
            }
            (_, Some(session)) => self.adopt_remote(session).await,
        }

        self.state.send_if_modified(|state| state.finish_resolution());
    }

    /// Re-read the remote session after notifications were lost
    async fn resync(&self) {
        let _gate = self.gate.lock().await;
        match self.remote.current_session().await {
            Ok(Some(session)) => self.adopt_remote(session).await,
            Ok(None) => self.end_remote_session(),
            Err(e) => log_operation_error!("resync", e),
        }
    }

    fn is_current_user(&self, session: &RemoteSession) -> bool {
        let state = self.state.borrow();
        state.source() == Some(SessionSource::Remote)
            && state
                .identity()
                .map(|identity| identity.id == session.user.id)
                .unwrap_or(false)
    }

    /// Make `session` authoritative unless it is the one already held
    async fn adopt_remote(&self, session: RemoteSession) {
        let held = self.state.borrow().holds_session(&session);
        if held {
            debug!(user_id = %session.user.id, "Remote session already adopted");
            return;
        }
        self.authenticate_remote(session).await;
    }

    async fn authenticate_remote(&self, session: RemoteSession) {
        let identity = self.roles.resolve_identity(&session.user).await;

        // A stale fallback identity must not outlive a remote session
        if let Err(e) = self.cache.clear().await {
            e.log();
        }

        info!(
            user_id = %identity.id,
            role = %identity.role,
            source = %SessionSource::Remote,
            "Identity resolved"
        );
        self.state
            .send_modify(|state| state.authenticate_remote(identity, session));
    }

    /// Authoritative "no session" from the remote service
    fn end_remote_session(&self) {
        let mut ignored = false;
        let cleared = self.state.send_if_modified(|state| {
            if state.using_fallback() {
                ignored = true;
                return false;
            }
            if !state.is_authenticated() {
                return false;
            }
            state.clear();
            true
        });

        if ignored {
            debug!("Remote sign-out ignored while using fallback identity");
        } else if cleared {
            info!(source = %SessionSource::Remote, "Session ended");
        }
    }

    /// Adopt the cached fallback identity if nothing else authenticated first
    async fn restore_fallback(&self) {
        let Some(identity) = self.cache.load().await else {
            return;
        };

        let user_id = identity.id.clone();
        let restored = self.state.send_if_modified(|state| {
            if state.is_authenticated() {
                return false;
            }
            state.authenticate_fallback(identity);
            true
        });

        if restored {
            info!(user_id = %user_id, source = %SessionSource::Fallback, "Identity restored");
        }
    }

    /// Authenticate with email and password.
    ///
    /// The remote service is tried first; if it fails for any reason the
    /// credential table is consulted (unless fallback login is disabled).
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<()> {
        let _gate = self.gate.lock().await;
        log_operation_start!("login");
        self.state.send_modify(|state| state.set_loading(true));

        let result = performance::measure_async("login", self.try_login(email, password)).await;

        self.state.send_modify(|state| state.set_loading(false));

        match result {
            Ok(source) => {
                log_operation_success!("login", source = %source);
                Ok(())
            }
            Err(e) => {
                log_operation_error!("login", e);
                Err(e)
            }
        }
    }

    async fn try_login(&self, email: &str, password: &str) -> AuthResult<SessionSource> {
        let remote_error = match self.remote.sign_in(email, password).await {
            Ok(session) => {
                self.adopt_remote(session).await;
                return Ok(SessionSource::Remote);
            }
            Err(e) => e,
        };

        debug!(error = %remote_error, "Remote sign-in failed");
        if !self.fallback_login_enabled {
            return Err(AuthError::InvalidCredentials);
        }

        let identity = self
            .credentials
            .verify(email, password)
            .map(|entry| entry.identity())
            .ok_or(AuthError::InvalidCredentials)?;

        if let Err(e) = self.cache.save(&identity).await {
            // The session still starts; it just will not survive a restart
            e.log();
        }

        info!(
            user_id = %identity.id,
            role = %identity.role,
            source = %SessionSource::Fallback,
            "Identity resolved"
        );
        self.state
            .send_modify(|state| state.authenticate_fallback(identity));
        Ok(SessionSource::Fallback)
    }

    /// Create a remote account. Does not sign the new account in.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
        role: Option<Role>,
    ) -> AuthResult<()> {
        let _gate = self.gate.lock().await;
        log_operation_start!("register");
        self.state.send_modify(|state| state.set_loading(true));

        let mut metadata = Map::new();
        metadata.insert("name".to_string(), Value::from(display_name));
        metadata.insert(
            "role".to_string(),
            Value::from(role.unwrap_or_default().as_str()),
        );

        let result = self.remote.sign_up(email, password, metadata).await;
        self.state.send_modify(|state| state.set_loading(false));

        match result {
            Ok(()) => {
                log_operation_success!("register");
                Ok(())
            }
            Err(e) => {
                log_operation_error!("register", e);
                let message = match e {
                    AuthError::Rejected { message } => message,
                    other => other.to_string(),
                };
                Err(AuthError::RegistrationFailed { message })
            }
        }
    }

    /// End the current session.
    ///
    /// A fallback session is cleared before this returns. A remote session is
    /// cleared when the service's sign-out notification arrives.
    pub async fn logout(&self) {
        let _gate = self.gate.lock().await;

        let (authenticated, using_fallback) = {
            let state = self.state.borrow();
            (state.is_authenticated(), state.using_fallback())
        };

        if !authenticated {
            debug!("Logout without a session");
            return;
        }

        log_operation_start!("logout", using_fallback = using_fallback);
        if using_fallback {
            if let Err(e) = self.cache.clear().await {
                e.log();
            }
            self.state.send_modify(|state| state.clear());
            log_operation_success!("logout", source = %SessionSource::Fallback);
        } else if let Err(e) = self.remote.sign_out().await {
            log_operation_error!("logout", e);
        } else {
            log_operation_success!("logout", source = %SessionSource::Remote);
        }
    }

    /// Refresh the token of the current remote session.
    ///
    /// Nothing happens without a remote session. The new token arrives as a
    /// `TokenRefreshed` notification.
    pub async fn refresh_session(&self) -> AuthResult<()> {
        let _gate = self.gate.lock().await;

        let source = self.state.borrow().source();
        if source != Some(SessionSource::Remote) {
            debug!("No remote session to refresh");
            return Ok(());
        }

        self.remote.refresh_session().await.map(|_| ()).map_err(|e| {
            log_operation_error!("refresh_session", e);
            e
        })
    }

    /// Snapshot of the current state
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Change stream of the session state
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().identity().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.borrow().phase()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.state.borrow().role() == Some(role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    /// Wait for the first resolution and return the state it produced
    pub async fn wait_until_ready(&self) -> SessionState {
        let mut receiver = self.state.subscribe();
        let ready = receiver
            .wait_for(|state| state.phase() != SessionPhase::Initializing && !state.is_loading())
            .await
            .map(|state| state.clone());

        // The sender lives in `self`, so the channel cannot close here
        ready.unwrap_or_else(|_| self.state())
    }
}

impl Drop for SessionResolver {
    fn drop(&mut self) {
        let listener = self.listener.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = listener.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InMemoryIdentityService;

    #[tokio::test]
    async fn test_assembled_resolver_starts_initializing() {
        let remote = Arc::new(InMemoryIdentityService::new());
        let resolver = SessionResolver::builder(remote.clone()).assemble();

        assert_eq!(resolver.phase(), SessionPhase::Initializing);
        assert!(resolver.is_loading());
        assert_eq!(remote.calls().current_session, 0);
    }

    #[tokio::test]
    async fn test_build_runs_startup_resolution() {
        let remote = Arc::new(InMemoryIdentityService::new());
        remote.set_available(false);

        let resolver = SessionResolver::builder(remote.clone()).build().await;

        assert_eq!(resolver.phase(), SessionPhase::Unauthenticated);
        assert!(!resolver.is_loading());
        assert_eq!(remote.calls().current_session, 1);

        resolver.initialize().await;
        assert_eq!(remote.calls().current_session, 1);
    }
}
