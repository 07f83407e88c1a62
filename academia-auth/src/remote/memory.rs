//! In-process identity authority
//!
//! Behaves like the hosted service closely enough for the resolver: sign-in
//! emits `SignedIn`, sign-out emits `SignedOut`, refresh emits
//! `TokenRefreshed`, and sign-up never starts a session. Availability can be
//! switched off to simulate an outage.

use super::EVENT_CHANNEL_CAPACITY;
use academia_core::{
    async_trait, AuthError, AuthResult, RemoteIdentityService, RemoteSession, RemoteUser,
    SessionEvent,
};
use chrono::{Duration, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

const SESSION_LIFETIME_SECS: i64 = 3600;
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone)]
struct Account {
    user: RemoteUser,
    password: String,
}

#[derive(Debug, Default)]
struct Inner {
    /// Keyed by lowercased email
    accounts: HashMap<String, Account>,
    current: Option<RemoteSession>,
}

/// Number of calls received per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceCalls {
    pub current_session: usize,
    pub sign_in: usize,
    pub sign_up: usize,
    pub sign_out: usize,
    pub refresh_session: usize,
}

#[derive(Debug, Default)]
struct CallCounters {
    current_session: AtomicUsize,
    sign_in: AtomicUsize,
    sign_up: AtomicUsize,
    sign_out: AtomicUsize,
    refresh_session: AtomicUsize,
}

pub struct InMemoryIdentityService {
    inner: Mutex<Inner>,
    events: broadcast::Sender<SessionEvent>,
    available: AtomicBool,
    calls: CallCounters,
}

impl Default for InMemoryIdentityService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryIdentityService {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(Inner::default()),
            events,
            available: AtomicBool::new(true),
            calls: CallCounters::default(),
        }
    }

    fn with_inner<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    fn ensure_available(&self) -> AuthResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AuthError::unavailable("identity service is offline"))
        }
    }

    fn issue_session(user: RemoteUser) -> RemoteSession {
        RemoteSession {
            access_token: uuid::Uuid::new_v4().to_string(),
            refresh_token: Some(uuid::Uuid::new_v4().to_string()),
            expires_at: Some(Utc::now() + Duration::seconds(SESSION_LIFETIME_SECS)),
            user,
        }
    }

    fn emit(&self, event: SessionEvent) {
        debug!(kind = ?event.kind, "Emitting session event");
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Simulate an outage (`false`) or recovery (`true`)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Register an account directly, bypassing sign-up rules
    pub fn add_account(
        &self,
        email: &str,
        password: &str,
        metadata: Map<String, Value>,
    ) -> RemoteUser {
        let user = RemoteUser {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            metadata,
        };
        self.with_inner(|inner| {
            inner.accounts.insert(
                email.to_lowercase(),
                Account {
                    user: user.clone(),
                    password: password.to_string(),
                },
            );
        });
        user
    }

    /// Install a current session without notifying subscribers, as if it had
    /// been restored from a previous run
    pub fn seed_session(&self, user: RemoteUser) -> RemoteSession {
        let session = Self::issue_session(user);
        self.with_inner(|inner| inner.current = Some(session.clone()));
        session
    }

    /// Push a notification to subscribers without touching the stored session
    pub fn notify(&self, event: SessionEvent) {
        self.emit(event);
    }

    pub fn has_account(&self, email: &str) -> bool {
        self.with_inner(|inner| inner.accounts.contains_key(&email.to_lowercase()))
    }

    pub fn account(&self, email: &str) -> Option<RemoteUser> {
        self.with_inner(|inner| {
            inner
                .accounts
                .get(&email.to_lowercase())
                .map(|account| account.user.clone())
        })
    }

    pub fn calls(&self) -> ServiceCalls {
        ServiceCalls {
            current_session: self.calls.current_session.load(Ordering::SeqCst),
            sign_in: self.calls.sign_in.load(Ordering::SeqCst),
            sign_up: self.calls.sign_up.load(Ordering::SeqCst),
            sign_out: self.calls.sign_out.load(Ordering::SeqCst),
            refresh_session: self.calls.refresh_session.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl RemoteIdentityService for InMemoryIdentityService {
    async fn current_session(&self) -> AuthResult<Option<RemoteSession>> {
        self.calls.current_session.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;
        Ok(self.with_inner(|inner| inner.current.clone()))
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<RemoteSession> {
        self.calls.sign_in.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;

        let session = self.with_inner(|inner| {
            let account = inner
                .accounts
                .get(&email.trim().to_lowercase())
                .filter(|account| account.password == password)
                .ok_or_else(|| AuthError::rejected("Invalid login credentials"))?;
            let session = Self::issue_session(account.user.clone());
            inner.current = Some(session.clone());
            Ok::<_, AuthError>(session)
        })?;

        self.emit(SessionEvent::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Map<String, Value>,
    ) -> AuthResult<()> {
        self.calls.sign_up.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;

        if !email.contains('@') {
            return Err(AuthError::rejected("Unable to validate email address: invalid format"));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::rejected(format!(
                "Password should be at least {} characters.",
                MIN_PASSWORD_LEN
            )));
        }
        if self.has_account(email) {
            return Err(AuthError::rejected("User already registered"));
        }

        self.add_account(email, password, metadata);
        Ok(())
    }

    async fn sign_out(&self) -> AuthResult<()> {
        self.calls.sign_out.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;

        self.with_inner(|inner| inner.current = None);
        self.emit(SessionEvent::signed_out());
        Ok(())
    }

    async fn refresh_session(&self) -> AuthResult<RemoteSession> {
        self.calls.refresh_session.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;

        let session = self.with_inner(|inner| {
            let user = inner
                .current
                .as_ref()
                .map(|current| current.user.clone())
                .ok_or_else(|| AuthError::rejected("No active session"))?;
            let session = Self::issue_session(user);
            inner.current = Some(session.clone());
            Ok::<_, AuthError>(session)
        })?;

        self.emit(SessionEvent::token_refreshed(session.clone()));
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use academia_core::SessionEventKind;

    #[tokio::test]
    async fn test_sign_in_emits_event_and_sets_current() {
        let service = InMemoryIdentityService::new();
        service.add_account("ana@gym.com", "secret1", Map::new());
        let mut events = service.subscribe();

        let session = service.sign_in("ANA@gym.com", "secret1").await.unwrap();
        assert_eq!(session.user.email, "ana@gym.com");
        assert_eq!(service.current_session().await.unwrap(), Some(session.clone()));

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, SessionEventKind::SignedIn);
        assert_eq!(event.session, Some(session));
    }

    #[tokio::test]
    async fn test_sign_in_wrong_password_rejected() {
        let service = InMemoryIdentityService::new();
        service.add_account("ana@gym.com", "secret1", Map::new());

        let result = service.sign_in("ana@gym.com", "nope").await;
        assert!(matches!(result, Err(AuthError::Rejected { .. })));
        assert_eq!(service.current_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_offline_service_is_unavailable() {
        let service = InMemoryIdentityService::new();
        service.set_available(false);

        assert!(service.current_session().await.unwrap_err().is_recoverable());
        assert!(service.sign_in("a@b.c", "x").await.unwrap_err().is_recoverable());
        assert_eq!(service.calls().sign_in, 1);
    }

    #[tokio::test]
    async fn test_sign_up_rules() {
        let service = InMemoryIdentityService::new();

        service
            .sign_up("new@gym.com", "longenough", Map::new())
            .await
            .unwrap();
        assert!(service.has_account("new@gym.com"));
        // Registration does not sign in
        assert_eq!(service.current_session().await.unwrap(), None);

        let duplicate = service.sign_up("new@gym.com", "longenough", Map::new()).await;
        assert_eq!(duplicate.unwrap_err().to_string(), "Request rejected: User already registered");

        assert!(service.sign_up("short@gym.com", "123", Map::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_refresh_requires_session() {
        let service = InMemoryIdentityService::new();
        assert!(service.refresh_session().await.is_err());

        let user = RemoteUser::new("u1", "ana@gym.com");
        let seeded = service.seed_session(user);
        let refreshed = service.refresh_session().await.unwrap();
        assert_ne!(refreshed.access_token, seeded.access_token);
        assert_eq!(refreshed.user.id, "u1");
    }
}
