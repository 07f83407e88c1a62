//! Session state owned by the resolver
//!
//! `SessionState` can only be changed through the crate-private transition
//! methods below, each of which keeps the invariants intact:
//! authentication is derived from the identity, and a fallback identity never
//! carries a remote session handle.

use academia_core::{Identity, RemoteSession, Role};

/// Which authority produced the current identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionSource {
    Remote,
    Fallback,
}

impl std::fmt::Display for SessionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionSource::Remote => write!(f, "remote"),
            SessionSource::Fallback => write!(f, "fallback"),
        }
    }
}

/// Resolver state machine position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// First resolution has not completed yet
    Initializing,
    Authenticated(SessionSource),
    Unauthenticated,
}

/// Snapshot of the caller's session as seen by consumers
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    identity: Option<Identity>,
    raw_session: Option<RemoteSession>,
    is_loading: bool,
    using_fallback: bool,
    resolved: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::initial()
    }
}

impl SessionState {
    /// State at process start: loading, nobody signed in
    pub fn initial() -> Self {
        Self {
            identity: None,
            raw_session: None,
            is_loading: true,
            using_fallback: false,
            resolved: false,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn raw_session(&self) -> Option<&RemoteSession> {
        self.raw_session.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn using_fallback(&self) -> bool {
        self.using_fallback
    }

    pub fn role(&self) -> Option<Role> {
        self.identity.as_ref().map(|identity| identity.role)
    }

    pub fn source(&self) -> Option<SessionSource> {
        self.identity.as_ref().map(|_| {
            if self.using_fallback {
                SessionSource::Fallback
            } else {
                SessionSource::Remote
            }
        })
    }

    pub fn phase(&self) -> SessionPhase {
        match self.source() {
            Some(source) => SessionPhase::Authenticated(source),
            None if !self.resolved => SessionPhase::Initializing,
            None => SessionPhase::Unauthenticated,
        }
    }

    /// Whether `session` is the handle this state already holds
    pub(crate) fn holds_session(&self, session: &RemoteSession) -> bool {
        self.raw_session
            .as_ref()
            .map(|current| current.same_as(session))
            .unwrap_or(false)
    }

    pub(crate) fn authenticate_remote(&mut self, identity: Identity, session: RemoteSession) {
        self.identity = Some(identity);
        self.raw_session = Some(session);
        self.using_fallback = false;
    }

    pub(crate) fn authenticate_fallback(&mut self, identity: Identity) {
        self.identity = Some(identity);
        self.raw_session = None;
        self.using_fallback = true;
    }

    /// Swap the token of the current remote session, keeping the identity
    pub(crate) fn replace_session(&mut self, session: RemoteSession) {
        if !self.using_fallback && self.identity.is_some() {
            self.raw_session = Some(session);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.identity = None;
        self.raw_session = None;
        self.using_fallback = false;
    }

    pub(crate) fn set_loading(&mut self, loading: bool) {
        self.is_loading = loading;
    }

    /// Mark the first resolution as done; returns whether anything changed
    pub(crate) fn finish_resolution(&mut self) -> bool {
        let changed = !self.resolved || self.is_loading;
        self.resolved = true;
        self.is_loading = false;
        changed
    }
}
