//! Shared fixtures for resolver integration tests

#![allow(dead_code)]

use academia_auth::{
    InMemoryIdentityService, MemoryFallbackStore, MemoryRecordStore, SessionResolver,
    SessionState,
};
use academia_core::{AuthConfig, FallbackStore, Identity, Role};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Everything a resolver under test talks to.
///
/// Collaborators can be seeded before [`Harness::start`] constructs the
/// resolver, which runs startup resolution on construction.
pub struct Harness {
    pub remote: Arc<InMemoryIdentityService>,
    pub records: MemoryRecordStore,
    pub store: MemoryFallbackStore,
    config: AuthConfig,
    resolver: OnceLock<Arc<SessionResolver>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(AuthConfig::default())
    }

    pub fn with_config(config: AuthConfig) -> Self {
        Self {
            remote: Arc::new(InMemoryIdentityService::new()),
            records: MemoryRecordStore::new(),
            store: MemoryFallbackStore::new(),
            config,
            resolver: OnceLock::new(),
        }
    }

    /// Construct the resolver over the seeded collaborators
    pub async fn start(&self) -> &Arc<SessionResolver> {
        let resolver = SessionResolver::from_config(
            &self.config,
            self.remote.clone(),
            Arc::new(self.records.clone()),
            Arc::new(self.store.clone()),
        )
        .await;
        assert!(self.resolver.set(resolver).is_ok(), "harness started twice");
        self.resolver()
    }

    pub fn resolver(&self) -> &Arc<SessionResolver> {
        self.resolver.get().expect("harness not started")
    }

    /// Wait until the resolver state satisfies `predicate`
    pub async fn settle<F>(&self, predicate: F) -> SessionState
    where
        F: FnMut(&SessionState) -> bool,
    {
        let mut receiver = self.resolver().subscribe();
        let state = tokio::time::timeout(Duration::from_secs(2), receiver.wait_for(predicate))
            .await
            .expect("resolver did not reach the expected state")
            .expect("state channel closed");
        state.clone()
    }

    pub async fn cache_identity(&self, identity: &Identity) {
        let blob = serde_json::to_string(identity).unwrap();
        self.store.set("user", &blob).await.unwrap();
    }

    pub async fn cached_blob(&self) -> Option<String> {
        self.store.get("user").await.unwrap()
    }
}

pub fn cached_admin() -> Identity {
    Identity {
        id: "admin1".to_string(),
        email: "admin@academia.com".to_string(),
        display_name: "Admin User".to_string(),
        role: Role::Admin,
        avatar_url: Some("/assets/admin-avatar.jpg".to_string()),
    }
}

/// Assert the identity/authentication invariants on a snapshot
pub fn assert_consistent(state: &SessionState) {
    assert_eq!(state.identity().is_some(), state.is_authenticated());
    if state.using_fallback() {
        assert!(state.raw_session().is_none());
    }
}
