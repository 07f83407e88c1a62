//! Collaborator contracts
//!
//! The session layer never talks to a concrete backend; it is handed
//! implementations of these traits.

use crate::error::AuthResult;
use crate::types::{RemoteSession, SessionEvent};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// External authority for credential verification and session lifetime
#[async_trait]
pub trait RemoteIdentityService: Send + Sync {
    /// Session the service currently holds, if any
    async fn current_session(&self) -> AuthResult<Option<RemoteSession>>;

    /// Register for session-change notifications.
    ///
    /// Events sent after this call returns are delivered to the receiver.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    /// Authenticate an email/password pair and start a session
    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<RemoteSession>;

    /// Create an account; does not start a session
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> AuthResult<()>;

    /// End the current session
    async fn sign_out(&self) -> AuthResult<()>;

    /// Exchange the refresh token of the current session for a new one
    async fn refresh_session(&self) -> AuthResult<RemoteSession>;
}

/// Generic record store the rest of the application queries
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch the record of `table` whose `id` column equals `id`
    async fn select_by_id(&self, table: &str, id: &str) -> AuthResult<Option<serde_json::Value>>;
}

/// Durable key/value storage on the caller's device
#[async_trait]
pub trait FallbackStore: Send + Sync {
    async fn get(&self, key: &str) -> AuthResult<Option<String>>;

    async fn set(&self, key: &str, blob: &str) -> AuthResult<()>;

    async fn remove(&self, key: &str) -> AuthResult<()>;
}
