//! Local Fallback Store
//!
//! Keeps one cached [`Identity`] under a fixed key. The cache is written by a
//! successful fallback login, read at startup only when the remote service
//! reports no session, and cleared on fallback logout or as soon as a remote
//! session becomes authoritative.

pub mod file;
pub mod memory;

pub use file::FileFallbackStore;
pub use memory::MemoryFallbackStore;

use academia_core::{AuthResult, FallbackStore, Identity};
use std::sync::Arc;
use tracing::{debug, warn};

/// Key the cached identity is stored under unless configured otherwise
pub const DEFAULT_STORAGE_KEY: &str = "user";

/// Typed view over a [`FallbackStore`] holding a single identity blob
#[derive(Clone)]
pub struct FallbackIdentityCache {
    store: Arc<dyn FallbackStore>,
    key: String,
}

impl FallbackIdentityCache {
    pub fn new(store: Arc<dyn FallbackStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Cached identity, if one is stored and decodes.
    ///
    /// Read failures are logged and reported as absent; an undecodable blob is
    /// removed so it cannot fail again on the next start.
    pub async fn load(&self) -> Option<Identity> {
        let blob = match self.store.get(&self.key).await {
            Ok(Some(blob)) => blob,
            Ok(None) => return None,
            Err(e) => {
                e.log();
                return None;
            }
        };

        match serde_json::from_str::<Identity>(&blob) {
            Ok(identity) => {
                debug!(user_id = %identity.id, "Loaded cached fallback identity");
                Some(identity)
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Discarding undecodable fallback identity");
                if let Err(e) = self.store.remove(&self.key).await {
                    e.log();
                }
                None
            }
        }
    }

    pub async fn save(&self, identity: &Identity) -> AuthResult<()> {
        let blob = serde_json::to_string(identity)?;
        self.store.set(&self.key, &blob).await?;
        debug!(user_id = %identity.id, "Cached fallback identity");
        Ok(())
    }

    pub async fn clear(&self) -> AuthResult<()> {
        self.store.remove(&self.key).await
    }
}
