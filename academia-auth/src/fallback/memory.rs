use academia_core::{async_trait, AuthResult, FallbackStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory fallback store for tests and ephemeral sessions
#[derive(Clone, Debug, Default)]
pub struct MemoryFallbackStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryFallbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl FallbackStore for MemoryFallbackStore {
    async fn get(&self, key: &str) -> AuthResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, blob: &str) -> AuthResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), blob.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> AuthResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
