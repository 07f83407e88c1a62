//! File-backed fallback store
//!
//! One JSON document per key under a single directory.

use academia_core::{async_trait, AuthError, AuthResult, ErrorContext, FallbackStore};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Durable fallback store on the local filesystem
#[derive(Debug, Clone)]
pub struct FileFallbackStore {
    storage_dir: PathBuf,
}

impl FileFallbackStore {
    /// Create the store, creating `storage_dir` if it does not exist
    pub fn new<P: AsRef<Path>>(storage_dir: P) -> AuthResult<Self> {
        let storage_dir = storage_dir.as_ref().to_path_buf();

        std::fs::create_dir_all(&storage_dir).map_err(|e| AuthError::Storage {
            message: format!(
                "Failed to create fallback storage directory {}: {}",
                storage_dir.display(),
                e
            ),
            source: Some(Box::new(e)),
            context: ErrorContext::new("fallback_store")
                .with_operation("create_dir")
                .with_suggestion("Check that the parent directory is writable"),
        })?;

        info!("Fallback store initialized at: {}", storage_dir.display());

        Ok(Self { storage_dir })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    fn entry_path(&self, key: &str) -> AuthResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(AuthError::storage(
                format!("Invalid fallback store key: {:?}", key),
                "entry_path",
            ));
        }
        Ok(self.storage_dir.join(format!("{}.json", key)))
    }
}

fn io_error(e: std::io::Error, operation: &str, path: &Path) -> AuthError {
    AuthError::Storage {
        message: format!("Failed to {} {}: {}", operation, path.display(), e),
        source: Some(Box::new(e)),
        context: ErrorContext::new("fallback_store").with_operation(operation),
    }
}

#[async_trait]
impl FallbackStore for FileFallbackStore {
    async fn get(&self, key: &str) -> AuthResult<Option<String>> {
        let path = self.entry_path(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(e, "read", &path)),
        }
    }

    async fn set(&self, key: &str, blob: &str) -> AuthResult<()> {
        let path = self.entry_path(key)?;
        let tmp_path = path.with_extension("json.tmp");

        // Write-then-rename so a crash never leaves a truncated entry
        tokio::fs::write(&tmp_path, blob)
            .await
            .map_err(|e| io_error(e, "write", &tmp_path))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| io_error(e, "rename", &path))?;

        debug!("Saved fallback entry {} to {}", key, path.display());
        Ok(())
    }

    async fn remove(&self, key: &str) -> AuthResult<()> {
        let path = self.entry_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted fallback entry: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(e, "remove", &path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileFallbackStore::new(dir.path().join("nested")).unwrap();

        assert_eq!(store.get("user").await.unwrap(), None);

        store.set("user", r#"{"id":"admin1"}"#).await.unwrap();
        assert_eq!(
            store.get("user").await.unwrap().as_deref(),
            Some(r#"{"id":"admin1"}"#)
        );
        assert!(store.storage_dir().join("user.json").exists());
        assert!(!store.storage_dir().join("user.json.tmp").exists());

        store.remove("user").await.unwrap();
        assert_eq!(store.get("user").await.unwrap(), None);

        // Removing a missing entry is fine
        store.remove("user").await.unwrap();
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        FileFallbackStore::new(dir.path())
            .unwrap()
            .set("user", "cached")
            .await
            .unwrap();

        let reopened = FileFallbackStore::new(dir.path()).unwrap();
        assert_eq!(reopened.get("user").await.unwrap().as_deref(), Some("cached"));
    }

    #[tokio::test]
    async fn test_path_traversal_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileFallbackStore::new(dir.path()).unwrap();

        assert!(matches!(
            store.set("../escape", "x").await,
            Err(AuthError::Storage { .. })
        ));
        assert!(store.get("").await.is_err());
    }
}
