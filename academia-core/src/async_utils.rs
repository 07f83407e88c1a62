//! Async utilities

use crate::error::{AuthError, AuthResult};
use tokio::time::{timeout, Duration};
use tracing::warn;

/// Bound an outbound call; an elapsed deadline counts as the service being unavailable
pub async fn with_timeout<F, T>(future: F, timeout_ms: u64, operation_name: &str) -> AuthResult<T>
where
    F: std::future::Future<Output = AuthResult<T>>,
{
    match timeout(Duration::from_millis(timeout_ms), future).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                operation = operation_name,
                timeout_ms = timeout_ms,
                "Operation timed out"
            );
            Err(AuthError::unavailable(format!(
                "{} timed out after {}ms",
                operation_name, timeout_ms
            )))
        }
    }
}
