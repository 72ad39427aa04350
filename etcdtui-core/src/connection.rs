use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{AppError, StoreOp};
use crate::store::KvStore;

/// Shared handle to the active store client.
///
/// The client is replaced wholesale on profile switch. Callers clone the
/// `Arc` out and issue calls without holding the lock, so a swap never
/// waits on an in-flight request.
#[derive(Clone, Default)]
pub struct ConnectionManager {
    client: Arc<RwLock<Option<Arc<dyn KvStore>>>>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager").finish_non_exhaustive()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify `store` is reachable, then make it the active client.
    /// On failure the previous client (if any) stays in place.
    pub async fn connect(&self, store: Arc<dyn KvStore>) -> Result<(), AppError> {
        store
            .health_check()
            .await
            .map_err(|e| AppError::store(StoreOp::Connect, e))?;
        let name = store.name();
        *self.client.write().await = Some(store);
        tracing::info!(backend = name, "connected");
        Ok(())
    }

    pub async fn disconnect(&self) {
        if self.client.write().await.take().is_some() {
            tracing::info!("disconnected");
        }
    }

    pub async fn client(&self) -> Result<Arc<dyn KvStore>, AppError> {
        self.client.read().await.clone().ok_or(AppError::NotConnected)
    }

    pub async fn is_connected(&self) -> bool {
        self.client.read().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::testing::FaultyStore;

    #[tokio::test]
    async fn test_not_connected() {
        let conn = ConnectionManager::new();
        assert!(!conn.is_connected().await);
        assert_eq!(conn.client().await.err(), Some(AppError::NotConnected));
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let conn = ConnectionManager::new();
        conn.connect(Arc::new(InMemoryStore::new())).await.unwrap();
        assert!(conn.is_connected().await);
        assert_eq!(conn.client().await.unwrap().name(), "memory");

        conn.disconnect().await;
        assert!(!conn.is_connected().await);
    }

    #[tokio::test]
    async fn test_failed_health_check_keeps_previous() {
        let conn = ConnectionManager::new();
        conn.connect(Arc::new(InMemoryStore::new())).await.unwrap();

        let broken = FaultyStore::new(InMemoryStore::new()).fail_health("connection refused");
        let err = conn.connect(Arc::new(broken)).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::StoreOperationFailed {
                op: StoreOp::Connect,
                ..
            }
        ));
        assert_eq!(conn.client().await.unwrap().name(), "memory");
    }
}
