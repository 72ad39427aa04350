use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::model::{ClusterStatus, Entry, LeaseId, WatchEvent, WatchScope};

mod memory;

pub use memory::InMemoryStore;

/// Remote key-value store the client talks to.
///
/// Implementations:
/// - `InMemoryStore`: seeded local store for demos and tests
/// - `EtcdStore` (cli, `etcd` feature): a real etcd v3 cluster
///
/// Every call is independent; an implementation holds no session state
/// beyond its connection.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Short backend name for logs and the status line.
    fn name(&self) -> &'static str;

    /// Fetch one key. Missing keys yield `StoreError::NotFound`.
    async fn get(&self, key: &str) -> Result<Entry, StoreError>;

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete one key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// All entries whose key starts with `prefix`, ordered by key.
    async fn list(&self, prefix: &str) -> Result<Vec<Entry>, StoreError>;

    /// Number of keys under `prefix`.
    async fn count(&self, prefix: &str) -> Result<u64, StoreError> {
        Ok(self.list(prefix).await?.len() as u64)
    }

    async fn status(&self) -> Result<ClusterStatus, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;

    /// Remaining time-to-live of a lease, in seconds.
    async fn lease_ttl(&self, lease: LeaseId) -> Result<i64, StoreError>;

    /// Stream changes matching `scope` into `sink`.
    ///
    /// Runs until the subscription fails, the receiving side of `sink` is
    /// dropped, or the future itself is dropped. Returning `Ok(())` means
    /// the stream closed without an error.
    async fn watch(
        &self,
        scope: &WatchScope,
        sink: mpsc::UnboundedSender<WatchEvent>,
    ) -> Result<(), StoreError>;
}
