//! Store wrapper for exercising failure paths in tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{StoreError, StoreOp};
use crate::model::{ClusterStatus, Entry, LeaseId, WatchEvent, WatchScope};
use crate::store::{InMemoryStore, KvStore};

const OPS: [StoreOp; 8] = [
    StoreOp::Get,
    StoreOp::Put,
    StoreOp::Delete,
    StoreOp::List,
    StoreOp::Watch,
    StoreOp::Count,
    StoreOp::Status,
    StoreOp::Connect,
];

fn slot(op: StoreOp) -> usize {
    OPS.iter().position(|o| *o == op).unwrap_or(0)
}

/// Delegates to an `InMemoryStore`, failing chosen operations and counting
/// every call. Health checks count as `Connect`.
pub struct FaultyStore {
    inner: InMemoryStore,
    failures: Mutex<Vec<(StoreOp, String)>>,
    calls: [AtomicUsize; 8],
}

impl FaultyStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            failures: Mutex::new(Vec::new()),
            calls: Default::default(),
        }
    }

    pub fn fail(self, op: StoreOp, reason: &str) -> Self {
        self.set_failure(op, Some(reason));
        self
    }

    pub fn fail_health(self, reason: &str) -> Self {
        self.fail(StoreOp::Connect, reason)
    }

    pub fn set_failure(&self, op: StoreOp, reason: Option<&str>) {
        let mut failures = self.failures.lock().unwrap();
        failures.retain(|(o, _)| *o != op);
        if let Some(reason) = reason {
            failures.push((op, reason.to_string()));
        }
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    pub fn calls(&self, op: StoreOp) -> usize {
        self.calls[slot(op)].load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|c| c.load(Ordering::SeqCst)).sum()
    }

    fn check(&self, op: StoreOp) -> Result<(), StoreError> {
        self.calls[slot(op)].fetch_add(1, Ordering::SeqCst);
        let failures = self.failures.lock().unwrap();
        match failures.iter().find(|(o, _)| *o == op) {
            Some((_, reason)) => Err(StoreError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl KvStore for FaultyStore {
    fn name(&self) -> &'static str {
        "faulty"
    }

    async fn get(&self, key: &str) -> Result<Entry, StoreError> {
        self.check(StoreOp::Get)?;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check(StoreOp::Put)?;
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check(StoreOp::Delete)?;
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<Entry>, StoreError> {
        self.check(StoreOp::List)?;
        self.inner.list(prefix).await
    }

    async fn count(&self, prefix: &str) -> Result<u64, StoreError> {
        self.check(StoreOp::Count)?;
        self.inner.count(prefix).await
    }

    async fn status(&self) -> Result<ClusterStatus, StoreError> {
        self.check(StoreOp::Status)?;
        self.inner.status().await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.check(StoreOp::Connect)?;
        self.inner.health_check().await
    }

    async fn lease_ttl(&self, lease: LeaseId) -> Result<i64, StoreError> {
        self.check(StoreOp::Get)?;
        self.inner.lease_ttl(lease).await
    }

    async fn watch(
        &self,
        scope: &WatchScope,
        sink: mpsc::UnboundedSender<WatchEvent>,
    ) -> Result<(), StoreError> {
        self.check(StoreOp::Watch)?;
        self.inner.watch(scope, sink).await
    }
}
