use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::time::Instant;

use super::KvStore;
use crate::error::StoreError;
use crate::model::{ClusterStatus, Entry, LeaseId, MemberStatus, WatchEvent, WatchScope};

const EVENT_BUFFER: usize = 256;

#[derive(Debug)]
struct Lease {
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<String, Entry>,
    leases: HashMap<LeaseId, Lease>,
    revision: i64,
    next_lease: LeaseId,
}

impl Inner {
    fn next_revision(&mut self) -> i64 {
        self.revision += 1;
        self.revision
    }

    /// Drop leases that ran out, along with every key attached to them.
    fn expire(&mut self, now: Instant) -> Vec<WatchEvent> {
        let expired: Vec<LeaseId> = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.expires_at <= now)
            .map(|(id, _)| *id)
            .collect();
        if expired.is_empty() {
            return Vec::new();
        }

        let mut events = Vec::new();
        for id in expired {
            self.leases.remove(&id);
            let keys: Vec<String> = self
                .entries
                .values()
                .filter(|e| e.lease == id)
                .map(|e| e.key.clone())
                .collect();
            for key in keys {
                self.entries.remove(&key);
                let rev = self.next_revision();
                events.push(WatchEvent::delete(key, rev));
            }
        }
        events
    }
}

/// Store held entirely in process memory.
///
/// Revisions, versions and leases behave like etcd's closely enough for the
/// browser: every mutation bumps the store revision, and a key attached to
/// an expired lease disappears the next time the store is touched.
#[derive(Debug)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    events: broadcast::Sender<WatchEvent>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Mutex::new(Inner::default()),
            events,
        }
    }

    /// Build a store pre-populated with `entries`, in order.
    pub async fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        {
            let mut inner = store.inner.lock().await;
            for (key, value) in entries {
                let key = key.into();
                let value = value.into();
                store_put(&mut inner, &key, &value, 0);
            }
        }
        store
    }

    /// Write `key` attached to a fresh lease that expires after `ttl`.
    pub async fn put_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> LeaseId {
        let mut inner = self.inner.lock().await;
        inner.next_lease += 1;
        let id = 0x694d_0000 + inner.next_lease;
        inner.leases.insert(
            id,
            Lease {
                expires_at: Instant::now() + ttl,
            },
        );
        let event = store_put(&mut inner, key, value, id);
        drop(inner);
        self.publish(vec![event]);
        id
    }

    pub async fn revision(&self) -> i64 {
        self.inner.lock().await.revision
    }

    fn publish(&self, events: Vec<WatchEvent>) {
        for event in events {
            // No receivers is fine; nobody is watching.
            let _ = self.events.send(event);
        }
    }

    async fn lock_live(&self) -> tokio::sync::MutexGuard<'_, Inner> {
        let mut inner = self.inner.lock().await;
        let expired = inner.expire(Instant::now());
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "expired leased keys");
            self.publish(expired);
        }
        inner
    }
}

fn store_put(inner: &mut Inner, key: &str, value: &str, lease: LeaseId) -> WatchEvent {
    let rev = inner.next_revision();
    let entry = match inner.entries.get(key) {
        Some(prev) => Entry::new(key, value).with_revisions(prev.create_revision, rev, prev.version + 1),
        None => Entry::new(key, value).with_revisions(rev, rev, 1),
    }
    .with_lease(lease);
    inner.entries.insert(key.to_string(), entry);
    WatchEvent::put(key, value, rev)
}

#[async_trait]
impl KvStore for InMemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Entry, StoreError> {
        let inner = self.lock_live().await;
        inner
            .entries
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.lock_live().await;
        let event = store_put(&mut inner, key, value, 0);
        drop(inner);
        self.publish(vec![event]);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.lock_live().await;
        if inner.entries.remove(key).is_none() {
            return Ok(());
        }
        let rev = inner.next_revision();
        drop(inner);
        self.publish(vec![WatchEvent::delete(key, rev)]);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<Entry>, StoreError> {
        let inner = self.lock_live().await;
        Ok(inner
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn status(&self) -> Result<ClusterStatus, StoreError> {
        Ok(ClusterStatus {
            leader: Some("local".to_string()),
            members: vec![MemberStatus {
                id: 1,
                name: "local".to_string(),
                endpoint: None,
                is_leader: true,
            }],
            healthy: true,
        })
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn lease_ttl(&self, lease: LeaseId) -> Result<i64, StoreError> {
        let inner = self.lock_live().await;
        let remaining = inner
            .leases
            .get(&lease)
            .map(|l| l.expires_at.saturating_duration_since(Instant::now()))
            .ok_or_else(|| StoreError::NotFound(format!("lease {:x}", lease)))?;
        Ok(remaining.as_secs() as i64)
    }

    async fn watch(
        &self,
        scope: &WatchScope,
        sink: mpsc::UnboundedSender<WatchEvent>,
    ) -> Result<(), StoreError> {
        let mut rx = self.events.subscribe();
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if !scope.matches(&event.key) {
                        continue;
                    }
                    if sink.send(event).is_err() {
                        return Ok(());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(%scope, skipped, "watch fell behind, events skipped");
                    return Err(StoreError::Unavailable(format!(
                        "watch fell behind, {} events skipped",
                        skipped
                    )));
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_revisions() {
        let store = InMemoryStore::new();
        store.put("/a", "1").await.unwrap();
        store.put("/a", "2").await.unwrap();

        let entry = store.get("/a").await.unwrap();
        assert_eq!(entry.value, "2");
        assert_eq!(entry.create_revision, 1);
        assert_eq!(entry.mod_revision, 2);
        assert_eq!(entry.version, 2);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = InMemoryStore::new();
        assert_eq!(
            store.get("/nope").await,
            Err(StoreError::NotFound("/nope".to_string()))
        );
    }

    #[tokio::test]
    async fn test_list_prefix_and_count() {
        let store = InMemoryStore::with_entries([("/a/x", "1"), ("/a/y", "2"), ("/b", "3")]).await;

        let keys: Vec<String> = store
            .list("/a/")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, vec!["/a/x", "/a/y"]);
        assert_eq!(store.count("/").await.unwrap(), 3);
        assert_eq!(store.count("/c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let store = InMemoryStore::new();
        assert!(store.delete("/ghost").await.is_ok());
        assert_eq!(store.revision().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_expiry() {
        let store = InMemoryStore::new();
        let lease = store
            .put_with_ttl("/locks/a", "me", Duration::from_secs(30))
            .await;

        let entry = store.get("/locks/a").await.unwrap();
        assert_eq!(entry.lease, lease);
        assert_eq!(store.lease_ttl(lease).await.unwrap(), 30);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(store.get("/locks/a").await.is_err());
        assert!(store.lease_ttl(lease).await.is_err());
    }

    #[tokio::test]
    async fn test_watch_lag_ends_with_error() {
        let store = InMemoryStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scope = WatchScope::Prefix("/".to_string());
        let watch = store.watch(&scope, tx);
        tokio::pin!(watch);

        // Poll once so the watch subscribes, then let it fall behind.
        tokio::select! {
            biased;
            _ = &mut watch => panic!("watch ended before any event"),
            _ = std::future::ready(()) => {}
        }
        for i in 0..EVENT_BUFFER + 10 {
            store.put(&format!("/k{}", i), "v").await.unwrap();
        }

        let err = watch.await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(ref reason) if reason.contains("10 events skipped")));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_watch_filters_by_scope() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let watcher = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .watch(&WatchScope::Key("/a".to_string()), tx)
                    .await
            })
        };
        tokio::task::yield_now().await;
        // Subscription happens on the first poll of the watch future.
        while store.events.receiver_count() == 0 {
            tokio::task::yield_now().await;
        }

        store.put("/b", "x").await.unwrap();
        store.put("/a", "1").await.unwrap();
        store.delete("/a").await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first, WatchEvent::put("/a", "1", 2));
        let second = rx.recv().await.unwrap();
        assert_eq!(second, WatchEvent::delete("/a", 3));

        drop(rx);
        store.put("/a", "2").await.unwrap();
        assert_eq!(watcher.await.unwrap(), Ok(()));
    }
}
