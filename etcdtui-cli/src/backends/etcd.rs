#![cfg(feature = "etcd")]

use async_trait::async_trait;
use etcd_client::{
    Certificate, Client, ConnectOptions, EventType, GetOptions, Identity, KeyValue, TlsOptions,
    WatchOptions,
};
use tokio::sync::mpsc;

use etcdtui_core::config::{Profile, TlsProfile};
use etcdtui_core::error::StoreError;
use etcdtui_core::model::{ClusterStatus, Entry, LeaseId, MemberStatus, WatchEvent, WatchScope};
use etcdtui_core::store::KvStore;

const HEALTH_KEY: &str = "/health-check";

fn backend(context: &str, err: etcd_client::Error) -> StoreError {
    StoreError::Backend(format!("{}: {}", context, err))
}

fn to_entry(kv: &KeyValue) -> Entry {
    Entry::new(
        String::from_utf8_lossy(kv.key()).into_owned(),
        String::from_utf8_lossy(kv.value()).into_owned(),
    )
    .with_revisions(kv.create_revision(), kv.mod_revision(), kv.version())
    .with_lease(kv.lease())
}

async fn tls_options(tls: &TlsProfile) -> Result<TlsOptions, StoreError> {
    let read = |path: std::path::PathBuf| async move {
        tokio::fs::read(&path)
            .await
            .map_err(|e| StoreError::Backend(format!("failed to read {}: {}", path.display(), e)))
    };

    let mut options = TlsOptions::new();
    if let Some(ca) = &tls.ca_file {
        options = options.ca_certificate(Certificate::from_pem(read(ca.clone()).await?));
    }
    if let (Some(cert), Some(key)) = (&tls.cert_file, &tls.key_file) {
        let cert = read(cert.clone()).await?;
        let key = read(key.clone()).await?;
        options = options.identity(Identity::from_pem(cert, key));
    }
    if tls.insecure_skip_verify {
        tracing::warn!("insecure_skip_verify is not supported by the etcd client; verifying certificates");
    }
    Ok(options)
}

/// [`KvStore`] backed by an etcd v3 cluster.
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
}

impl EtcdStore {
    pub async fn connect(profile: &Profile) -> Result<Self, StoreError> {
        let mut options = ConnectOptions::new()
            .with_connect_timeout(profile.timeout())
            .with_timeout(profile.timeout());
        if let Some(user) = &profile.username {
            let password = profile.decode_password().unwrap_or_default();
            options = options.with_user(user.clone(), password);
        }
        if let Some(tls) = profile.tls.as_ref().filter(|t| t.enabled) {
            options = options.with_tls(tls_options(tls).await?);
        }

        tracing::info!(
            profile = %profile.name,
            endpoints = ?profile.endpoints,
            auth = profile.has_auth(),
            tls = profile.has_tls(),
            "connecting to etcd"
        );
        let client = Client::connect(profile.endpoints.clone(), Some(options))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self { client })
    }

    fn client(&self) -> Client {
        self.client.clone()
    }
}

#[async_trait]
impl KvStore for EtcdStore {
    fn name(&self) -> &'static str {
        "etcd"
    }

    async fn get(&self, key: &str) -> Result<Entry, StoreError> {
        let resp = self
            .client()
            .get(key, None)
            .await
            .map_err(|e| backend("failed to get key", e))?;
        resp.kvs()
            .first()
            .map(to_entry)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.client()
            .put(key, value, None)
            .await
            .map_err(|e| backend("failed to put key", e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.client()
            .delete(key, None)
            .await
            .map_err(|e| backend("failed to delete key", e))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<Entry>, StoreError> {
        let resp = self
            .client()
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(|e| backend("failed to list keys", e))?;
        let mut entries: Vec<Entry> = resp.kvs().iter().map(to_entry).collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    async fn count(&self, prefix: &str) -> Result<u64, StoreError> {
        let resp = self
            .client()
            .get(prefix, Some(GetOptions::new().with_prefix().with_count_only()))
            .await
            .map_err(|e| backend("failed to count keys", e))?;
        Ok(resp.count().max(0) as u64)
    }

    async fn status(&self) -> Result<ClusterStatus, StoreError> {
        let mut client = self.client();
        let leader_id = client
            .status()
            .await
            .map_err(|e| backend("failed to get status", e))?
            .leader();
        let list = client
            .member_list()
            .await
            .map_err(|e| backend("failed to get member list", e))?;

        let members: Vec<MemberStatus> = list
            .members()
            .iter()
            .map(|m| MemberStatus {
                id: m.id(),
                name: m.name().to_string(),
                endpoint: m.client_urls().first().cloned(),
                is_leader: m.id() == leader_id,
            })
            .collect();
        let leader = members.iter().find(|m| m.is_leader).map(|m| m.name.clone());
        Ok(ClusterStatus {
            leader,
            members,
            healthy: true,
        })
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.client()
            .get(HEALTH_KEY, Some(GetOptions::new().with_limit(1)))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn lease_ttl(&self, lease: LeaseId) -> Result<i64, StoreError> {
        let resp = self
            .client()
            .lease_time_to_live(lease, None)
            .await
            .map_err(|e| backend("failed to get lease info", e))?;
        Ok(resp.ttl())
    }

    async fn watch(
        &self,
        scope: &WatchScope,
        sink: mpsc::UnboundedSender<WatchEvent>,
    ) -> Result<(), StoreError> {
        let options = match scope {
            WatchScope::Key(_) => None,
            WatchScope::Prefix(_) => Some(WatchOptions::new().with_prefix()),
        };
        // The watcher cancels the server-side watch when dropped.
        let (_watcher, mut stream) = self
            .client()
            .watch(scope.target(), options)
            .await
            .map_err(|e| backend("failed to start watch", e))?;

        while let Some(resp) = stream
            .message()
            .await
            .map_err(|e| backend("watch stream failed", e))?
        {
            if resp.canceled() {
                return Err(StoreError::Backend(format!(
                    "watch canceled by server: {}",
                    resp.cancel_reason()
                )));
            }
            for event in resp.events() {
                let Some(kv) = event.kv() else { continue };
                let key = String::from_utf8_lossy(kv.key()).into_owned();
                let update = match event.event_type() {
                    EventType::Put => WatchEvent::put(
                        key,
                        String::from_utf8_lossy(kv.value()).into_owned(),
                        kv.mod_revision(),
                    ),
                    EventType::Delete => WatchEvent::delete(key, kv.mod_revision()),
                };
                if sink.send(update).is_err() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}
