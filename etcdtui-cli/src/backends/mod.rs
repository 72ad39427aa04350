mod demo;

#[cfg(feature = "etcd")]
mod etcd;

use std::sync::Arc;

use etcdtui_core::config::Profile;
use etcdtui_core::error::StoreError;
use etcdtui_core::store::KvStore;

pub use demo::{DEMO_PROFILE, demo_store};

#[cfg(feature = "etcd")]
pub use etcd::EtcdStore;

/// Open a client for `profile`.
#[cfg(feature = "etcd")]
pub async fn open_store(profile: &Profile) -> Result<Arc<dyn KvStore>, StoreError> {
    Ok(Arc::new(EtcdStore::connect(profile).await?))
}

#[cfg(not(feature = "etcd"))]
pub async fn open_store(profile: &Profile) -> Result<Arc<dyn KvStore>, StoreError> {
    tracing::warn!(profile = %profile.name, "etcd support not compiled in");
    Err(StoreError::Unavailable(
        "built without etcd support; rebuild with --features etcd or run with --demo".to_string(),
    ))
}
