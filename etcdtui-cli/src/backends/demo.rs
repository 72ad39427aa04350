use std::sync::Arc;
use std::time::Duration;

use etcdtui_core::store::{InMemoryStore, KvStore};

pub const DEMO_PROFILE: &str = "demo";

const SEED: &[(&str, &str)] = &[
    (
        "/services/api/v1/config",
        "{\n  \"port\": 8080,\n  \"timeout\": \"30s\",\n  \"retries\": 3\n}",
    ),
    ("/services/api/v1/endpoints", "10.0.0.11:8080,10.0.0.12:8080"),
    ("/services/auth/jwt-secret", "change-me"),
    ("/services/auth/issuer", "https://auth.example.internal"),
    ("/config/database-url", "postgres://app@db.internal:5432/app"),
    ("/config/redis-url", "redis://cache.internal:6379/0"),
    ("/config/feature-flags/new-ui", "true"),
];

/// In-process store seeded with a small service registry, used by `--demo`.
pub async fn demo_store() -> Arc<dyn KvStore> {
    let store = InMemoryStore::with_entries(SEED.iter().copied()).await;
    store
        .put_with_ttl("/locks/payment", "worker-1", Duration::from_secs(600))
        .await;
    Arc::new(store)
}
