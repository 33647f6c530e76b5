// Freshness cache: request signature -> (capture time, value) with a per-kind TTL.
//
// The mutex only ever guards O(1) map operations. Compute steps for misses run with the lock
// released, so a slow runtime call never stalls readers of unrelated keys.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Cache key builders. Keys derived from a container id all share the `container:<id>:` prefix.
pub mod keys {
    pub const SYSTEM: &str = "system";
    pub const CONTAINERS: &str = "containers";
    pub const NETWORKS: &str = "networks";
    pub const DAEMON_INFO: &str = "daemon_info";

    pub fn container_prefix(id: &str) -> String {
        format!("container:{}:", id)
    }

    pub fn container_detail(id: &str) -> String {
        format!("container:{}:detail", id)
    }

    /// Maps a name or short id a caller used to the runtime's full container id.
    pub fn container_alias(reference: &str) -> String {
        format!("alias:{}", reference)
    }
}

type Payload = Arc<dyn Any + Send + Sync>;

struct CacheEntry {
    captured_at: Instant,
    ttl: Duration,
    payload: Payload,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.captured_at) < self.ttl
    }
}

#[derive(Default)]
pub struct FreshnessCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl FreshnessCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        // entries are replaced whole, so a poisoned map is still consistent
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Live value for `key`, if one exists and holds a `T`.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        let now = Instant::now();
        let entries = self.lock();
        entries
            .get(key)
            .filter(|e| e.is_fresh(now))
            .and_then(|e| e.payload.clone().downcast::<T>().ok())
    }

    /// Store `value` under `key`, captured now.
    pub fn insert<T: Send + Sync + 'static>(&self, key: &str, ttl: Duration, value: T) -> Arc<T> {
        let value = Arc::new(value);
        let entry = CacheEntry {
            captured_at: Instant::now(),
            ttl,
            payload: value.clone(),
        };
        self.lock().insert(key.to_string(), entry);
        value
    }

    /// Return the live value, or run `compute` (outside the lock) and cache its result.
    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> Arc<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(hit) = self.get::<T>(key) {
            return hit;
        }
        let value = compute().await;
        self.insert(key, ttl, value)
    }

    /// Like `get_or_compute`, but errors are returned to the caller and never cached.
    pub async fn try_get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<Arc<T>, E>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get::<T>(key) {
            return Ok(hit);
        }
        let value = compute().await?;
        Ok(self.insert(key, ttl, value))
    }

    /// Remove every entry whose key starts with `prefix`. Returns how many were removed.
    pub fn invalidate(&self, prefix: &str) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        before - entries.len()
    }

    /// Evict everything keyed to container `id` plus the network topology,
    /// whose membership and addresses may have changed.
    pub fn invalidate_container(&self, id: &str) {
        let prefix = keys::container_prefix(id);
        let mut entries = self.lock();
        entries.retain(|k, _| !k.starts_with(&prefix) && k != keys::NETWORKS);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }
}
