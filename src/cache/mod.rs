//! Response cache for idempotent reads.
//!
//! Two layers: a bounded in-process [`MemoryCache`] checked first, and an
//! optional [`SharedCache`] (Redis with the `redis` feature). A shared-layer
//! hit backfills the in-process layer for whatever is left of the entry's
//! TTL. Shared-layer failures are logged and treated as misses; they never
//! reach the caller.

mod memory;
#[cfg(feature = "redis")]
mod redis_store;
mod shared;

use std::{
    fmt,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use sha2::{Digest, Sha256};

pub use memory::{CacheEntry, MemoryCache};
#[cfg(feature = "redis")]
pub use redis_store::RedisCache;
pub use shared::SharedCache;

use crate::request::{resource_family, Method, Query};

/// Cache key: `{namespace}:{family}:{sha256 hex}`.
///
/// The hash covers verb, path and the sorted query, so parameter order never
/// matters. The readable `{namespace}:{family}:` prefix is what writes
/// invalidate.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds the key of one read.
    pub fn derive(namespace: &str, method: Method, path: &str, query: &Query) -> Self {
        let mut hasher = Sha256::new();
        let mut feed = |part: &str| {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        };
        feed(method.as_str());
        feed(path);
        for (key, value) in query.sorted() {
            feed(key);
            feed(value);
        }
        let digest = hex::encode(hasher.finalize());
        Self(format!(
            "{}{digest}",
            Self::family_prefix(namespace, resource_family(path))
        ))
    }

    /// Prefix shared by every key of one resource family.
    pub fn family_prefix(namespace: &str, family: &str) -> String {
        format!("{namespace}:{family}:")
    }

    /// Full key as stored in both layers.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What gets cached, for how long, and under which namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl: Duration,
    /// Bound on the in-process layer.
    pub max_entries: usize,
    /// Key prefix separating providers sharing one Redis.
    pub namespace: String,
    /// Path prefixes whose GETs may be cached, e.g. `/products`.
    pub cacheable_prefixes: Vec<String>,
    /// Path segments that make a read uncacheable even under an allowed
    /// prefix, e.g. `rates` for `/shipments/{id}/rates`.
    pub uncacheable_segments: Vec<String>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_entries: 1_000,
            namespace: "api".to_owned(),
            cacheable_prefixes: Vec::new(),
            uncacheable_segments: Vec::new(),
        }
    }
}

impl CachePolicy {
    /// Sets how long cached reads stay fresh.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Bounds the in-process layer.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Sets the key prefix, e.g. the provider name.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Allows GETs under `prefix` to be cached.
    pub fn allow_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cacheable_prefixes.push(prefix.into());
        self
    }

    /// Keeps reads whose path contains `segment` out of the cache.
    pub fn deny_segment(mut self, segment: impl Into<String>) -> Self {
        self.uncacheable_segments.push(segment.into());
        self
    }

    /// GETs under an allow-listed prefix and free of denied segments.
    /// Matching is segment aligned: `/orders` covers `/orders` and
    /// `/orders/7`, not `/orders_archive`.
    pub fn is_cacheable(&self, method: Method, path: &str) -> bool {
        method.is_read()
            && self.cacheable_prefixes.iter().any(|prefix| {
                let prefix = prefix.trim_end_matches('/');
                path.strip_prefix(prefix)
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            })
            && !path
                .split('/')
                .any(|segment| self.uncacheable_segments.iter().any(|denied| denied == segment))
    }

    /// Derives the key of a read under this policy's namespace.
    pub fn key_for(&self, method: Method, path: &str, query: &Query) -> CacheKey {
        CacheKey::derive(&self.namespace, method, path, query)
    }

    /// Prefix invalidated by a write to `path`.
    pub fn invalidation_prefix(&self, path: &str) -> String {
        CacheKey::family_prefix(&self.namespace, resource_family(path))
    }
}

/// Payload stored in the shared layer. The insertion time travels with the
/// value so another process can tell how much TTL is left.
#[derive(Debug, Deserialize)]
struct SharedEntry {
    inserted_at_ms: u64,
    value: JsonValue,
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// Tiered response cache. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ResponseCache {
    memory: Arc<MemoryCache>,
    shared: Option<Arc<dyn SharedCache>>,
}

impl fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache")
            .field("memory_entries", &self.memory.len())
            .field("shared", &self.shared.is_some())
            .finish()
    }
}

impl ResponseCache {
    /// In-process cache only, bounded to `max_entries`.
    pub fn new(max_entries: usize) -> Self {
        Self {
            memory: Arc::new(MemoryCache::new(max_entries)),
            shared: None,
        }
    }

    /// Adds a shared layer below the in-process one.
    pub fn with_shared(mut self, shared: Arc<dyn SharedCache>) -> Self {
        self.shared = Some(shared);
        self
    }

    /// The in-process layer.
    pub fn memory(&self) -> &MemoryCache {
        &self.memory
    }

    /// In-process first, then shared. A shared entry older than `ttl` is a
    /// miss; a younger one is backfilled for the remainder of `ttl`.
    pub async fn get(&self, key: &CacheKey, ttl: Duration) -> Option<JsonValue> {
        if let Some(value) = self.memory.get(key.as_str()) {
            return Some(value);
        }
        let shared = self.shared.as_ref()?;

        let raw = match shared.get(key.as_str()).await {
            Ok(raw) => raw?,
            Err(err) => {
                tracing::warn!(
                    cache_key = %key,
                    kind = %err.kind,
                    detail = ?err.detail,
                    "shared cache read failed; treating as miss"
                );
                return None;
            }
        };

        let entry = match serde_json::from_str::<SharedEntry>(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(cache_key = %key, error = %err, "discarding undecodable shared cache entry");
                return None;
            }
        };

        let age = Duration::from_millis(unix_millis().saturating_sub(entry.inserted_at_ms));
        let remaining = ttl.checked_sub(age).filter(|left| !left.is_zero())?;
        self.memory.set(key.as_str(), entry.value.clone(), remaining);
        Some(entry.value)
    }

    /// Writes both layers. Last writer wins.
    pub async fn set(&self, key: &CacheKey, value: JsonValue, ttl: Duration) {
        let Some(shared) = &self.shared else {
            self.memory.set(key.as_str(), value, ttl);
            return;
        };

        let raw = json!({ "inserted_at_ms": unix_millis(), "value": &value }).to_string();
        self.memory.set(key.as_str(), value, ttl);
        if let Err(err) = shared.set_with_ttl(key.as_str(), &raw, ttl).await {
            tracing::warn!(
                cache_key = %key,
                kind = %err.kind,
                detail = ?err.detail,
                "shared cache write failed"
            );
        }
    }

    /// Removes every entry whose key starts with `prefix`, in both layers.
    pub async fn invalidate(&self, prefix: &str) {
        let removed = self.memory.invalidate(prefix);
        tracing::debug!(prefix, removed = removed as u64, "invalidated in-process cache entries");

        if let Some(shared) = &self.shared {
            match shared.delete_by_prefix(prefix).await {
                Ok(removed) => {
                    tracing::debug!(prefix, removed, "invalidated shared cache entries")
                }
                Err(err) => tracing::warn!(
                    prefix,
                    kind = %err.kind,
                    detail = ?err.detail,
                    "shared cache invalidation failed"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use serde_json::{json, Value as JsonValue};

    use super::{unix_millis, CacheKey, CachePolicy, ResponseCache, SharedCache};
    use crate::{
        request::{Method, Query},
        DomainError, Result,
    };

    const TTL: Duration = Duration::from_secs(60);

    #[derive(Default)]
    struct MapStore {
        values: Mutex<HashMap<String, String>>,
        gets: AtomicUsize,
    }

    #[async_trait]
    impl SharedCache for MapStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        async fn set_with_ttl(&self, key: &str, value: &str, _ttl: Duration) -> Result<()> {
            self.values
                .lock()
                .unwrap()
                .insert(key.to_owned(), value.to_owned());
            Ok(())
        }

        async fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
            let mut values = self.values.lock().unwrap();
            let before = values.len();
            values.retain(|key, _| !key.starts_with(prefix));
            Ok((before - values.len()) as u64)
        }
    }

    struct DownStore;

    #[async_trait]
    impl SharedCache for DownStore {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(DomainError::cache_unavailable("connection refused"))
        }

        async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            Err(DomainError::cache_unavailable("connection refused"))
        }

        async fn delete_by_prefix(&self, _prefix: &str) -> Result<u64> {
            Err(DomainError::cache_unavailable("connection refused"))
        }
    }

    fn key(path: &str, query: impl Into<Query>) -> CacheKey {
        CacheKey::derive("veeqo", Method::Get, path, &query.into())
    }

    #[test]
    fn key_ignores_query_order() {
        assert_eq!(
            key("/x", [("a", "1"), ("b", "2")]),
            key("/x", [("b", "2"), ("a", "1")])
        );
    }

    #[test]
    fn key_distinguishes_path_values_and_verb() {
        assert_ne!(key("/x", [("a", "1")]), key("/x", [("a", "2")]));
        assert_ne!(key("/x", ()), key("/y", ()));
        assert_ne!(key("/x", [("a", "b=c")]), key("/x", [("a=b", "c")]));
        assert_ne!(
            CacheKey::derive("veeqo", Method::Get, "/x", &Query::new()),
            CacheKey::derive("veeqo", Method::Delete, "/x", &Query::new())
        );
    }

    #[test]
    fn key_carries_family_prefix() {
        let policy = CachePolicy::default().with_namespace("easypost");
        let key = policy.key_for(Method::Get, "/shipments/shp_1", &Query::new());
        assert!(key
            .as_str()
            .starts_with(&policy.invalidation_prefix("/shipments/shp_1/buy")));
        assert!(key.as_str().starts_with("easypost:shipments:"));
    }

    #[test]
    fn cacheability_is_get_only_and_segment_aligned() {
        let policy = CachePolicy::default().allow_prefix("/orders/");
        assert!(policy.is_cacheable(Method::Get, "/orders"));
        assert!(policy.is_cacheable(Method::Get, "/orders/7"));
        assert!(!policy.is_cacheable(Method::Get, "/orders_archive"));
        assert!(!policy.is_cacheable(Method::Post, "/orders"));
        assert!(!policy.is_cacheable(Method::Get, "/products"));
    }

    async fn put_aged(store: &MapStore, key: &CacheKey, value: JsonValue, age: Duration) {
        let inserted_at_ms = unix_millis() - age.as_millis() as u64;
        let raw = json!({ "inserted_at_ms": inserted_at_ms, "value": value }).to_string();
        store.set_with_ttl(key.as_str(), &raw, TTL).await.unwrap();
    }

    #[test]
    fn denied_segments_stay_uncached_under_allowed_prefix() {
        let policy = CachePolicy::default()
            .allow_prefix("/shipments")
            .deny_segment("rates");
        assert!(policy.is_cacheable(Method::Get, "/shipments/shp_1"));
        assert!(!policy.is_cacheable(Method::Get, "/shipments/shp_1/rates"));
        assert!(policy.is_cacheable(Method::Get, "/shipments/rates_report"));
    }

    #[tokio::test]
    async fn shared_hit_backfills_memory() {
        let store = Arc::new(MapStore::default());
        let cache = ResponseCache::new(10).with_shared(store.clone());
        let key = key("/products", ());
        put_aged(&store, &key, json!({"id": 1}), Duration::ZERO).await;

        assert_eq!(cache.get(&key, TTL).await, Some(json!({"id": 1})));
        assert_eq!(cache.memory().get(key.as_str()), Some(json!({"id": 1})));

        cache.get(&key, TTL).await;
        assert_eq!(store.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn backfill_keeps_only_the_remaining_ttl() {
        let ttl = Duration::from_millis(300);
        let store = Arc::new(MapStore::default());
        let writer = ResponseCache::new(10).with_shared(store.clone());
        let reader = ResponseCache::new(10).with_shared(store.clone());
        let key = key("/products/1", ());

        writer.set(&key, json!({"v": "fresh"}), ttl).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(reader.get(&key, ttl).await, Some(json!({"v": "fresh"})));
        assert_eq!(reader.memory().len(), 1);

        // 350ms after the write: gone from the backfilled copy and the shared one
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(reader.memory().get(key.as_str()), None);
        assert_eq!(reader.get(&key, ttl).await, None);
        assert!(reader.memory().is_empty());
    }

    #[tokio::test]
    async fn shared_entry_older_than_ttl_is_a_miss() {
        let store = Arc::new(MapStore::default());
        let cache = ResponseCache::new(10).with_shared(store.clone());
        let key = key("/products", ());
        put_aged(&store, &key, json!("stale"), TTL + Duration::from_secs(1)).await;

        assert_eq!(cache.get(&key, TTL).await, None);
        assert!(cache.memory().is_empty());
    }

    #[tokio::test]
    async fn shared_entry_without_timestamp_is_discarded() {
        let store = Arc::new(MapStore::default());
        let cache = ResponseCache::new(10).with_shared(store.clone());
        let key = key("/products", ());
        store
            .set_with_ttl(key.as_str(), r#"{"id":1}"#, TTL)
            .await
            .unwrap();

        assert_eq!(cache.get(&key, TTL).await, None);
    }

    #[tokio::test]
    async fn set_and_invalidate_reach_both_layers() {
        let store = Arc::new(MapStore::default());
        let cache = ResponseCache::new(10).with_shared(store.clone());
        let key = key("/orders/1", ());

        cache.set(&key, json!([1, 2]), TTL).await;
        assert_eq!(store.values.lock().unwrap().len(), 1);

        cache
            .invalidate(&CacheKey::family_prefix("veeqo", "orders"))
            .await;
        assert!(cache.memory().is_empty());
        assert!(store.values.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unavailable_shared_layer_degrades_to_memory() {
        let cache = ResponseCache::new(10).with_shared(Arc::new(DownStore));
        let key = key("/products", ());

        assert_eq!(cache.get(&key, TTL).await, None);
        cache.set(&key, json!("v"), TTL).await;
        assert_eq!(cache.get(&key, TTL).await, Some(json!("v")));
        cache.invalidate("veeqo:").await;
        assert_eq!(cache.get(&key, TTL).await, None);
    }
}
