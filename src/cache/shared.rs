use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Out-of-process key/value store shared between client instances.
///
/// Values are opaque strings; [`ResponseCache`](super::ResponseCache) stores
/// the response together with its insertion time, so expiry stays exact even
/// when a store keeps keys longer than asked.
///
/// Implementations report any connectivity problem as a
/// [`ErrorKind::CacheUnavailable`](crate::ErrorKind::CacheUnavailable) error;
/// [`ResponseCache`](super::ResponseCache) logs those and carries on.
#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Returns the number of keys removed.
    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64>;
}
