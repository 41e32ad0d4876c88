//! Redis-backed shared cache layer.
//!
//! Enabled with the `redis` feature.

use std::{fmt, future::Future, time::Duration};

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, RedisResult};

use super::SharedCache;
use crate::{DomainError, Result};

const SCAN_BATCH: usize = 200;

/// [`SharedCache`] over a multiplexed, auto-reconnecting Redis connection.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("op_timeout", &self.op_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Connects to `redis_url` (e.g. `redis://127.0.0.1:6379/0`).
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(DomainError::cache_unavailable)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(DomainError::cache_unavailable)?;
        Ok(Self {
            conn,
            op_timeout: Duration::from_millis(500),
        })
    }

    /// Upper bound on a single Redis round trip before it counts as unavailable.
    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    async fn bounded<T>(&self, op: impl Future<Output = RedisResult<T>>) -> Result<T> {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result.map_err(DomainError::cache_unavailable),
            Err(_) => Err(DomainError::cache_unavailable("redis operation timed out")),
        }
    }
}

#[async_trait]
impl SharedCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        self.bounded(async move { conn.get(key).await }).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let millis = ttl_millis(ttl);
        self.bounded(async move { conn.pset_ex(key, value, millis).await }).await
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut conn = self.conn.clone();
        let mut cursor = 0u64;
        let mut removed = 0u64;

        loop {
            let (next, keys): (u64, Vec<String>) = self
                .bounded(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn),
                )
                .await?;

            if !keys.is_empty() {
                let mut del_conn = self.conn.clone();
                let count: u64 = self.bounded(async move { del_conn.del(keys).await }).await?;
                removed += count;
            }

            if next == 0 {
                return Ok(removed);
            }
            cursor = next;
        }
    }
}

// PSETEX rejects 0
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Escapes Redis glob metacharacters so the prefix matches literally.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for ch in prefix.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{escape_glob, ttl_millis};

    #[test]
    fn ttl_keeps_millisecond_precision() {
        assert_eq!(ttl_millis(Duration::from_millis(1_500)), 1_500);
        assert_eq!(ttl_millis(Duration::from_millis(300)), 300);
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
    }

    #[test]
    fn glob_metacharacters_are_escaped() {
        assert_eq!(escape_glob("veeqo:orders:"), "veeqo:orders:");
        assert_eq!(escape_glob("a*b?[c]\\"), "a\\*b\\?\\[c\\]\\\\");
    }
}
