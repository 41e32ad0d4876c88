use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use serde_json::Value as JsonValue;

/// One cached response body.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: JsonValue,
    pub inserted_at: Instant,
    pub ttl: Duration,
    seq: u64,
}

impl CacheEntry {
    /// Whether `now` is past `inserted_at + ttl`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) > self.ttl
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    // insertion sequence -> key, oldest first
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl Inner {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }
}

/// Bounded in-process layer with lazy expiry.
///
/// Expired entries are dropped when read. Once `max_entries` is exceeded the
/// oldest insertion is evicted, regardless of how recently it was read.
#[derive(Debug)]
pub struct MemoryCache {
    max_entries: usize,
    inner: Mutex<Inner>,
}

impl MemoryCache {
    /// Empty cache holding at most `max_entries`.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            inner: Mutex::new(Inner::default()),
        }
    }

    // Entries are advisory, so a panic in another holder does not invalidate them.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Live value under `key`; an expired entry is dropped and reported absent.
    pub fn get(&self, key: &str) -> Option<JsonValue> {
        self.get_at(key, Instant::now())
    }

    pub(crate) fn get_at(&self, key: &str, now: Instant) -> Option<JsonValue> {
        let mut inner = self.lock();
        let expired = inner.entries.get(key)?.is_expired_at(now);
        if expired {
            inner.remove(key);
            return None;
        }
        inner.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Inserts or replaces `key`, restarting its TTL.
    pub fn set(&self, key: impl Into<String>, value: JsonValue, ttl: Duration) {
        self.set_at(key.into(), value, ttl, Instant::now());
    }

    pub(crate) fn set_at(&self, key: String, value: JsonValue, ttl: Duration, now: Instant) {
        let mut inner = self.lock();
        inner.remove(&key);

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.insert(seq, key.clone());
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                value,
                inserted_at: now,
                ttl,
                seq,
            },
        );

        while inner.entries.len() > self.max_entries {
            let Some((_, oldest)) = inner.order.pop_first() else {
                break;
            };
            inner.entries.remove(&oldest);
        }
    }

    /// Removes every key starting with `prefix`. An exact key is its own prefix.
    pub fn invalidate(&self, prefix: &str) -> usize {
        let mut inner = self.lock();
        let doomed: Vec<String> = inner
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        for key in &doomed {
            inner.remove(key);
        }
        doomed.len()
    }

    /// Number of stored entries, expired ones included until read.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }
}
