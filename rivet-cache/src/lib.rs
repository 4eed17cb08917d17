use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use rivet_core::{BoxFuture, CacheStore};

/// Default in-memory cache store backed by `DashMap`.
///
/// Each entry stores its value with an expiry instant and is lazily evicted
/// on access. Clones share the same entries.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<DashMap<String, (Bytes, Instant)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, key: &str, now: Instant) -> Option<Bytes> {
        if let Some(entry) = self.inner.get(key) {
            let (val, expires_at) = entry.value();
            if now < *expires_at {
                return Some(val.clone());
            }
            // Expired: drop the read guard before removing
            drop(entry);
            self.inner.remove(key);
        }
        None
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.inner.clear();
    }

    /// Remove all expired entries.
    pub fn evict_expired(&self) {
        let now = Instant::now();
        self.inner.retain(|_, (_, expires_at)| now < *expires_at);
    }

    /// Number of stored entries, expired ones included until evicted.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl CacheStore for InMemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<Bytes>> {
        Box::pin(std::future::ready(self.lookup(key, Instant::now())))
    }

    fn set<'a>(&'a self, key: &'a str, value: Bytes, ttl: Duration) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if ttl.is_zero() {
                return;
            }
            self.inner
                .insert(key.to_string(), (value, Instant::now() + ttl));
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.inner.remove(key);
        })
    }

    fn remove_by_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.inner.retain(|k, _| !k.starts_with(prefix));
        })
    }
}
