//! TTL-keyed response store with background eviction.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::observability::metrics;

/// A cached value with its creation time and lifetime.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            ttl,
        }
    }

    /// Expired once strictly more than `ttl` has elapsed.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }
}

/// A thread-safe TTL cache shared by concurrent callers.
#[derive(Clone)]
pub struct ResponseCache<T> {
    /// Label for logs and metrics.
    name: &'static str,
    inner: Arc<DashMap<String, CacheEntry<T>>>,
}

impl<T> ResponseCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new empty cache.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(DashMap::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Get a live value. Expired entries are removed and reported absent.
    pub fn get(&self, key: &str) -> Option<T> {
        let now = Instant::now();

        // The shard guard must be released before `remove_if` touches the same shard.
        match self.inner.get(key) {
            None => {
                metrics::record_cache_event(self.name, "miss");
                return None;
            }
            Some(entry) if !entry.is_expired_at(now) => {
                metrics::record_cache_event(self.name, "hit");
                return Some(entry.value.clone());
            }
            Some(_) => {}
        }

        self.inner.remove_if(key, |_, entry| entry.is_expired_at(now));
        metrics::record_cache_event(self.name, "expired");
        None
    }

    /// Store `value` for `ttl`. A zero TTL stores nothing.
    pub fn set(&self, key: impl Into<String>, value: T, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        self.inner.insert(key.into(), CacheEntry::new(value, ttl));
        metrics::record_cache_size(self.name, self.inner.len());
    }

    pub fn remove(&self, key: &str) -> Option<T> {
        self.inner.remove(key).map(|(_, entry)| entry.value)
    }

    /// Remove `key`, returning its value only if it was still live.
    pub fn take(&self, key: &str) -> Option<T> {
        let (_, entry) = self.inner.remove(key)?;
        (!entry.is_expired_at(Instant::now())).then_some(entry.value)
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&self) {
        self.inner.clear();
        metrics::record_cache_size(self.name, 0);
    }

    /// Remove every expired entry. Returns how many were evicted.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, entry| !entry.is_expired_at(now));
        let after = self.inner.len();
        metrics::record_cache_size(self.name, after);
        before.saturating_sub(after)
    }

    /// Spawn the periodic sweeper. It stops when `shutdown` fires.
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            // The first tick completes immediately; skip it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = cache.sweep();
                        if evicted > 0 {
                            tracing::debug!(cache = cache.name, evicted, remaining = cache.len(), "Swept expired cache entries");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!(cache = cache.name, "Cache sweeper stopping");
                        break;
                    }
                }
            }
        })
    }
}

impl<T> std::fmt::Debug for ResponseCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("name", &self.name)
            .field("entries", &self.inner.len())
            .finish()
    }
}
