//! Expiring Cache Module
//!
//! Async, concurrency-safe front of the disk store with TTL stamping.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Duration;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheStats, Clock, DiskStore, SystemClock};
use crate::config::Config;
use crate::error::CacheError;

// == Expiring Cache ==
/// Durable keyed storage of one serializable payload per key, each with a
/// time-to-live.
///
/// Every operation on a key runs under that key's lock, so reads, writes and
/// removals of one key are linearized while other keys proceed in parallel.
/// Callers never need their own locking. Failures are logged and degrade to
/// a miss or a dropped write: the cache is an optimization, never a source
/// of truth.
///
/// Cloning is cheap and clones share the same locks and statistics.
#[derive(Debug, Clone)]
pub struct ExpiringCache {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    store: DiskStore,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    /// One lock per key with an operation in flight
    key_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    stats: Mutex<CacheStats>,
}

impl ExpiringCache {
    // == Constructors ==
    /// Creates a cache in `dir` whose entries live for `ttl`.
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self::with_clock(dir, ttl, Arc::new(SystemClock))
    }

    /// Same as [`ExpiringCache::new`] with an explicit time source.
    pub fn with_clock(dir: impl Into<PathBuf>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: DiskStore::new(dir),
                ttl,
                clock,
                key_locks: Mutex::new(HashMap::new()),
                stats: Mutex::new(CacheStats::new()),
            }),
        }
    }

    /// Creates a cache from the configured directory and TTL.
    ///
    /// A TTL too large for a `Duration` is clamped to the largest one.
    pub fn from_config(config: &Config) -> Self {
        let ttl = i64::try_from(config.cache_ttl)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        Self::new(config.cache_dir.clone(), ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    pub fn dir(&self) -> &std::path::Path {
        self.inner.store.dir()
    }

    // == Get ==
    /// Returns the payload for `key` if present and not expired.
    ///
    /// Missing, expired, unreadable and undecodable records are all misses.
    /// A stale record is left on disk.
    pub async fn value<V>(&self, key: &str) -> Option<V>
    where
        V: DeserializeOwned + Send + 'static,
    {
        let owned = key.to_string();
        let read = self
            .with_key(key, move |store| store.read::<V>(&owned))
            .await;
        let now = self.inner.clock.now();

        match read {
            Ok(Some(entry)) if entry.is_valid_at(now) => {
                debug!(key, ttl_remaining = %entry.ttl_remaining_at(now), "cache hit");
                self.stats().record_hit();
                Some(entry.value)
            }
            Ok(Some(entry)) => {
                debug!(key, expired_at = %entry.expires_at, "cache entry expired");
                self.stats().record_miss();
                None
            }
            Ok(None) => {
                debug!(key, "cache miss");
                self.stats().record_miss();
                None
            }
            Err(e) => {
                warn!(key, error = %e, "cache read failed, treating as miss");
                self.stats().record_miss();
                None
            }
        }
    }

    // == Set ==
    /// Persists `value` under `key` with a fresh expiry of now + TTL,
    /// replacing any previous entry.
    ///
    /// Encoding or I/O failures drop the write.
    pub async fn set_value<V>(&self, key: &str, value: &V)
    where
        V: Serialize + ?Sized,
    {
        self.set_value_if(key, value, || true).await;
    }

    /// Like [`set_value`](Self::set_value), but only writes if
    /// `still_current` returns true.
    ///
    /// `still_current` runs while the key is locked, so an operation that
    /// invalidates the key and then removes it can never be overtaken by
    /// this write. Returns whether the value was written.
    pub async fn set_value_if<V, P>(&self, key: &str, value: &V, still_current: P) -> bool
    where
        V: Serialize + ?Sized,
        P: FnOnce() -> bool + Send + 'static,
    {
        let Some(entry) = CacheEntry::new(key, value, self.inner.clock.now(), self.inner.ttl) else {
            warn!(key, ttl = %self.inner.ttl, "cache expiry out of range, not caching");
            self.stats().record_dropped_write();
            return false;
        };
        let expires_at = entry.expires_at;
        let encoded = serde_json::to_vec(&entry);
        drop(entry);
        let bytes = match encoded {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, error = %e, "failed to encode cache value, not caching");
                self.stats().record_dropped_write();
                return false;
            }
        };

        let owned = key.to_string();
        let written = self
            .with_key(key, move |store| {
                if !still_current() {
                    return Ok(false);
                }
                store.write(&owned, &bytes)?;
                Ok(true)
            })
            .await;
        match written {
            Ok(true) => {
                debug!(key, expires_at = %expires_at, "cache entry written");
                self.stats().record_write();
                true
            }
            Ok(false) => {
                debug!(key, "cache write superseded, skipped");
                false
            }
            Err(e) => {
                warn!(key, error = %e, "failed to write cache entry, not caching");
                self.stats().record_dropped_write();
                false
            }
        }
    }

    // == Delete ==
    /// Deletes the entry for `key`. A missing entry is a no-op.
    pub async fn remove_value(&self, key: &str) {
        let owned = key.to_string();
        match self.with_key(key, move |store| store.remove(&owned)).await {
            Ok(true) => {
                debug!(key, "cache entry removed");
                self.stats().record_removal();
            }
            Ok(false) => {}
            Err(e) => warn!(key, error = %e, "failed to remove cache entry"),
        }
    }

    // == Cleanup Expired ==
    /// Deletes every stale or unreadable record. Returns the number removed.
    ///
    /// Each removal re-checks the record under its key lock, so a value
    /// written concurrently is never swept.
    pub async fn purge_expired(&self) -> usize {
        let store = self.inner.store.clone();
        let keys = match tokio::task::spawn_blocking(move || store.keys()).await {
            Ok(Ok(keys)) => keys,
            Ok(Err(e)) => {
                warn!(error = %e, "failed to list cache directory");
                return 0;
            }
            Err(e) => {
                warn!(error = %e, "cache listing task failed");
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys {
            let now = self.inner.clock.now();
            let owned = key.clone();
            match self
                .with_key(&key, move |store| store.remove_if_stale(&owned, now))
                .await
            {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(key = %key, error = %e, "failed to sweep cache entry"),
            }
        }

        if removed > 0 {
            info!(removed, "swept expired cache entries");
        }
        self.stats().record_evictions(removed);
        removed
    }

    // == Stats ==
    /// Returns a snapshot of the counters plus the number of files on disk.
    pub async fn snapshot_stats(&self) -> CacheStats {
        let store = self.inner.store.clone();
        let total = match tokio::task::spawn_blocking(move || store.len()).await {
            Ok(Ok(total)) => total,
            Ok(Err(e)) => {
                warn!(error = %e, "failed to count cache entries");
                0
            }
            Err(e) => {
                warn!(error = %e, "cache counting task failed");
                0
            }
        };

        let mut stats = self.stats().clone();
        stats.set_total_entries(total);
        stats
    }

    fn stats(&self) -> MutexGuard<'_, CacheStats> {
        self.inner
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // == Key Serialization ==
    /// Runs `op` on the blocking pool while holding the lock for `key`.
    ///
    /// The guard moves into the blocking task, so the key stays locked until
    /// the file operation has finished even if the caller is dropped.
    async fn with_key<R, F>(&self, key: &str, op: F) -> Result<R, CacheError>
    where
        F: FnOnce(&DiskStore) -> Result<R, CacheError> + Send + 'static,
        R: Send + 'static,
    {
        let lock = self.key_lock(key);
        let guard = Arc::clone(&lock).lock_owned().await;
        let store = self.inner.store.clone();

        let result = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            op(&store)
        })
        .await
        .map_err(|e| CacheError::Task(e.to_string()))
        .and_then(|r| r);

        self.release_key(key, lock);
        result
    }

    fn key_lock(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .inner
            .key_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Drops the table entry once nobody else holds or waits on it.
    fn release_key(&self, key: &str, lock: Arc<AsyncMutex<()>>) {
        let mut locks = self
            .inner
            .key_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // The table and `lock` are the only owners left
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.inner
            .key_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
