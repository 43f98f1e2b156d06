//! Cache Statistics Module
//!
//! Tracks cache effectiveness: hits, misses, writes, removals and sweeps.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Lookups that returned a fresh value
    pub hits: u64,
    /// Lookups that found nothing usable (absent, expired or unreadable)
    pub misses: u64,
    /// Values persisted
    pub writes: u64,
    /// Writes dropped because encoding or I/O failed
    pub dropped_writes: u64,
    /// Explicit removals that deleted a record
    pub removals: u64,
    /// Stale records deleted by a sweep
    pub evictions: u64,
    /// Record files currently on disk
    pub total_entries: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_write(&mut self) {
        self.writes += 1;
    }

    pub fn record_dropped_write(&mut self) {
        self.dropped_writes += 1;
    }

    pub fn record_removal(&mut self) {
        self.removals += 1;
    }

    /// Adds `count` swept records to the eviction counter.
    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
