//! Response DTOs for the feed API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::CacheStats;
use crate::feed::{FetchState, QuerySignature};
use crate::paging::PageProgress;

/// Response body for every feed endpoint (`/feeds/:stream...`)
#[derive(Debug, Clone, Serialize)]
pub struct FeedResponse<T> {
    /// Stream name
    pub stream: String,
    /// Fetch state label: empty, loading, fetching_next_page, success, failure
    pub status: String,
    /// The query the stream is showing
    pub query: QuerySignature,
    /// Items currently loaded
    pub items: Vec<T>,
    /// Error message when `status` is failure
    pub error: Option<String>,
    /// Last page loaded
    pub current_page: u32,
    /// Whether more pages can be requested
    pub has_reached_end: bool,
    /// Whether a next page is being fetched
    pub is_fetching_next_page: bool,
}

impl<T: Clone> FeedResponse<T> {
    /// Creates a new FeedResponse from a stream's state
    pub fn new(
        stream: impl Into<String>,
        query: QuerySignature,
        state: &FetchState<T>,
        progress: PageProgress,
        has_reached_end: bool,
    ) -> Self {
        Self {
            stream: stream.into(),
            status: state.label().to_string(),
            query,
            items: state.items().to_vec(),
            error: state.error().map(ToString::to_string),
            current_page: progress.current_page,
            has_reached_end,
            is_fetching_next_page: state.is_fetching_next_page(),
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of values written
    pub writes: u64,
    /// Number of writes dropped on failure
    pub dropped_writes: u64,
    /// Number of explicit removals
    pub removals: u64,
    /// Number of expired entries swept
    pub evictions: u64,
    /// Current number of entries on disk
    pub total_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    /// Number of registered feed streams
    pub streams: usize,
}

impl StatsResponse {
    /// Creates a new StatsResponse from cache statistics
    pub fn new(stats: &CacheStats, streams: usize) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            writes: stats.writes,
            dropped_writes: stats.dropped_writes,
            removals: stats.removals,
            evictions: stats.evictions,
            total_entries: stats.total_entries,
            hit_rate: stats.hit_rate(),
            streams,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
