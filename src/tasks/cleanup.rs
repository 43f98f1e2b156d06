//! Expired-Entry Sweep Task
//!
//! Background task that periodically deletes expired records from the disk cache.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::ExpiringCache;

/// Spawns a background task that periodically purges expired cache records.
///
/// Reads already treat expired records as misses, so the sweep only reclaims
/// disk space. The returned handle can be aborted during graceful shutdown.
///
/// # Example
/// ```ignore
/// let cache = ExpiringCache::new("/tmp/feeds", chrono::Duration::minutes(10));
/// let cleanup_handle = spawn_cleanup_task(cache.clone(), 300);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(cache: ExpiringCache, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting cache sweep task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.purge_expired().await;

            if removed > 0 {
                info!("Cache sweep: removed {} expired entries", removed);
            } else {
                debug!("Cache sweep: no expired entries found");
            }
        }
    })
}
