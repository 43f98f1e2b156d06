//! Cache Module
//!
//! Provides a durable, file-backed cache with TTL expiration.

mod clock;
mod entry;
mod expiring;
mod stats;
mod store;


// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use expiring::ExpiringCache;
pub use stats::CacheStats;
pub use store::{escape_key, unescape_key, DiskStore};

// == Public Constants ==
/// Maximum length in bytes of an escaped key, keeping file names portable
pub const MAX_FILE_STEM_LENGTH: usize = 200;
