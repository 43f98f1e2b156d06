//! Cache Entry Module
//!
//! Defines the record persisted for each cache key.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// == Cache Entry ==
/// A single cached payload together with its key and expiry.
///
/// The key is stored alongside the value so a record read back from disk can
/// be checked against the key that was asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    /// Caller-defined key, usually a query signature
    pub key: String,
    /// When the entry was written
    pub cached_at: DateTime<Utc>,
    /// Last instant at which the entry is still valid
    pub expires_at: DateTime<Utc>,
    /// The cached payload
    pub value: V,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates an entry written at `now` that stays valid for `ttl`.
    ///
    /// Returns `None` when the expiry falls outside the representable range.
    pub fn new(key: impl Into<String>, value: V, now: DateTime<Utc>, ttl: Duration) -> Option<Self> {
        let expires_at = now.checked_add_signed(ttl)?;
        Some(Self {
            key: key.into(),
            cached_at: now,
            expires_at,
            value,
        })
    }

    // == Is Valid ==
    /// Returns true while `now <= expires_at`.
    ///
    /// The expiry instant itself is still a hit.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }

    // == Time To Live ==
    /// Remaining lifetime at `now`, zero once expired.
    pub fn ttl_remaining_at(&self, now: DateTime<Utc>) -> Duration {
        if self.expires_at > now {
            self.expires_at - now
        } else {
            Duration::zero()
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_entry_creation() {
        let entry = CacheEntry::new("cat1", vec![1, 2], t0(), Duration::seconds(10)).unwrap();

        assert_eq!(entry.key, "cat1");
        assert_eq!(entry.value, vec![1, 2]);
        assert_eq!(entry.cached_at, t0());
        assert_eq!(entry.expires_at, t0() + Duration::seconds(10));
    }

    #[test]
    fn test_entry_validity_window() {
        let entry = CacheEntry::new("cat1", (), t0(), Duration::seconds(10)).unwrap();

        assert!(entry.is_valid_at(t0()));
        assert!(entry.is_valid_at(t0() + Duration::seconds(5)));
        assert!(!entry.is_valid_at(t0() + Duration::seconds(11)));
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = CacheEntry::new("cat1", (), t0(), Duration::seconds(10)).unwrap();

        // Valid exactly at the expiry instant, stale one tick later
        assert!(entry.is_valid_at(t0() + Duration::seconds(10)));
        assert!(!entry.is_valid_at(
            t0() + Duration::seconds(10) + Duration::nanoseconds(1)
        ));
    }

    #[test]
    fn test_ttl_remaining() {
        let entry = CacheEntry::new("cat1", (), t0(), Duration::seconds(10)).unwrap();

        assert_eq!(
            entry.ttl_remaining_at(t0() + Duration::seconds(4)),
            Duration::seconds(6)
        );
        assert_eq!(
            entry.ttl_remaining_at(t0() + Duration::seconds(30)),
            Duration::zero()
        );
    }

    #[test]
    fn test_unrepresentable_expiry_is_rejected() {
        assert!(CacheEntry::new("cat1", (), t0(), Duration::MAX).is_none());
        assert!(CacheEntry::new("cat1", (), DateTime::<Utc>::MAX_UTC, Duration::seconds(1)).is_none());
    }

    #[test]
    fn test_entry_serializes_key_and_expiry() {
        let entry = CacheEntry::new("cat1", vec!["g1".to_string()], t0(), Duration::seconds(10)).unwrap();
        let json = serde_json::to_string(&entry).unwrap();

        assert!(json.contains("\"key\":\"cat1\""));
        assert!(json.contains("expires_at"));
        assert!(json.contains("g1"));
    }
}
