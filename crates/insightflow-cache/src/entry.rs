//! Cache entry metadata

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Cached value plus bookkeeping
///
/// Expiry is enforced by the owning cache; the metadata here exists for
/// statistics and diagnostics.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The cached value
    pub value: V,
    /// When the entry was created
    pub created_at: DateTime<Utc>,
    /// Time-to-live the entry was stored with
    pub ttl: Duration,
    /// Estimated serialized size
    pub size_bytes: usize,
}

impl<V> CacheEntry<V> {
    /// Create entry stamped now
    #[inline]
    #[must_use]
    pub fn new(value: V, ttl: Duration, size_bytes: usize) -> Self {
        Self {
            value,
            created_at: Utc::now(),
            ttl,
            size_bytes,
        }
    }

    /// Age of the entry
    #[must_use]
    pub fn age(&self) -> Duration {
        (Utc::now() - self.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Entry has outlived its TTL
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.age() >= self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_is_not_expired() {
        let entry = CacheEntry::new("value", Duration::from_secs(60), 5);
        assert!(!entry.is_expired());
        assert_eq!(entry.size_bytes, 5);
    }

    #[test]
    fn zero_ttl_entry_is_expired() {
        let entry = CacheEntry::new("value", Duration::ZERO, 5);
        assert!(entry.is_expired());
    }
}
