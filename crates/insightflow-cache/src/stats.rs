//! Cache performance counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found a live entry
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Successful inserts
    pub inserts: u64,
    /// Values rejected for exceeding the size cap
    pub rejected_oversize: u64,
    /// Explicit invalidations
    pub invalidations: u64,
    /// Entries currently held
    pub entry_count: u64,
}

/// Internal atomic counters behind `CacheStats`
#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    rejected_oversize: AtomicU64,
    invalidations: AtomicU64,
}

impl CacheCounters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reject_oversize(&self) {
        self.rejected_oversize.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn invalidate(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entry_count: u64) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            rejected_oversize: self.rejected_oversize.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entry_count,
        }
    }
}
