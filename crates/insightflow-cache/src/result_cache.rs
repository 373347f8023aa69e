//! Query-result cache
//!
//! Short-lived (default 30m), fingerprint-keyed cache of executed-query
//! outcomes. Values above the size cap are served but never stored; the entry
//! count is bounded with least-recently-used eviction.

use crate::entry::CacheEntry;
use crate::fingerprint::QueryKey;
use crate::stats::{CacheCounters, CacheStats};
use async_trait::async_trait;
use insightflow_model::{DataSourceId, QueryOutcome};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Injected query-result-cache service
#[async_trait]
pub trait QueryResultCache: Send + Sync {
    /// Look up a cached outcome
    async fn get(&self, key: &QueryKey) -> Option<QueryOutcome>;

    /// Store an outcome; oversized values are silently skipped
    async fn put(&self, key: QueryKey, outcome: QueryOutcome);

    /// Drop every entry for one data source
    async fn invalidate_data_source(&self, id: &DataSourceId);

    /// Current statistics
    fn stats(&self) -> CacheStats;
}

/// Query-result cache configuration
#[derive(Debug, Clone, Copy)]
pub struct QueryResultCacheConfig {
    /// Maximum cached outcomes
    pub max_entries: u64,
    /// Time-to-live per entry
    pub ttl: Duration,
    /// Outcomes serializing above this are not cached
    pub max_value_bytes: usize,
}

impl QueryResultCacheConfig {
    /// With TTL
    #[inline]
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// With entry cap
    #[inline]
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// With value-size cap
    #[inline]
    #[must_use]
    pub fn with_max_value_bytes(mut self, max_value_bytes: usize) -> Self {
        self.max_value_bytes = max_value_bytes;
        self
    }
}

impl Default for QueryResultCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 512,
            ttl: Duration::from_secs(30 * 60),
            max_value_bytes: 512 * 1024,
        }
    }
}

/// Moka-backed query-result cache
#[derive(Debug, Clone)]
pub struct MokaQueryResultCache {
    inner: Cache<QueryKey, Arc<CacheEntry<QueryOutcome>>>,
    counters: Arc<CacheCounters>,
    config: QueryResultCacheConfig,
}

impl MokaQueryResultCache {
    /// Create cache from config
    #[must_use]
    pub fn new(config: QueryResultCacheConfig) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(config.max_entries)
                .time_to_live(config.ttl)
                .support_invalidation_closures()
                .build(),
            counters: Arc::new(CacheCounters::default()),
            config,
        }
    }

    /// Approximate entry count
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Flush moka's pending maintenance work (tests)
    pub async fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks().await;
    }
}

impl Default for MokaQueryResultCache {
    fn default() -> Self {
        Self::new(QueryResultCacheConfig::default())
    }
}

#[async_trait]
impl QueryResultCache for MokaQueryResultCache {
    async fn get(&self, key: &QueryKey) -> Option<QueryOutcome> {
        match self.inner.get(key).await {
            Some(entry) => {
                self.counters.hit();
                Some(entry.value.clone())
            }
            None => {
                self.counters.miss();
                None
            }
        }
    }

    async fn put(&self, key: QueryKey, outcome: QueryOutcome) {
        let Ok(encoded) = serde_json::to_vec(&outcome) else {
            return;
        };
        if encoded.len() > self.config.max_value_bytes {
            self.counters.reject_oversize();
            tracing::debug!(
                size = encoded.len(),
                cap = self.config.max_value_bytes,
                "query result too large to cache"
            );
            return;
        }
        let entry = Arc::new(CacheEntry::new(outcome, self.config.ttl, encoded.len()));
        self.inner.insert(key, entry).await;
        self.counters.insert();
    }

    async fn invalidate_data_source(&self, id: &DataSourceId) {
        let target = id.clone();
        if let Err(e) = self
            .inner
            .invalidate_entries_if(move |key, _| key.data_source == target)
        {
            tracing::warn!(error = %e, "query cache predicate invalidation failed");
            return;
        }
        self.counters.invalidate();
        tracing::debug!(data_source = %id, "query cache invalidated");
    }

    fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.inner.entry_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome(rows: usize) -> QueryOutcome {
        QueryOutcome::new(
            vec!["month".into(), "total".into()],
            (0..rows)
                .map(|i| vec![json!(format!("2026-{:02}", i + 1)), json!(i as f64 * 10.0)])
                .collect(),
        )
    }

    fn key(sql: &str) -> QueryKey {
        QueryKey::new(DataSourceId::new("warehouse-1"), sql)
    }

    #[tokio::test]
    async fn put_then_get() {
        let cache = MokaQueryResultCache::default();
        cache.put(key("select 1"), outcome(3)).await;

        let found = cache.get(&key("SELECT 1")).await;
        assert_eq!(found.unwrap().row_count, 3);
    }

    #[tokio::test]
    async fn oversized_value_is_not_cached() {
        let cache = MokaQueryResultCache::new(
            QueryResultCacheConfig::default().with_max_value_bytes(64),
        );
        cache.put(key("select 1"), outcome(50)).await;

        assert!(cache.get(&key("select 1")).await.is_none());
        assert_eq!(cache.stats().rejected_oversize, 1);
        assert_eq!(cache.stats().inserts, 0);
    }

    #[tokio::test]
    async fn ttl_expiry() {
        let cache = MokaQueryResultCache::new(
            QueryResultCacheConfig::default().with_ttl(Duration::from_millis(40)),
        );
        cache.put(key("select 1"), outcome(1)).await;
        assert!(cache.get(&key("select 1")).await.is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get(&key("select 1")).await.is_none());
    }

    #[tokio::test]
    async fn entry_cap_evicts() {
        let cache = MokaQueryResultCache::new(
            QueryResultCacheConfig::default().with_max_entries(4),
        );
        for i in 0..12 {
            cache.put(key(&format!("select {i} from t{i}")), outcome(1)).await;
        }
        cache.run_pending_tasks().await;
        assert!(cache.entry_count() <= 4);
    }

    #[tokio::test]
    async fn data_source_invalidation_is_scoped() {
        let cache = MokaQueryResultCache::default();
        let k1 = QueryKey::new(DataSourceId::new("warehouse-1"), "select a from t");
        let k2 = QueryKey::new(DataSourceId::new("warehouse-2"), "select a from t");
        cache.put(k1.clone(), outcome(1)).await;
        cache.put(k2.clone(), outcome(1)).await;

        cache
            .invalidate_data_source(&DataSourceId::new("warehouse-1"))
            .await;
        cache.run_pending_tasks().await;

        assert!(cache.get(&k1).await.is_none());
        assert!(cache.get(&k2).await.is_some());
    }
}
