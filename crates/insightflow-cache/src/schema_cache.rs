//! Schema cache
//!
//! Time-bound cache of per-data-source schema snapshots. Entries live long
//! (default 24h) and are invalidated explicitly when a data source mutates.

use crate::entry::CacheEntry;
use crate::stats::{CacheCounters, CacheStats};
use async_trait::async_trait;
use insightflow_model::{DataSourceId, SchemaInfo};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Injected schema-cache service
#[async_trait]
pub trait SchemaCache: Send + Sync {
    /// Look up the live snapshot for a data source
    async fn get(&self, id: &DataSourceId) -> Option<SchemaInfo>;

    /// Store a snapshot, keyed by its owning data source
    async fn put(&self, schema: SchemaInfo);

    /// Drop the snapshot for a data source
    async fn invalidate(&self, id: &DataSourceId);

    /// Current statistics
    fn stats(&self) -> CacheStats;
}

/// Schema cache configuration
#[derive(Debug, Clone, Copy)]
pub struct SchemaCacheConfig {
    /// Maximum cached data sources
    pub max_entries: u64,
    /// Time-to-live per entry
    pub ttl: Duration,
}

impl SchemaCacheConfig {
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
}

impl Default for SchemaCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1024,
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Moka-backed schema cache
#[derive(Debug, Clone)]
pub struct MokaSchemaCache {
    inner: Cache<DataSourceId, Arc<CacheEntry<SchemaInfo>>>,
    counters: Arc<CacheCounters>,
    ttl: Duration,
}

impl MokaSchemaCache {
    /// Create cache from config
    #[must_use]
    pub fn new(config: SchemaCacheConfig) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(config.max_entries)
                .time_to_live(config.ttl)
                .build(),
            counters: Arc::new(CacheCounters::default()),
            ttl: config.ttl,
        }
    }

    /// Approximate entry count
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl Default for MokaSchemaCache {
    fn default() -> Self {
        Self::new(SchemaCacheConfig::default())
    }
}

#[async_trait]
impl SchemaCache for MokaSchemaCache {
    async fn get(&self, id: &DataSourceId) -> Option<SchemaInfo> {
        match self.inner.get(id).await {
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

    async fn put(&self, schema: SchemaInfo) {
        let size = serde_json::to_vec(&schema).map(|v| v.len()).unwrap_or(0);
        let id = schema.data_source.clone();
        let entry = Arc::new(CacheEntry::new(schema, self.ttl, size));
        self.inner.insert(id, entry).await;
        self.counters.insert();
    }

    async fn invalidate(&self, id: &DataSourceId) {
        self.inner.invalidate(id).await;
        self.counters.invalidate();
        tracing::debug!(data_source = %id, "schema cache invalidated");
    }

    fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.inner.entry_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insightflow_model::{ColumnInfo, TableInfo};

    fn schema(id: &str) -> SchemaInfo {
        SchemaInfo::new(
            DataSourceId::new(id),
            vec![TableInfo::new(
                "sales",
                vec![ColumnInfo::new("amount", "numeric")],
            )],
        )
    }

    #[tokio::test]
    async fn put_then_get() {
        let cache = MokaSchemaCache::default();
        cache.put(schema("warehouse-1")).await;

        let found = cache.get(&DataSourceId::new("warehouse-1")).await;
        assert!(found.is_some());
        assert_eq!(found.unwrap().table_names(), vec!["sales"]);
    }

    #[tokio::test]
    async fn miss_for_unknown_source() {
        let cache = MokaSchemaCache::default();
        assert!(cache.get(&DataSourceId::new("nope")).await.is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn invalidation_drops_entry() {
        let cache = MokaSchemaCache::default();
        let id = DataSourceId::new("warehouse-1");
        cache.put(schema("warehouse-1")).await;
        assert!(cache.get(&id).await.is_some());

        cache.invalidate(&id).await;
        assert!(cache.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn ttl_expiry_forces_refetch() {
        let cache = MokaSchemaCache::new(
            SchemaCacheConfig::default().with_ttl(Duration::from_millis(40)),
        );
        cache.put(schema("warehouse-1")).await;
        let id = DataSourceId::new("warehouse-1");
        assert!(cache.get(&id).await.is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn stats_count_hits_and_inserts() {
        let cache = MokaSchemaCache::default();
        cache.put(schema("warehouse-1")).await;
        let id = DataSourceId::new("warehouse-1");
        cache.get(&id).await;
        cache.get(&id).await;

        let stats = cache.stats();
        assert_eq!(stats.inserts, 1);
        assert_eq!(stats.hits, 2);
    }
}
