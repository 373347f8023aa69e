//! Push-based cache invalidation
//!
//! The upstream data-source service emits an event when a source is updated
//! or deleted; both caches drop everything keyed by that source.

use crate::result_cache::QueryResultCache;
use crate::schema_cache::SchemaCache;
use insightflow_model::DataSourceId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Lifecycle event for a connected data source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSourceEvent {
    /// Source content or schema changed
    Updated(DataSourceId),
    /// Source was removed
    Deleted(DataSourceId),
}

impl DataSourceEvent {
    /// The affected data source
    #[inline]
    #[must_use]
    pub fn data_source(&self) -> &DataSourceId {
        match self {
            Self::Updated(id) | Self::Deleted(id) => id,
        }
    }
}

/// Apply one event to both caches
pub async fn apply_event(
    schema_cache: &Arc<dyn SchemaCache>,
    result_cache: &Arc<dyn QueryResultCache>,
    event: &DataSourceEvent,
) {
    let id = event.data_source();
    tracing::info!(data_source = %id, event = ?event, "invalidating caches");
    schema_cache.invalidate(id).await;
    result_cache.invalidate_data_source(id).await;
}

/// Spawn a task draining `events` into cache invalidations
///
/// The task ends when the sender side is dropped.
pub fn spawn_invalidation_listener(
    schema_cache: Arc<dyn SchemaCache>,
    result_cache: Arc<dyn QueryResultCache>,
    mut events: mpsc::Receiver<DataSourceEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            apply_event(&schema_cache, &result_cache, &event).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::QueryKey;
    use crate::result_cache::MokaQueryResultCache;
    use crate::schema_cache::MokaSchemaCache;
    use insightflow_model::{ColumnInfo, QueryOutcome, SchemaInfo, TableInfo};

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
    async fn listener_clears_both_caches() {
        let schema_cache: Arc<dyn SchemaCache> = Arc::new(MokaSchemaCache::default());
        let result_cache: Arc<dyn QueryResultCache> =
            Arc::new(MokaQueryResultCache::default());
        let id = DataSourceId::new("warehouse-1");
        let key = QueryKey::new(id.clone(), "select amount from sales");

        schema_cache.put(schema("warehouse-1")).await;
        result_cache
            .put(
                key.clone(),
                QueryOutcome::new(vec!["amount".into()], vec![vec![serde_json::json!(1)]]),
            )
            .await;

        let (tx, rx) = mpsc::channel(8);
        let handle =
            spawn_invalidation_listener(schema_cache.clone(), result_cache.clone(), rx);

        tx.send(DataSourceEvent::Updated(id.clone())).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        assert!(schema_cache.get(&id).await.is_none());
        assert!(result_cache.get(&key).await.is_none());
    }
}
