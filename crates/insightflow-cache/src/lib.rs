//! insightflow caches
//!
//! Concurrent, time-bound caches shared across workflow runs:
//! - `SchemaCache`: per-data-source schema snapshots, long TTL, explicit
//!   invalidation on data-source mutation
//! - `QueryResultCache`: executed-query outcomes keyed by a normalized-query
//!   fingerprint, short TTL, size-capped values, bounded entry count
//!
//! Both are injected, interface-typed services constructed once at process
//! start; tests substitute their own implementations behind the traits.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod entry;
pub mod fingerprint;
pub mod invalidation;
pub mod result_cache;
pub mod schema_cache;
pub mod stats;

// Re-exports for convenience
pub use entry::CacheEntry;
pub use fingerprint::{normalize_query, QueryKey};
pub use invalidation::{apply_event, spawn_invalidation_listener, DataSourceEvent};
pub use result_cache::{MokaQueryResultCache, QueryResultCache, QueryResultCacheConfig};
pub use schema_cache::{MokaSchemaCache, SchemaCache, SchemaCacheConfig};
pub use stats::CacheStats;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
