//! insightflow core - query-to-insight orchestration
//!
//! The coordination pipeline that turns one natural-language question into
//! SQL, executes it, and produces a chart specification plus a narrative
//! summary:
//! - Stage executors over two injected capabilities (data access, language
//!   model)
//! - A classification-driven recovery policy (retry, one-shot fix, abort)
//! - Schema and query-result caching
//! - A visualization/insight fan-out with partial-result tolerance
//! - Confidence scoring and convergent result assembly
//!
//! # Example
//!
//! ```rust,ignore
//! use insightflow_core::prelude::*;
//!
//! # async fn example() {
//! let coordinator = WorkflowCoordinator::new(data, model, schema_cache, result_cache);
//! let request = WorkflowRequest::new("total sales by month")
//!     .with_data_source(DataSourceId::new("warehouse-1"));
//!
//! let result = coordinator.run(request).await;
//! assert!(result.presence_is_accurate());
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod capability;
pub mod classifier;
pub mod combiner;
pub mod coordinator;
pub mod error;
pub mod harness;
pub mod progress;
pub mod quality;
pub mod retry;
pub mod stages;

// Re-exports for convenience
pub use capability::{DataAccess, LanguageModel, PromptContext, PromptKind};
pub use classifier::{classify, user_message, ClassifyContext};
pub use combiner::{combine, ParallelOutcome, PrimaryOutcome};
pub use coordinator::{CoordinatorConfig, WorkflowCoordinator};
pub use error::{CapabilityError, RawFailure, SqlGuardError};
pub use progress::{ProgressEmitter, ProgressEvent};
pub use quality::{score, ScoredOutcome, StageStatsRegistry};
pub use retry::{backoff_delay, policy_for, RetryConfig, RetryPolicy};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running workflows
    pub use crate::{
        CoordinatorConfig, DataAccess, LanguageModel, ProgressEvent, WorkflowCoordinator,
    };
    pub use insightflow_cache::{
        MokaQueryResultCache, MokaSchemaCache, QueryResultCache, SchemaCache,
    };
    pub use insightflow_model::{
        CombinedResult, DataSourceId, ExecutionStrategy, WorkflowRequest,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
