//! insightflow data model
//!
//! Typed model shared by the cache and orchestration crates:
//! - Identifiers (runs, conversations, data sources)
//! - The immutable per-question `WorkflowRequest`
//! - Schema snapshots and query outcomes
//! - Presentation artifacts (chart specs, insights, recommendations)
//! - Failure classifications and retry-strategy tags
//! - Pipeline stages and the mutable per-run `WorkflowState`
//! - The canonical `CombinedResult` every path converges on

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod artifacts;
pub mod classification;
pub mod ids;
pub mod outcome;
pub mod request;
pub mod result;
pub mod schema;
pub mod stage;
pub mod state;

// Re-exports for convenience
pub use artifacts::{ChartSpec, ChartType, DataPoint, Insight, Recommendation, Series};
pub use classification::{
    ErrorCategory, ErrorClassification, Recoverability, RetryStrategy, Severity,
};
pub use ids::{ConversationId, DataSourceId, RunId};
pub use outcome::QueryOutcome;
pub use request::{ExecutionStrategy, WorkflowRequest};
pub use result::{CombinedResult, ResultMetadata};
pub use schema::{ColumnInfo, SchemaInfo, TableInfo};
pub use stage::{allowed_transitions, transition_allowed, ExecutionPath, Stage, StageTiming};
pub use state::WorkflowState;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
