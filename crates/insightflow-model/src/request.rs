//! Incoming workflow requests
//!
//! A `WorkflowRequest` is created per user question and is immutable for the
//! lifetime of one coordinator run. Absence of a data-source id selects the
//! conversational path: narration only, no query generation or execution.

use crate::ids::{ConversationId, DataSourceId};
use serde::{Deserialize, Serialize};

/// One user question plus the context needed to answer it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRequest {
    /// Natural-language question
    pub query: String,
    /// Data source to run against; `None` means nothing can be executed
    pub data_source_id: Option<DataSourceId>,
    /// Conversation this question belongs to
    pub conversation_id: Option<ConversationId>,
    /// Execution-strategy flags
    pub strategy: ExecutionStrategy,
}

impl WorkflowRequest {
    /// Create new request
    #[inline]
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            data_source_id: None,
            conversation_id: None,
            strategy: ExecutionStrategy::default(),
        }
    }

    /// With data source
    #[inline]
    #[must_use]
    pub fn with_data_source(mut self, id: DataSourceId) -> Self {
        self.data_source_id = Some(id);
        self
    }

    /// With conversation
    #[inline]
    #[must_use]
    pub fn with_conversation(mut self, id: ConversationId) -> Self {
        self.conversation_id = Some(id);
        self
    }

    /// With execution strategy
    #[inline]
    #[must_use]
    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Flags selecting how artifacts are produced
///
/// `combined_generation` collapses the visualization/insight fan-out into one
/// model call whose single payload carries chart, insights, and narration.
/// The combiner extracts identically from either layout.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExecutionStrategy {
    /// Prefer one combined artifact-generation call over separate stages
    pub combined_generation: bool,
}

impl ExecutionStrategy {
    /// Separate visualization/insight stages (the default)
    #[inline]
    #[must_use]
    pub fn separate() -> Self {
        Self {
            combined_generation: false,
        }
    }

    /// Single combined-generation call
    #[inline]
    #[must_use]
    pub fn combined() -> Self {
        Self {
            combined_generation: true,
        }
    }
}
