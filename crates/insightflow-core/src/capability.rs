//! External capabilities
//!
//! The core consumes two collaborators, both injected behind traits so tests
//! can substitute scripted implementations:
//! - data access: schema retrieval and query execution
//! - a language-model service: one `generate` call used identically by every
//!   generation stage, opaque apart from latency and failure modes

use crate::error::CapabilityError;
use async_trait::async_trait;
use insightflow_model::{ConversationId, DataSourceId, QueryOutcome, SchemaInfo};

#[cfg(test)]
use mockall::automock;

/// Database-side collaborator
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DataAccess: Send + Sync {
    /// Fetch the schema snapshot for a data source
    async fn fetch_schema(&self, data_source: &DataSourceId)
        -> Result<SchemaInfo, CapabilityError>;

    /// Execute read-only SQL against a data source
    async fn execute_query(
        &self,
        data_source: &DataSourceId,
        sql: &str,
    ) -> Result<QueryOutcome, CapabilityError>;
}

/// Model-side collaborator
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate text for one prompt kind with the given context
    async fn generate(
        &self,
        kind: PromptKind,
        context: &PromptContext,
    ) -> Result<String, CapabilityError>;
}

/// Which generation the model is asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    /// Question + schema -> SQL
    QueryGeneration,
    /// Outcome -> chart specification JSON
    Visualization,
    /// Outcome -> insight list JSON
    Insights,
    /// Everything so far -> narrative summary
    Narration,
    /// Outcome -> one JSON payload with chart, insights, and narration
    CombinedArtifacts,
}

impl PromptKind {
    /// Stable label for logging
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::QueryGeneration => "query-generation",
            Self::Visualization => "visualization",
            Self::Insights => "insights",
            Self::Narration => "narration",
            Self::CombinedArtifacts => "combined-artifacts",
        }
    }
}

/// Context assembled for one model call
///
/// Only the fields relevant to the prompt kind are populated; the trait
/// implementation renders them however its provider needs.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    /// The user's question
    pub question: String,
    /// Conversation the question belongs to
    pub conversation_id: Option<ConversationId>,
    /// Schema snapshot, for query generation
    pub schema: Option<SchemaInfo>,
    /// Generated SQL, for narration
    pub sql: Option<String>,
    /// Execution outcome, for artifact generation
    pub outcome: Option<QueryOutcome>,
    /// Extra steering, e.g. "the previous query returned no rows"
    pub hint: Option<String>,
}

impl PromptContext {
    /// Context holding just the question
    #[must_use]
    pub fn for_question(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    /// With conversation
    #[inline]
    #[must_use]
    pub fn with_conversation(mut self, id: ConversationId) -> Self {
        self.conversation_id = Some(id);
        self
    }

    /// With schema snapshot
    #[inline]
    #[must_use]
    pub fn with_schema(mut self, schema: SchemaInfo) -> Self {
        self.schema = Some(schema);
        self
    }

    /// With generated SQL
    #[inline]
    #[must_use]
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    /// With execution outcome
    #[inline]
    #[must_use]
    pub fn with_outcome(mut self, outcome: QueryOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// With steering hint
    #[inline]
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_context_builder() {
        let ctx = PromptContext::for_question("total sales by month")
            .with_sql("SELECT 1")
            .with_hint("previous query returned no rows");

        assert_eq!(ctx.question, "total sales by month");
        assert_eq!(ctx.sql.as_deref(), Some("SELECT 1"));
        assert!(ctx.hint.is_some());
        assert!(ctx.schema.is_none());
    }

    #[tokio::test]
    async fn mock_language_model_is_usable() {
        let mut model = MockLanguageModel::new();
        model
            .expect_generate()
            .returning(|_, _| Ok("SELECT 1".to_string()));

        let out = model
            .generate(
                PromptKind::QueryGeneration,
                &PromptContext::for_question("q"),
            )
            .await
            .unwrap();
        assert_eq!(out, "SELECT 1");
    }
}
