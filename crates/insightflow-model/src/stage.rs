//! Pipeline stages and execution paths

use serde::{Deserialize, Serialize};

/// Stages of one workflow run, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Request validation
    Validate,
    /// Schema snapshot retrieval (cacheable)
    SchemaRetrieval,
    /// SQL generation from the question
    QueryGeneration,
    /// Local checks on the generated SQL
    QueryValidation,
    /// Query execution (cacheable)
    QueryExecution,
    /// Shape/emptiness checks on the outcome
    ResultValidation,
    /// Chart specification generation (fan-out, left)
    VisualizationGeneration,
    /// Insight extraction (fan-out, right)
    InsightGeneration,
    /// Narrative summary
    NarrationSynthesis,
    /// Canonical result assembly
    Combine,
}

impl Stage {
    /// Progress through the pipeline when this stage begins, in percent
    #[must_use]
    pub fn percent_complete(self) -> u8 {
        match self {
            Stage::Validate => 5,
            Stage::SchemaRetrieval => 15,
            Stage::QueryGeneration => 30,
            Stage::QueryValidation => 40,
            Stage::QueryExecution => 55,
            Stage::ResultValidation => 65,
            Stage::VisualizationGeneration | Stage::InsightGeneration => 80,
            Stage::NarrationSynthesis => 90,
            Stage::Combine => 100,
        }
    }

    /// Human-readable stage label
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::SchemaRetrieval => "schema-retrieval",
            Stage::QueryGeneration => "query-generation",
            Stage::QueryValidation => "query-validation",
            Stage::QueryExecution => "query-execution",
            Stage::ResultValidation => "result-validation",
            Stage::VisualizationGeneration => "visualization-generation",
            Stage::InsightGeneration => "insight-generation",
            Stage::NarrationSynthesis => "narration-synthesis",
            Stage::Combine => "combine",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Stages a run may move to from `from`
///
/// Linear except: Validate can short-circuit to NarrationSynthesis
/// (conversational branch), ResultValidation can loop back to
/// QueryGeneration (empty-result regeneration) or skip the fan-out straight
/// to NarrationSynthesis ("no data"), and the fan-out pair both feed
/// NarrationSynthesis.
#[must_use]
pub fn allowed_transitions(from: Stage) -> Vec<Stage> {
    use Stage::*;
    match from {
        Validate => vec![SchemaRetrieval, NarrationSynthesis],
        SchemaRetrieval => vec![QueryGeneration],
        QueryGeneration => vec![QueryValidation],
        QueryValidation => vec![QueryExecution, QueryGeneration],
        QueryExecution => vec![ResultValidation],
        ResultValidation => vec![
            VisualizationGeneration,
            InsightGeneration,
            QueryGeneration,
            NarrationSynthesis,
        ],
        VisualizationGeneration => vec![NarrationSynthesis],
        InsightGeneration => vec![NarrationSynthesis],
        NarrationSynthesis => vec![Combine],
        Combine => vec![],
    }
}

/// Check a stage transition
#[must_use]
pub fn transition_allowed(from: Stage, to: Stage) -> bool {
    allowed_transitions(from).contains(&to)
}

/// Which execution path produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPath {
    /// No data source: narration only
    Conversational,
    /// Separate visualization/insight stages
    SeparateStages,
    /// Single combined artifact-generation call
    CombinedGeneration,
}

/// Wall-clock record for one stage of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    /// Which stage
    pub stage: Stage,
    /// Total duration including retries; effectively zero on a cache hit
    pub duration_ms: u64,
    /// Whether a cache satisfied the stage
    pub cache_hit: bool,
    /// Attempts made (1 on first success)
    pub attempts: u32,
}

impl StageTiming {
    /// Record for a stage satisfied from cache
    #[inline]
    #[must_use]
    pub fn cache_hit(stage: Stage) -> Self {
        Self {
            stage,
            duration_ms: 0,
            cache_hit: true,
            attempts: 0,
        }
    }

    /// Record for an executed stage
    #[inline]
    #[must_use]
    pub fn executed(stage: Stage, duration_ms: u64, attempts: u32) -> Self {
        Self {
            stage,
            duration_ms,
            cache_hit: false,
            attempts,
        }
    }
}
