//! Canonical workflow output
//!
//! Every execution path converges on `CombinedResult` before a response
//! leaves the core. The `fields_present` map is computed from the populated
//! fields in exactly one place so it can never drift from them.

use crate::artifacts::{ChartSpec, Insight, Recommendation};
use crate::classification::ErrorClassification;
use crate::ids::RunId;
use crate::outcome::QueryOutcome;
use crate::stage::{ExecutionPath, StageTiming};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Canonical response for one workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedResult {
    /// Whether the run produced what it set out to produce
    pub success: bool,
    /// Generated SQL
    pub sql: Option<String>,
    /// Execution outcome
    pub outcome: Option<QueryOutcome>,
    /// Chart specification
    pub chart_spec: Option<ChartSpec>,
    /// Insight list
    pub insights: Option<Vec<Insight>>,
    /// Recommendation list
    pub recommendations: Option<Vec<Recommendation>>,
    /// Narrative summary
    pub narration: Option<String>,
    /// Which optional fields above are populated
    pub fields_present: IndexMap<String, bool>,
    /// Run metadata
    pub metadata: ResultMetadata,
}

impl CombinedResult {
    /// Assemble a result; `fields_present` is derived from the fields
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        success: bool,
        sql: Option<String>,
        outcome: Option<QueryOutcome>,
        chart_spec: Option<ChartSpec>,
        insights: Option<Vec<Insight>>,
        recommendations: Option<Vec<Recommendation>>,
        narration: Option<String>,
        metadata: ResultMetadata,
    ) -> Self {
        let mut result = Self {
            success,
            sql,
            outcome,
            chart_spec,
            insights,
            recommendations,
            narration,
            fields_present: IndexMap::new(),
            metadata,
        };
        result.fields_present = result.compute_presence();
        result
    }

    /// Presence map derived from the current field values
    #[must_use]
    pub fn compute_presence(&self) -> IndexMap<String, bool> {
        let mut map = IndexMap::new();
        map.insert("sql".to_string(), self.sql.is_some());
        map.insert("rows".to_string(), self.outcome.is_some());
        map.insert("chart_spec".to_string(), self.chart_spec.is_some());
        map.insert("insights".to_string(), self.insights.is_some());
        map.insert(
            "recommendations".to_string(),
            self.recommendations.is_some(),
        );
        map.insert("narration".to_string(), self.narration.is_some());
        map
    }

    /// The stored presence map matches the fields
    #[must_use]
    pub fn presence_is_accurate(&self) -> bool {
        self.fields_present == self.compute_presence()
    }

    /// Convenience lookup into the presence map
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields_present.get(name).copied().unwrap_or(false)
    }
}

/// Execution metadata attached to every result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Run identifier
    pub run_id: RunId,
    /// Path that produced the result
    pub execution_path: ExecutionPath,
    /// Per-stage timings in completion order
    pub stage_timings: Vec<StageTiming>,
    /// Confidence score in [0,1]
    pub confidence: f32,
    /// Classification of the terminating failure, if the run failed
    pub classification: Option<ErrorClassification>,
    /// Short, non-technical message for the user (failures and edge cases)
    pub message: Option<String>,
}

impl ResultMetadata {
    /// Metadata for a run that has not yet accumulated timings
    #[must_use]
    pub fn new(run_id: RunId, execution_path: ExecutionPath) -> Self {
        Self {
            run_id,
            execution_path,
            stage_timings: Vec::new(),
            confidence: 0.0,
            classification: None,
            message: None,
        }
    }

    /// Sum of stage durations
    #[must_use]
    pub fn total_duration_ms(&self) -> u64 {
        self.stage_timings.iter().map(|t| t.duration_ms).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Stage;

    fn metadata() -> ResultMetadata {
        ResultMetadata::new(RunId::new(), ExecutionPath::SeparateStages)
    }

    #[test]
    fn presence_map_tracks_fields() {
        let result = CombinedResult::assemble(
            true,
            Some("SELECT 1".into()),
            None,
            None,
            None,
            None,
            Some("narration".into()),
            metadata(),
        );

        assert!(result.has_field("sql"));
        assert!(result.has_field("narration"));
        assert!(!result.has_field("chart_spec"));
        assert!(!result.has_field("rows"));
        assert!(result.presence_is_accurate());
    }

    #[test]
    fn tampered_presence_map_is_detected() {
        let mut result =
            CombinedResult::assemble(true, None, None, None, None, None, None, metadata());
        result.fields_present.insert("chart_spec".into(), true);
        assert!(!result.presence_is_accurate());
    }

    proptest::proptest! {
        #[test]
        fn assembled_results_always_have_accurate_presence(
            with_sql in proptest::prelude::any::<bool>(),
            with_narration in proptest::prelude::any::<bool>(),
            success in proptest::prelude::any::<bool>(),
        ) {
            let result = CombinedResult::assemble(
                success,
                with_sql.then(|| "SELECT 1".to_string()),
                None,
                None,
                None,
                None,
                with_narration.then(|| "words".to_string()),
                metadata(),
            );
            proptest::prop_assert!(result.presence_is_accurate());
            proptest::prop_assert_eq!(result.has_field("sql"), with_sql);
            proptest::prop_assert_eq!(result.has_field("narration"), with_narration);
        }
    }

    #[test]
    fn total_duration_sums_stages() {
        let mut md = metadata();
        md.stage_timings
            .push(StageTiming::executed(Stage::QueryGeneration, 120, 1));
        md.stage_timings
            .push(StageTiming::executed(Stage::QueryExecution, 80, 2));
        md.stage_timings.push(StageTiming::cache_hit(Stage::SchemaRetrieval));
        assert_eq!(md.total_duration_ms(), 200);
    }
}
