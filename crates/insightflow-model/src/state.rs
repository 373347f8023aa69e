//! Mutable state of one in-flight workflow run
//!
//! A `WorkflowState` is owned exclusively by the coordinator task driving the
//! run; stages never mutate it concurrently. It is dropped when the run
//! terminates.

use crate::artifacts::{ChartSpec, Insight, Recommendation};
use crate::classification::ErrorClassification;
use crate::ids::RunId;
use crate::outcome::QueryOutcome;
use crate::schema::SchemaInfo;
use crate::stage::{ExecutionPath, Stage, StageTiming};
use std::collections::{HashMap, HashSet};

/// Accumulated artifacts and bookkeeping for one run
#[derive(Debug)]
pub struct WorkflowState {
    /// Run identifier
    pub run_id: RunId,
    /// Current stage
    pub stage: Stage,
    /// Progress at the current stage boundary
    pub percent_complete: u8,
    /// Which path this run took
    pub path: ExecutionPath,
    /// Schema snapshot
    pub schema: Option<SchemaInfo>,
    /// Generated SQL
    pub sql: Option<String>,
    /// Execution outcome
    pub outcome: Option<QueryOutcome>,
    /// Chart specification (only with a non-empty outcome)
    pub chart: Option<ChartSpec>,
    /// Insight list (only with a non-empty outcome)
    pub insights: Option<Vec<Insight>>,
    /// Recommendations
    pub recommendations: Option<Vec<Recommendation>>,
    /// Narrative summary
    pub narration: Option<String>,
    /// Every classified failure observed, in order
    pub errors: Vec<ErrorClassification>,
    /// Stage timings, in completion order
    pub timings: Vec<StageTiming>,
    retries: HashMap<Stage, u32>,
    fixes_applied: HashSet<Stage>,
}

impl WorkflowState {
    /// Fresh state for a new run
    #[must_use]
    pub fn new(run_id: RunId, path: ExecutionPath) -> Self {
        Self {
            run_id,
            stage: Stage::Validate,
            percent_complete: 0,
            path,
            schema: None,
            sql: None,
            outcome: None,
            chart: None,
            insights: None,
            recommendations: None,
            narration: None,
            errors: Vec::new(),
            timings: Vec::new(),
            retries: HashMap::new(),
            fixes_applied: HashSet::new(),
        }
    }

    /// Move to `stage`, updating progress
    pub fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        self.percent_complete = stage.percent_complete();
    }

    /// Retries consumed so far for `stage`
    #[inline]
    #[must_use]
    pub fn retries(&self, stage: Stage) -> u32 {
        self.retries.get(&stage).copied().unwrap_or(0)
    }

    /// Count one retry for `stage`; returns the new count
    pub fn count_retry(&mut self, stage: Stage) -> u32 {
        let counter = self.retries.entry(stage).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Whether the one-shot automatic fix was already spent for `stage`
    #[inline]
    #[must_use]
    pub fn fix_applied(&self, stage: Stage) -> bool {
        self.fixes_applied.contains(&stage)
    }

    /// Spend the one-shot automatic fix for `stage`
    pub fn mark_fix_applied(&mut self, stage: Stage) {
        self.fixes_applied.insert(stage);
    }

    /// Append a classified failure
    pub fn record_error(&mut self, classification: ErrorClassification) {
        self.errors.push(classification);
    }

    /// Append a stage timing
    pub fn record_timing(&mut self, timing: StageTiming) {
        self.timings.push(timing);
    }

    /// The outcome exists, is well-formed, and has rows
    #[must_use]
    pub fn has_usable_outcome(&self) -> bool {
        self.outcome
            .as_ref()
            .is_some_and(|o| o.is_well_formed() && !o.is_empty())
    }

    /// Most severe classification observed, if any failed
    #[must_use]
    pub fn worst_error(&self) -> Option<&ErrorClassification> {
        self.errors.iter().max_by_key(|e| e.severity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::{ErrorCategory, Recoverability, Severity};

    fn classification(severity: Severity) -> ErrorClassification {
        ErrorClassification::new(
            ErrorCategory::Execution,
            "query-failed",
            severity,
            Recoverability::Retryable,
            "Retry the query",
        )
    }

    #[test]
    fn retry_counting_is_per_stage() {
        let mut state = WorkflowState::new(RunId::new(), ExecutionPath::SeparateStages);
        assert_eq!(state.retries(Stage::QueryExecution), 0);
        assert_eq!(state.count_retry(Stage::QueryExecution), 1);
        assert_eq!(state.count_retry(Stage::QueryExecution), 2);
        assert_eq!(state.retries(Stage::QueryGeneration), 0);
    }

    #[test]
    fn fix_is_one_shot_per_stage() {
        let mut state = WorkflowState::new(RunId::new(), ExecutionPath::SeparateStages);
        assert!(!state.fix_applied(Stage::QueryValidation));
        state.mark_fix_applied(Stage::QueryValidation);
        assert!(state.fix_applied(Stage::QueryValidation));
        assert!(!state.fix_applied(Stage::QueryGeneration));
    }

    #[test]
    fn worst_error_picks_highest_severity() {
        let mut state = WorkflowState::new(RunId::new(), ExecutionPath::SeparateStages);
        state.record_error(classification(Severity::Medium));
        state.record_error(classification(Severity::High));
        state.record_error(classification(Severity::Low));
        assert_eq!(state.worst_error().unwrap().severity, Severity::High);
    }

    #[test]
    fn usable_outcome_requires_rows() {
        let mut state = WorkflowState::new(RunId::new(), ExecutionPath::SeparateStages);
        assert!(!state.has_usable_outcome());

        state.outcome = Some(QueryOutcome::empty(vec!["a".into()]));
        assert!(!state.has_usable_outcome());

        state.outcome = Some(QueryOutcome::new(
            vec!["a".into()],
            vec![vec![serde_json::json!(1)]],
        ));
        assert!(state.has_usable_outcome());
    }
}
