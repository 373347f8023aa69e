//! Quality scoring
//!
//! The scorer annotates result metadata with a confidence value; it never
//! gates control flow. Historical per-stage success rates are the only state
//! shared across runs and live in a concurrent registry.

use dashmap::DashMap;
use insightflow_model::{ChartSpec, ExecutionPath, Insight, QueryOutcome, Stage};

/// Rolling attempt/success counters for one stage kind
#[derive(Debug, Clone, Copy, Default)]
pub struct StageCounters {
    /// Attempts recorded
    pub attempts: u64,
    /// Successful attempts
    pub successes: u64,
}

impl StageCounters {
    /// Laplace-smoothed success rate, stable for small samples
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        (self.successes as f64 + 1.0) / (self.attempts as f64 + 2.0)
    }
}

/// Cross-run per-stage statistics registry
#[derive(Debug, Default)]
pub struct StageStatsRegistry {
    inner: DashMap<Stage, StageCounters>,
}

impl StageStatsRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one attempt for `stage`
    pub fn record(&self, stage: Stage, success: bool) {
        let mut counters = self.inner.entry(stage).or_default();
        counters.attempts += 1;
        if success {
            counters.successes += 1;
        }
    }

    /// Smoothed historical success rate for `stage`
    #[must_use]
    pub fn success_rate(&self, stage: Stage) -> f64 {
        self.inner
            .get(&stage)
            .map(|c| c.success_rate())
            .unwrap_or(0.5)
    }

    /// Counters for `stage`, if any were recorded
    #[must_use]
    pub fn counters(&self, stage: Stage) -> Option<StageCounters> {
        self.inner.get(&stage).map(|c| *c)
    }
}

/// View of the artifacts a finished run produced, for scoring
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoredOutcome<'a> {
    /// Which path ran
    pub path: Option<ExecutionPath>,
    /// Generated SQL
    pub sql: Option<&'a str>,
    /// Execution outcome
    pub outcome: Option<&'a QueryOutcome>,
    /// Chart specification
    pub chart: Option<&'a ChartSpec>,
    /// Insight list
    pub insights: Option<&'a [Insight]>,
    /// Narrative summary
    pub narration: Option<&'a str>,
}

/// Confidence score in [0,1]
///
/// Blends field completeness for the path, plausibility of the artifact
/// shapes, a mild latency damping, and the historical success rate.
#[must_use]
pub fn score(
    outcome: &ScoredOutcome<'_>,
    execution_time_ms: u64,
    historical_success_rate: f64,
) -> f32 {
    let completeness = completeness_term(outcome);
    let plausibility = plausibility_term(outcome);
    let latency = latency_term(execution_time_ms);

    let intrinsic = 0.5 * completeness + 0.3 * plausibility + 0.2 * latency;
    let blended = 0.8 * intrinsic + 0.2 * historical_success_rate.clamp(0.0, 1.0) as f32;
    blended.clamp(0.0, 1.0)
}

fn completeness_term(outcome: &ScoredOutcome<'_>) -> f32 {
    let expected = match outcome.path {
        Some(ExecutionPath::Conversational) => vec![outcome.narration.is_some()],
        _ => vec![
            outcome.sql.is_some(),
            outcome.outcome.is_some(),
            outcome.chart.is_some(),
            outcome.insights.is_some(),
            outcome.narration.is_some(),
        ],
    };
    let present = expected.iter().filter(|p| **p).count();
    present as f32 / expected.len() as f32
}

fn plausibility_term(outcome: &ScoredOutcome<'_>) -> f32 {
    let mut checks = 0u32;
    let mut passed = 0u32;

    if let Some(rows) = outcome.outcome {
        checks += 1;
        if rows.is_well_formed() && !rows.is_empty() {
            passed += 1;
        }
    }
    if let Some(chart) = outcome.chart {
        checks += 1;
        if chart.has_data() {
            passed += 1;
        }
    }
    if let Some(insights) = outcome.insights {
        checks += 1;
        if !insights.is_empty() && insights.iter().all(|i| !i.headline.trim().is_empty()) {
            passed += 1;
        }
    }
    if let Some(narration) = outcome.narration {
        checks += 1;
        if narration.len() >= 20 {
            passed += 1;
        }
    }

    if checks == 0 {
        0.0
    } else {
        passed as f32 / checks as f32
    }
}

fn latency_term(execution_time_ms: u64) -> f32 {
    // full credit under 2s, sliding to a floor at 30s+
    match execution_time_ms {
        0..=2_000 => 1.0,
        ms if ms >= 30_000 => 0.5,
        ms => 1.0 - 0.5 * ((ms - 2_000) as f32 / 28_000.0),
    }
}
