//! Result combiner
//!
//! Terminal convergence point for every execution path. Whether artifacts
//! came from separate visualization/insight stages or from one combined
//! generation payload, the combiner extracts the same canonical fields using
//! a fixed priority order per field, then derives the presence map. Alias
//! ambiguity in model payloads stops here; nothing downstream sees raw keys.

use insightflow_model::{
    ChartSpec, CombinedResult, Insight, QueryOutcome, Recommendation, ResultMetadata,
};
use serde_json::Value;

/// Alias keys for the chart field, highest priority first
const CHART_KEYS: &[&str] = &["primary_chart", "chart_config", "chart"];
/// Alias keys for the insight list, highest priority first
const INSIGHT_KEYS: &[&str] = &["insights", "key_insights", "findings"];
/// Alias keys for the recommendation list, highest priority first
const RECOMMENDATION_KEYS: &[&str] = &["recommendations", "suggested_actions", "next_steps"];
/// Alias keys for narration inside a combined payload, highest priority first
const NARRATION_KEYS: &[&str] = &["narration", "summary", "explanation"];

/// Artifacts produced by the linear part of the pipeline
#[derive(Debug, Clone, Default)]
pub struct PrimaryOutcome {
    /// Whether the run reached a successful terminal state
    pub success: bool,
    /// Generated SQL
    pub sql: Option<String>,
    /// Execution outcome
    pub outcome: Option<QueryOutcome>,
    /// Narration from the dedicated synthesis stage
    pub narration: Option<String>,
}

/// One payload from a parallel or combined generation stage
#[derive(Debug, Clone)]
pub enum ParallelOutcome {
    /// Payload from the visualization stage
    Visualization(Value),
    /// Payload from the insight stage
    Insights(Value),
    /// Single payload carrying chart, insights, and narration together
    Combined(Value),
}

/// Merge a terminal state into the canonical result
///
/// Idempotent and path-agnostic: the same artifact content yields the same
/// field set whichever stage layout produced it. Chart and insight fields are
/// dropped unless the execution outcome is non-empty.
#[must_use]
pub fn combine(
    primary: PrimaryOutcome,
    parallel: &[ParallelOutcome],
    metadata: ResultMetadata,
) -> CombinedResult {
    let mut chart: Option<ChartSpec> = None;
    let mut insights: Option<Vec<Insight>> = None;
    let mut recommendations: Option<Vec<Recommendation>> = None;
    let mut payload_narration: Option<String> = None;

    for outcome in parallel {
        match outcome {
            ParallelOutcome::Visualization(payload) => {
                chart = chart.or_else(|| extract_chart(payload));
            }
            ParallelOutcome::Insights(payload) => {
                insights = insights.or_else(|| extract_insights(payload));
                recommendations = recommendations.or_else(|| extract_recommendations(payload));
            }
            ParallelOutcome::Combined(payload) => {
                chart = chart.or_else(|| extract_chart(payload));
                insights = insights.or_else(|| extract_insights(payload));
                recommendations = recommendations.or_else(|| extract_recommendations(payload));
                payload_narration = payload_narration.or_else(|| extract_narration(payload));
            }
        }
    }

    // chart/insights require rows to stand on
    let has_rows = primary
        .outcome
        .as_ref()
        .is_some_and(|o| o.row_count > 0);
    if !has_rows && (chart.is_some() || insights.is_some() || recommendations.is_some()) {
        tracing::warn!("dropping presentation artifacts produced without result rows");
        chart = None;
        insights = None;
        recommendations = None;
    }

    let narration = primary.narration.or(payload_narration);

    CombinedResult::assemble(
        primary.success,
        primary.sql,
        primary.outcome,
        chart,
        insights,
        recommendations,
        narration,
        metadata,
    )
}

/// Chart extraction with fixed key priority
#[must_use]
pub fn extract_chart(payload: &Value) -> Option<ChartSpec> {
    let candidate = first_present(payload, CHART_KEYS).or_else(|| {
        // a bare payload may itself be the chart object
        payload.get("chart_type").is_some().then_some(payload)
    })?;
    match serde_json::from_value::<ChartSpec>(candidate.clone()) {
        Ok(chart) => Some(chart),
        Err(e) => {
            tracing::debug!(error = %e, "chart payload did not parse");
            None
        }
    }
}

/// Insight extraction with fixed key priority
///
/// Accepts either structured insight objects or bare strings.
#[must_use]
pub fn extract_insights(payload: &Value) -> Option<Vec<Insight>> {
    let candidate = first_present(payload, INSIGHT_KEYS)?;
    let items = candidate.as_array()?;
    let insights: Vec<Insight> = items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(Insight::new(s.clone())),
            other => serde_json::from_value(other.clone()).ok(),
        })
        .collect();
    (!insights.is_empty()).then_some(insights)
}

/// Recommendation extraction with fixed key priority
#[must_use]
pub fn extract_recommendations(payload: &Value) -> Option<Vec<Recommendation>> {
    let candidate = first_present(payload, RECOMMENDATION_KEYS)?;
    let items = candidate.as_array()?;
    let recommendations: Vec<Recommendation> = items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(Recommendation {
                action: s.clone(),
                rationale: None,
            }),
            other => serde_json::from_value(other.clone()).ok(),
        })
        .collect();
    (!recommendations.is_empty()).then_some(recommendations)
}

/// Narration extraction with fixed key priority
#[must_use]
pub fn extract_narration(payload: &Value) -> Option<String> {
    first_present(payload, NARRATION_KEYS)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn first_present<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| payload.get(key))
        .filter(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use insightflow_model::{ExecutionPath, RunId};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn metadata() -> ResultMetadata {
        ResultMetadata::new(RunId::new(), ExecutionPath::SeparateStages)
    }

    fn rows() -> QueryOutcome {
        QueryOutcome::new(
            vec!["month".into(), "total".into()],
            vec![vec![json!("2026-01"), json!(10.0)]],
        )
    }

    fn chart_payload() -> Value {
        json!({
            "chart_type": "line",
            "title": "Total by month",
            "x_field": "month",
            "y_field": "total",
            "series": [
                {"name": "total", "points": [{"label": "2026-01", "value": 10.0}]}
            ]
        })
    }

    #[test]
    fn chart_alias_priority_is_fixed() {
        let payload = json!({
            "chart": {"chart_type": "bar", "series": []},
            "primary_chart": chart_payload(),
        });
        let chart = extract_chart(&payload).unwrap();
        assert_eq!(chart.title.as_deref(), Some("Total by month"));
    }

    #[test]
    fn separate_and_combined_layouts_produce_identical_presence() {
        let primary = PrimaryOutcome {
            success: true,
            sql: Some("SELECT month, SUM(amount) FROM sales GROUP BY month LIMIT 1000".into()),
            outcome: Some(rows()),
            narration: Some("Sales held steady.".into()),
        };

        let separate = combine(
            primary.clone(),
            &[
                ParallelOutcome::Visualization(json!({"primary_chart": chart_payload()})),
                ParallelOutcome::Insights(json!({"insights": ["January led the year"]})),
            ],
            metadata(),
        );

        let combined = combine(
            primary,
            &[ParallelOutcome::Combined(json!({
                "chart_config": chart_payload(),
                "key_insights": [{"headline": "January led the year"}],
            }))],
            metadata(),
        );

        assert_eq!(separate.fields_present, combined.fields_present);
        assert!(separate.has_field("chart_spec"));
        assert!(separate.has_field("insights"));
    }

    #[test]
    fn artifacts_without_rows_are_dropped() {
        let primary = PrimaryOutcome {
            success: true,
            sql: Some("SELECT 1 LIMIT 1".into()),
            outcome: Some(QueryOutcome::empty(vec!["month".into()])),
            narration: Some("No data found.".into()),
        };
        let result = combine(
            primary,
            &[ParallelOutcome::Visualization(json!({
                "chart": chart_payload()
            }))],
            metadata(),
        );

        assert!(result.chart_spec.is_none());
        assert!(!result.has_field("chart_spec"));
        assert!(result.has_field("narration"));
        assert!(result.presence_is_accurate());
    }

    #[test]
    fn string_insights_are_lifted_into_structs() {
        let payload = json!({"findings": ["a", "b"]});
        let insights = extract_insights(&payload).unwrap();
        assert_eq!(insights.len(), 2);
        assert_eq!(insights[0].headline, "a");
    }

    #[test]
    fn dedicated_narration_wins_over_payload_narration() {
        let primary = PrimaryOutcome {
            success: true,
            sql: Some("SELECT 1 LIMIT 1".into()),
            outcome: Some(rows()),
            narration: Some("from the synthesis stage".into()),
        };
        let result = combine(
            primary,
            &[ParallelOutcome::Combined(json!({
                "narration": "from the combined payload"
            }))],
            metadata(),
        );
        assert_eq!(result.narration.as_deref(), Some("from the synthesis stage"));
    }

    #[test]
    fn combine_is_idempotent_over_inputs() {
        let primary = PrimaryOutcome {
            success: true,
            sql: Some("SELECT 1 LIMIT 1".into()),
            outcome: Some(rows()),
            narration: Some("stable".into()),
        };
        let parallel = [ParallelOutcome::Combined(json!({
            "primary_chart": chart_payload(),
            "insights": ["one"],
        }))];

        let a = combine(primary.clone(), &parallel, metadata());
        let b = combine(primary, &parallel, metadata());
        assert_eq!(a.fields_present, b.fields_present);
        assert_eq!(a.chart_spec, b.chart_spec);
        assert_eq!(a.insights, b.insights);
    }
}
