//! Presentation artifacts produced from an execution outcome
//!
//! These are specifications, not rendered output: a `ChartSpec` describes a
//! chart for a downstream renderer, an `Insight` is one narrative finding.

use serde::{Deserialize, Serialize};

/// Chart family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    /// Time series / trend
    Line,
    /// Categorical comparison
    Bar,
    /// Stacked trend
    Area,
    /// Part-to-whole
    Pie,
    /// Correlation
    Scatter,
    /// Plain tabular fallback
    Table,
}

/// Renderer-agnostic chart specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    /// Chart family
    pub chart_type: ChartType,
    /// Chart title
    #[serde(default)]
    pub title: Option<String>,
    /// Column driving the x axis
    #[serde(default)]
    pub x_field: Option<String>,
    /// Column driving the y axis
    #[serde(default)]
    pub y_field: Option<String>,
    /// Data series
    #[serde(default)]
    pub series: Vec<Series>,
}

impl ChartSpec {
    /// Spec has at least one non-empty series
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.series.iter().any(|s| !s.points.is_empty())
    }
}

/// One named series of points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    /// Series label
    pub name: String,
    /// Points in axis order
    pub points: Vec<DataPoint>,
}

/// One point of a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Category or timestamp label
    pub label: String,
    /// Numeric value
    pub value: f64,
}

/// One narrative finding about the result set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    /// Short statement of the finding
    pub headline: String,
    /// Supporting detail
    #[serde(default)]
    pub detail: Option<String>,
    /// Relative importance in [0,1]
    #[serde(default)]
    pub importance: Option<f32>,
}

impl Insight {
    /// Create insight from a headline
    #[inline]
    #[must_use]
    pub fn new(headline: impl Into<String>) -> Self {
        Self {
            headline: headline.into(),
            detail: None,
            importance: None,
        }
    }
}

/// Suggested follow-up action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// What to do
    pub action: String,
    /// Why it follows from the data
    #[serde(default)]
    pub rationale: Option<String>,
}
