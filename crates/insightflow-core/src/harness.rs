//! Scripted capabilities
//!
//! In-memory stand-ins for the two external collaborators, used by the
//! integration tests and the demo binary. Responses can be queued per prompt
//! kind or data source to inject failures; unqueued calls fall back to the
//! canned "monthly sales" fixtures.

use crate::capability::{DataAccess, LanguageModel, PromptContext, PromptKind};
use crate::error::CapabilityError;
use async_trait::async_trait;
use insightflow_model::{ColumnInfo, DataSourceId, QueryOutcome, SchemaInfo, TableInfo};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

const MONTHS: &[&str] = &[
    "2026-01", "2026-02", "2026-03", "2026-04", "2026-05", "2026-06", "2026-07", "2026-08",
    "2026-09", "2026-10", "2026-11", "2026-12",
];

/// Schema fixture: one `sales(date, amount, region)` table
#[must_use]
pub fn sales_schema(data_source: DataSourceId) -> SchemaInfo {
    SchemaInfo::new(
        data_source,
        vec![TableInfo::new(
            "sales",
            vec![
                ColumnInfo::new("date", "date").not_null(),
                ColumnInfo::new("amount", "numeric").not_null(),
                ColumnInfo::new("region", "text"),
            ],
        )],
    )
}

/// Outcome fixture: twelve monthly totals
#[must_use]
pub fn monthly_sales_outcome() -> QueryOutcome {
    QueryOutcome::new(
        vec!["month".into(), "total".into()],
        MONTHS
            .iter()
            .enumerate()
            .map(|(i, month)| vec![json!(month), json!(1000.0 + 250.0 * i as f64)])
            .collect(),
    )
}

/// Chart payload fixture matching the monthly outcome
#[must_use]
pub fn monthly_chart_payload() -> Value {
    json!({
        "primary_chart": {
            "chart_type": "line",
            "title": "Total sales by month",
            "x_field": "month",
            "y_field": "total",
            "series": [{
                "name": "total",
                "points": MONTHS.iter().enumerate().map(|(i, month)| json!({
                    "label": month,
                    "value": 1000.0 + 250.0 * i as f64
                })).collect::<Vec<_>>()
            }]
        }
    })
}

/// Insight payload fixture matching the monthly outcome
#[must_use]
pub fn monthly_insights_payload() -> Value {
    json!({
        "insights": [
            {"headline": "Sales grew every month", "importance": 0.9},
            {"headline": "December was the strongest month", "detail": "3750.0 total"}
        ],
        "recommendations": ["Keep the December campaign running"]
    })
}

/// Combined payload fixture: chart, insights, and narration in one document
#[must_use]
pub fn combined_payload() -> Value {
    let mut payload = monthly_insights_payload();
    if let Value::Object(map) = &mut payload {
        if let Value::Object(chart) = monthly_chart_payload() {
            map.extend(chart);
        }
        map.insert(
            "narration".into(),
            json!("Sales climbed steadily through the year, ending at their December peak."),
        );
    }
    payload
}

const DEFAULT_SQL: &str =
    "SELECT month, SUM(amount) AS total FROM sales GROUP BY month ORDER BY month LIMIT 1000";

const DEFAULT_NARRATION: &str =
    "Sales climbed steadily through the year, ending at their December peak.";

/// Scripted language model
///
/// Queued responses are consumed first; otherwise each prompt kind falls back
/// to its canned default.
pub struct ScriptedModel {
    queued: Mutex<HashMap<PromptKind, VecDeque<Result<String, CapabilityError>>>>,
    calls: Mutex<Vec<PromptKind>>,
}

impl ScriptedModel {
    /// Model answering every prompt kind with the sales fixtures
    #[must_use]
    pub fn new() -> Self {
        Self {
            queued: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue one response for a prompt kind
    pub fn enqueue(&self, kind: PromptKind, response: Result<String, CapabilityError>) {
        self.queued.lock().entry(kind).or_default().push_back(response);
    }

    /// Queue a successful text response
    pub fn enqueue_ok(&self, kind: PromptKind, text: impl Into<String>) {
        self.enqueue(kind, Ok(text.into()));
    }

    /// Queue a failure
    pub fn enqueue_err(&self, kind: PromptKind, error: CapabilityError) {
        self.enqueue(kind, Err(error));
    }

    /// Prompt kinds called, in order
    #[must_use]
    pub fn calls(&self) -> Vec<PromptKind> {
        self.calls.lock().clone()
    }

    /// Calls made for one prompt kind
    #[must_use]
    pub fn call_count(&self, kind: PromptKind) -> usize {
        self.calls.lock().iter().filter(|k| **k == kind).count()
    }

    fn default_response(kind: PromptKind) -> String {
        match kind {
            PromptKind::QueryGeneration => DEFAULT_SQL.to_string(),
            PromptKind::Visualization => monthly_chart_payload().to_string(),
            PromptKind::Insights => monthly_insights_payload().to_string(),
            PromptKind::Narration => DEFAULT_NARRATION.to_string(),
            PromptKind::CombinedArtifacts => combined_payload().to_string(),
        }
    }
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(
        &self,
        kind: PromptKind,
        _context: &PromptContext,
    ) -> Result<String, CapabilityError> {
        self.calls.lock().push(kind);
        if let Some(queued) = self.queued.lock().get_mut(&kind).and_then(VecDeque::pop_front) {
            return queued;
        }
        Ok(Self::default_response(kind))
    }
}

/// In-memory data access with call counting
pub struct StaticDataAccess {
    schemas: Mutex<HashMap<DataSourceId, SchemaInfo>>,
    defaults: Mutex<HashMap<DataSourceId, QueryOutcome>>,
    queued: Mutex<HashMap<DataSourceId, VecDeque<Result<QueryOutcome, CapabilityError>>>>,
    schema_fetches: AtomicUsize,
    query_executions: AtomicUsize,
}

impl StaticDataAccess {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            schemas: Mutex::new(HashMap::new()),
            defaults: Mutex::new(HashMap::new()),
            queued: Mutex::new(HashMap::new()),
            schema_fetches: AtomicUsize::new(0),
            query_executions: AtomicUsize::new(0),
        }
    }

    /// Store answering "total sales by month" against `data_source`
    #[must_use]
    pub fn with_sales_fixture(data_source: &DataSourceId) -> Self {
        let store = Self::new();
        store.put_schema(sales_schema(data_source.clone()));
        store.put_default_result(data_source.clone(), monthly_sales_outcome());
        store
    }

    /// Register a schema
    pub fn put_schema(&self, schema: SchemaInfo) {
        self.schemas
            .lock()
            .insert(schema.data_source.clone(), schema);
    }

    /// Register the fallback outcome for a data source
    pub fn put_default_result(&self, data_source: DataSourceId, outcome: QueryOutcome) {
        self.defaults.lock().insert(data_source, outcome);
    }

    /// Queue one execution result (failure injection)
    pub fn enqueue_result(
        &self,
        data_source: DataSourceId,
        result: Result<QueryOutcome, CapabilityError>,
    ) {
        self.queued
            .lock()
            .entry(data_source)
            .or_default()
            .push_back(result);
    }

    /// Schema fetches observed
    #[must_use]
    pub fn schema_fetches(&self) -> usize {
        self.schema_fetches.load(Ordering::SeqCst)
    }

    /// Query executions observed
    #[must_use]
    pub fn query_executions(&self) -> usize {
        self.query_executions.load(Ordering::SeqCst)
    }
}

impl Default for StaticDataAccess {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataAccess for StaticDataAccess {
    async fn fetch_schema(
        &self,
        data_source: &DataSourceId,
    ) -> Result<SchemaInfo, CapabilityError> {
        self.schema_fetches.fetch_add(1, Ordering::SeqCst);
        self.schemas.lock().get(data_source).cloned().ok_or_else(|| {
            CapabilityError::SourceUnavailable(format!("data source {data_source} is not connected"))
        })
    }

    async fn execute_query(
        &self,
        data_source: &DataSourceId,
        _sql: &str,
    ) -> Result<QueryOutcome, CapabilityError> {
        self.query_executions.fetch_add(1, Ordering::SeqCst);
        if let Some(queued) = self
            .queued
            .lock()
            .get_mut(data_source)
            .and_then(VecDeque::pop_front)
        {
            return queued;
        }
        self.defaults.lock().get(data_source).cloned().ok_or_else(|| {
            CapabilityError::QueryFailed(r#"relation "sales" does not exist"#.into())
        })
    }
}
