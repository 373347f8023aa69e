//! Error classifier
//!
//! Pure, deterministic mapping from a raw failure plus execution context to a
//! structured classification. Category comes first (failing stage + message
//! shape), then subtype, then severity and recoverability; the retry-strategy
//! tag is derived from recoverability by the model type itself.

use crate::error::{CapabilityError, RawFailure, SqlGuardError};
use insightflow_model::{
    DataSourceId, ErrorCategory, ErrorClassification, Recoverability, Severity, Stage,
};
use once_cell::sync::Lazy;
use regex::Regex;

static MISSING_RELATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)relation "([^"]+)" does not exist|no such table:?\s*([A-Za-z_][A-Za-z0-9_.]*)|table '([^']+)' doesn't exist"#,
    )
    .unwrap()
});

static MISSING_COLUMN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)column "?([A-Za-z_][A-Za-z0-9_.]*)"? does not exist|unknown column '?([^'\s]+)'?"#)
        .unwrap()
});

/// Context the classifier sees alongside the raw failure
#[derive(Debug, Clone)]
pub struct ClassifyContext {
    /// Stage that failed
    pub stage: Stage,
    /// Data source in play, when any
    pub data_source: Option<DataSourceId>,
}

impl ClassifyContext {
    /// Context for a stage with no data source
    #[inline]
    #[must_use]
    pub fn for_stage(stage: Stage) -> Self {
        Self {
            stage,
            data_source: None,
        }
    }

    /// With data source
    #[inline]
    #[must_use]
    pub fn with_data_source(mut self, id: DataSourceId) -> Self {
        self.data_source = Some(id);
        self
    }
}

/// Classify a raw failure
///
/// Deterministic given the same inputs; safe to call from any stage.
#[must_use]
pub fn classify(failure: &RawFailure, ctx: &ClassifyContext) -> ErrorClassification {
    match failure {
        RawFailure::InvalidRequest(msg) => ErrorClassification::new(
            ErrorCategory::Validation,
            "invalid-request",
            Severity::Medium,
            Recoverability::RequiresInput,
            format!("Provide a question to analyze ({msg})"),
        ),
        RawFailure::SqlGuard(guard) => classify_guard(guard),
        RawFailure::EmptyResult => ErrorClassification::new(
            ErrorCategory::Execution,
            "empty-result",
            Severity::Info,
            Recoverability::Retryable,
            "No rows matched; broaden the question or the date range",
        ),
        RawFailure::MalformedResult(msg) => ErrorClassification::new(
            ErrorCategory::Execution,
            "malformed-result",
            Severity::Medium,
            Recoverability::Retryable,
            format!("The data source returned an inconsistent result ({msg}); try again"),
        ),
        RawFailure::UnparseableArtifact(msg) => ErrorClassification::new(
            ErrorCategory::Generation,
            "unparseable-artifact",
            Severity::Medium,
            Recoverability::Retryable,
            format!("Generated output could not be used ({msg}); regenerating"),
        ),
        RawFailure::Capability(e) => classify_capability(e, ctx),
    }
}

fn classify_guard(guard: &SqlGuardError) -> ErrorClassification {
    match guard {
        SqlGuardError::Empty => ErrorClassification::new(
            ErrorCategory::Generation,
            "empty-query",
            Severity::Medium,
            Recoverability::Retryable,
            "The model produced no query; regenerating",
        ),
        SqlGuardError::NonReadStatement(stmt) => ErrorClassification::new(
            ErrorCategory::Validation,
            "non-read-statement",
            Severity::High,
            Recoverability::RequiresInput,
            format!("Only read-only queries can run; a {stmt} statement was generated. Rephrase the question as a lookup"),
        ),
        SqlGuardError::MissingLimit => ErrorClassification::new(
            ErrorCategory::Validation,
            "missing-limit",
            Severity::Low,
            Recoverability::AutomaticFixable,
            "A default row limit will be added to the query",
        ),
    }
}

fn classify_capability(error: &CapabilityError, ctx: &ClassifyContext) -> ErrorClassification {
    match error {
        CapabilityError::Connection(msg) => ErrorClassification::new(
            ErrorCategory::Connectivity,
            "connection-failed",
            Severity::High,
            Recoverability::Retryable,
            format!(
                "Could not reach {}; check connectivity and try again ({msg})",
                source_name(ctx)
            ),
        ),
        CapabilityError::PermissionDenied(_) => ErrorClassification::new(
            ErrorCategory::Permission,
            "permission-denied",
            Severity::High,
            Recoverability::RequiresInput,
            format!("Grant read access to {} and retry", source_name(ctx)),
        ),
        CapabilityError::SourceUnavailable(msg) => ErrorClassification::new(
            ErrorCategory::DataAccess,
            "source-unavailable",
            Severity::High,
            Recoverability::RequiresInput,
            format!("Reconnect {} before querying it ({msg})", source_name(ctx)),
        ),
        CapabilityError::Timeout(d) => ErrorClassification::new(
            ErrorCategory::Timeout,
            "deadline-exceeded",
            Severity::Medium,
            Recoverability::Retryable,
            format!("The {} stage took longer than {d:?}; retrying", ctx.stage),
        ),
        CapabilityError::EmptyOutput => ErrorClassification::new(
            ErrorCategory::Generation,
            "empty-model-output",
            Severity::Medium,
            Recoverability::Retryable,
            "The model returned nothing; regenerating",
        ),
        CapabilityError::Model(msg) => classify_model_message(msg),
        CapabilityError::QueryFailed(msg) => classify_query_message(msg, ctx),
    }
}

fn classify_model_message(msg: &str) -> ErrorClassification {
    let lowered = msg.to_lowercase();
    if lowered.contains("rate limit")
        || lowered.contains("too many requests")
        || lowered.contains("overloaded")
        || lowered.contains("unavailable")
    {
        return ErrorClassification::new(
            ErrorCategory::ExternalCapability,
            "service-degraded",
            Severity::High,
            Recoverability::Retryable,
            "The model service is briefly degraded; retrying with backoff",
        );
    }
    if lowered.contains("context length") || lowered.contains("token limit") {
        return ErrorClassification::new(
            ErrorCategory::Generation,
            "context-overflow",
            Severity::Medium,
            Recoverability::RequiresInput,
            "The question and schema are too large for one request; narrow the question",
        );
    }
    ErrorClassification::new(
        ErrorCategory::ExternalCapability,
        "model-error",
        Severity::Medium,
        Recoverability::Retryable,
        format!("The model call failed ({msg}); retrying"),
    )
}

fn classify_query_message(msg: &str, ctx: &ClassifyContext) -> ErrorClassification {
    let lowered = msg.to_lowercase();

    if let Some(relation) = extract_missing_relation(msg) {
        return ErrorClassification::new(
            ErrorCategory::SchemaMismatch,
            "missing-relation",
            Severity::High,
            Recoverability::RequiresInput,
            format!(
                "The table \"{relation}\" does not exist in {}; check the schema or choose another table",
                source_name(ctx)
            ),
        );
    }
    if let Some(column) = extract_missing_column(msg) {
        return ErrorClassification::new(
            ErrorCategory::SchemaMismatch,
            "missing-column",
            Severity::High,
            Recoverability::RequiresInput,
            format!(
                "The column \"{column}\" does not exist in {}; check the schema",
                source_name(ctx)
            ),
        );
    }
    if lowered.contains("syntax") {
        return ErrorClassification::new(
            ErrorCategory::Validation,
            "sql-syntax",
            Severity::Medium,
            Recoverability::AutomaticFixable,
            "The generated query has a syntax problem; applying a cleanup and retrying",
        );
    }
    if lowered.contains("permission") || lowered.contains("denied") {
        return ErrorClassification::new(
            ErrorCategory::Permission,
            "permission-denied",
            Severity::High,
            Recoverability::RequiresInput,
            format!("Grant read access to {} and retry", source_name(ctx)),
        );
    }
    if lowered.contains("timeout") || lowered.contains("timed out") {
        return ErrorClassification::new(
            ErrorCategory::Timeout,
            "statement-timeout",
            Severity::Medium,
            Recoverability::Retryable,
            "The query ran too long; retrying",
        );
    }
    if lowered.contains("connection") || lowered.contains("refused") || lowered.contains("reset") {
        return ErrorClassification::new(
            ErrorCategory::Connectivity,
            "connection-failed",
            Severity::High,
            Recoverability::Retryable,
            format!("Lost the connection to {}; retrying", source_name(ctx)),
        );
    }

    ErrorClassification::new(
        ErrorCategory::Execution,
        "query-failed",
        Severity::Medium,
        Recoverability::Retryable,
        format!("The query failed ({msg}); retrying"),
    )
}

fn extract_missing_relation(msg: &str) -> Option<String> {
    MISSING_RELATION.captures(msg).and_then(|caps| {
        caps.iter()
            .skip(1)
            .flatten()
            .next()
            .map(|m| m.as_str().to_string())
    })
}

fn extract_missing_column(msg: &str) -> Option<String> {
    MISSING_COLUMN.captures(msg).and_then(|caps| {
        caps.iter()
            .skip(1)
            .flatten()
            .next()
            .map(|m| m.as_str().to_string())
    })
}

/// Short, non-technical message for the user, derived from the category
///
/// The suggested fix rides alongside in the classification itself.
#[must_use]
pub fn user_message(classification: &ErrorClassification) -> String {
    match classification.category {
        ErrorCategory::Connectivity => "We couldn't reach the data source.",
        ErrorCategory::Permission => "You don't have access to this data source.",
        ErrorCategory::SchemaMismatch => {
            "The question refers to data that doesn't exist in this source."
        }
        ErrorCategory::DataAccess => "This data source isn't available right now.",
        ErrorCategory::Timeout => "The request took too long to complete.",
        ErrorCategory::ExternalCapability => "The analysis service is briefly unavailable.",
        ErrorCategory::Generation | ErrorCategory::Validation => {
            "We couldn't turn the question into a valid query."
        }
        ErrorCategory::Execution => "The query couldn't be completed.",
        ErrorCategory::Unknown => "Something went wrong while answering the question.",
    }
    .to_string()
}

fn source_name(ctx: &ClassifyContext) -> String {
    ctx.data_source
        .as_ref()
        .map_or_else(|| "the data source".to_string(), |id| format!("data source \"{id}\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use insightflow_model::RetryStrategy;

    fn exec_ctx() -> ClassifyContext {
        ClassifyContext::for_stage(Stage::QueryExecution)
            .with_data_source(DataSourceId::new("warehouse-1"))
    }

    #[test]
    fn missing_relation_is_schema_mismatch_with_named_table() {
        let failure = RawFailure::Capability(CapabilityError::QueryFailed(
            r#"ERROR: relation "orders" does not exist"#.into(),
        ));
        let c = classify(&failure, &exec_ctx());

        assert_eq!(c.category, ErrorCategory::SchemaMismatch);
        assert_eq!(c.subtype, "missing-relation");
        assert_eq!(c.severity, Severity::High);
        assert_eq!(c.recoverability, Recoverability::RequiresInput);
        assert!(c.suggested_fix.contains("orders"));
    }

    #[test]
    fn sqlite_style_missing_table_matches_too() {
        let failure = RawFailure::Capability(CapabilityError::QueryFailed(
            "no such table: orders".into(),
        ));
        let c = classify(&failure, &exec_ctx());
        assert_eq!(c.subtype, "missing-relation");
        assert!(c.suggested_fix.contains("orders"));
    }

    #[test]
    fn connectivity_is_high_and_retryable_with_backoff() {
        let failure = RawFailure::Capability(CapabilityError::Connection(
            "connection refused".into(),
        ));
        let c = classify(&failure, &exec_ctx());
        assert_eq!(c.category, ErrorCategory::Connectivity);
        assert_eq!(c.severity, Severity::High);
        assert_eq!(c.retry_strategy, RetryStrategy::Backoff);
    }

    #[test]
    fn permission_requires_input() {
        let failure =
            RawFailure::Capability(CapabilityError::PermissionDenied("select on sales".into()));
        let c = classify(&failure, &exec_ctx());
        assert_eq!(c.category, ErrorCategory::Permission);
        assert!(c.requires_input());
        assert_eq!(c.retry_strategy, RetryStrategy::None);
    }

    #[test]
    fn missing_limit_is_automatic_fixable() {
        let failure = RawFailure::SqlGuard(SqlGuardError::MissingLimit);
        let ctx = ClassifyContext::for_stage(Stage::QueryValidation);
        let c = classify(&failure, &ctx);
        assert_eq!(c.recoverability, Recoverability::AutomaticFixable);
        assert_eq!(c.retry_strategy, RetryStrategy::FixThenRetry);
    }

    #[test]
    fn rate_limits_map_to_external_capability() {
        let failure =
            RawFailure::Capability(CapabilityError::Model("429 rate limit exceeded".into()));
        let ctx = ClassifyContext::for_stage(Stage::QueryGeneration);
        let c = classify(&failure, &ctx);
        assert_eq!(c.category, ErrorCategory::ExternalCapability);
        assert!(c.is_retryable());
    }

    #[test]
    fn timeout_routes_like_any_failure() {
        let failure = RawFailure::Capability(CapabilityError::Timeout(
            std::time::Duration::from_secs(30),
        ));
        let ctx = ClassifyContext::for_stage(Stage::VisualizationGeneration);
        let c = classify(&failure, &ctx);
        assert_eq!(c.category, ErrorCategory::Timeout);
        assert!(c.is_retryable());
    }

    #[test]
    fn user_messages_stay_non_technical() {
        let failure = RawFailure::Capability(CapabilityError::QueryFailed(
            r#"relation "orders" does not exist"#.into(),
        ));
        let c = classify(&failure, &exec_ctx());
        let message = user_message(&c);
        assert!(!message.contains("relation"));
        assert!(message.ends_with('.'));
    }

    #[test]
    fn classification_is_deterministic() {
        let failure = RawFailure::Capability(CapabilityError::QueryFailed(
            "syntax error at or near \"FORM\"".into(),
        ));
        let a = classify(&failure, &exec_ctx());
        let b = classify(&failure, &exec_ctx());
        assert_eq!(a, b);
        assert_eq!(a.subtype, "sql-syntax");
    }
}
