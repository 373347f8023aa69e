//! Stage executors
//!
//! Each stage is an independently invocable unit: it calls one external
//! capability (or runs one local check) under a deadline and returns a typed
//! outcome or a raw failure for the classifier. No stage retries on its own
//! and none mutates run state; the coordinator owns both.

use crate::capability::{DataAccess, LanguageModel, PromptContext, PromptKind};
use crate::error::{CapabilityError, RawFailure, SqlGuardError};
use insightflow_model::{DataSourceId, QueryOutcome, SchemaInfo};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

static LIMIT_CLAUSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\blimit\s+\d+").unwrap());

const READ_PREFIXES: &[&str] = &["select", "with", "show", "describe", "explain"];

/// Remove a surrounding markdown code fence, if the model added one
#[must_use]
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // drop the language tag on the opening fence line
    let body = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    body.trim_end()
        .trim_end_matches("```")
        .trim()
        .to_string()
}

/// Fetch the schema snapshot under a deadline
pub async fn retrieve_schema(
    data: &Arc<dyn DataAccess>,
    data_source: &DataSourceId,
    deadline: Duration,
) -> Result<SchemaInfo, RawFailure> {
    match tokio::time::timeout(deadline, data.fetch_schema(data_source)).await {
        Ok(result) => result.map_err(RawFailure::from),
        Err(_) => Err(CapabilityError::Timeout(deadline).into()),
    }
}

/// Generate SQL for the question under a deadline
pub async fn generate_query(
    model: &Arc<dyn LanguageModel>,
    context: &PromptContext,
    deadline: Duration,
) -> Result<String, RawFailure> {
    let text = generate(model, PromptKind::QueryGeneration, context, deadline).await?;
    Ok(strip_code_fences(&text))
}

/// Local checks on generated SQL
///
/// Rejects empty output, anything that is not a read statement, and
/// unbounded queries (the latter is the canonical automatic-fixable case).
pub fn validate_query(sql: &str) -> Result<(), RawFailure> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(SqlGuardError::Empty.into());
    }

    let lowered = trimmed.to_lowercase();
    let first_word = lowered.split_whitespace().next().unwrap_or_default();
    if !READ_PREFIXES.contains(&first_word) {
        return Err(SqlGuardError::NonReadStatement(first_word.to_string()).into());
    }

    if !LIMIT_CLAUSE.is_match(&lowered) {
        return Err(SqlGuardError::MissingLimit.into());
    }

    Ok(())
}

/// Deterministic local fix for an automatic-fixable classification
///
/// Returns the fixed SQL, or `None` when no fix applies to the subtype.
#[must_use]
pub fn apply_automatic_fix(sql: &str, subtype: &str, default_row_limit: u32) -> Option<String> {
    match subtype {
        "missing-limit" => {
            let body = sql.trim().trim_end_matches(';').trim_end();
            Some(format!("{body} LIMIT {default_row_limit}"))
        }
        "sql-syntax" => {
            // cleanup pass: fences, backticks, trailing semicolon
            let cleaned = strip_code_fences(sql)
                .replace('`', "")
                .trim()
                .trim_end_matches(';')
                .trim_end()
                .to_string();
            if cleaned == sql { None } else { Some(cleaned) }
        }
        _ => None,
    }
}

/// Execute SQL under a deadline
pub async fn execute_query(
    data: &Arc<dyn DataAccess>,
    data_source: &DataSourceId,
    sql: &str,
    deadline: Duration,
) -> Result<QueryOutcome, RawFailure> {
    match tokio::time::timeout(deadline, data.execute_query(data_source, sql)).await {
        Ok(result) => result.map_err(RawFailure::from),
        Err(_) => Err(CapabilityError::Timeout(deadline).into()),
    }
}

/// Shape and emptiness checks on an execution outcome
pub fn validate_result(outcome: &QueryOutcome) -> Result<(), RawFailure> {
    if !outcome.is_well_formed() {
        return Err(RawFailure::MalformedResult(format!(
            "{} columns, {} rows, row_count {}",
            outcome.columns.len(),
            outcome.rows.len(),
            outcome.row_count
        )));
    }
    if outcome.is_empty() {
        return Err(RawFailure::EmptyResult);
    }
    Ok(())
}

/// Generate a chart-specification payload
pub async fn generate_visualization(
    model: &Arc<dyn LanguageModel>,
    context: &PromptContext,
    deadline: Duration,
) -> Result<Value, RawFailure> {
    generate_json(model, PromptKind::Visualization, context, deadline).await
}

/// Generate an insight-list payload
pub async fn generate_insights(
    model: &Arc<dyn LanguageModel>,
    context: &PromptContext,
    deadline: Duration,
) -> Result<Value, RawFailure> {
    generate_json(model, PromptKind::Insights, context, deadline).await
}

/// Generate the single combined artifact payload
pub async fn generate_combined(
    model: &Arc<dyn LanguageModel>,
    context: &PromptContext,
    deadline: Duration,
) -> Result<Value, RawFailure> {
    generate_json(model, PromptKind::CombinedArtifacts, context, deadline).await
}

/// Generate the narrative summary
pub async fn synthesize_narration(
    model: &Arc<dyn LanguageModel>,
    context: &PromptContext,
    deadline: Duration,
) -> Result<String, RawFailure> {
    let text = generate(model, PromptKind::Narration, context, deadline).await?;
    let narration = text.trim().to_string();
    if narration.is_empty() {
        return Err(CapabilityError::EmptyOutput.into());
    }
    Ok(narration)
}

async fn generate(
    model: &Arc<dyn LanguageModel>,
    kind: PromptKind,
    context: &PromptContext,
    deadline: Duration,
) -> Result<String, RawFailure> {
    match tokio::time::timeout(deadline, model.generate(kind, context)).await {
        Ok(Ok(text)) if text.trim().is_empty() => Err(CapabilityError::EmptyOutput.into()),
        Ok(result) => result.map_err(RawFailure::from),
        Err(_) => Err(CapabilityError::Timeout(deadline).into()),
    }
}

async fn generate_json(
    model: &Arc<dyn LanguageModel>,
    kind: PromptKind,
    context: &PromptContext,
    deadline: Duration,
) -> Result<Value, RawFailure> {
    let text = generate(model, kind, context, deadline).await?;
    let cleaned = strip_code_fences(&text);
    serde_json::from_str(&cleaned)
        .map_err(|e| RawFailure::UnparseableArtifact(format!("{}: {e}", kind.label())))
}
