//! Error types for the orchestration core
//!
//! Raw failures from external capabilities and local checks are kept as-is
//! until the classifier turns them into an `ErrorClassification`; nothing in
//! the pipeline branches on a raw error directly.

use std::time::Duration;

/// Failure reported by an external capability (data access or model service)
#[derive(Debug, Clone, thiserror::Error)]
pub enum CapabilityError {
    /// Network-level failure reaching the collaborator
    #[error("connection failed: {0}")]
    Connection(String),

    /// Caller lacks rights on the target
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Data source missing or unreadable
    #[error("data source unavailable: {0}")]
    SourceUnavailable(String),

    /// Query was rejected or failed at the source
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Model service failed the call
    #[error("model call failed: {0}")]
    Model(String),

    /// Model produced no usable text
    #[error("model returned empty output")]
    EmptyOutput,

    /// Deadline expired before the capability answered
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Local guardrail violation on generated SQL
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SqlGuardError {
    /// Nothing to execute
    #[error("generated query is empty")]
    Empty,

    /// Only read statements may run
    #[error("non-read statement: {0}")]
    NonReadStatement(String),

    /// Unbounded result set
    #[error("query has no row limit")]
    MissingLimit,
}

/// Any failure a stage can report, pre-classification
#[derive(Debug, Clone, thiserror::Error)]
pub enum RawFailure {
    /// External capability failed
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// Generated SQL failed a local check
    #[error(transparent)]
    SqlGuard(#[from] SqlGuardError),

    /// Execution produced zero rows
    #[error("query returned no rows")]
    EmptyResult,

    /// Outcome shape is inconsistent (ragged rows, missing columns)
    #[error("malformed result: {0}")]
    MalformedResult(String),

    /// Request failed validation before any stage ran
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Model payload could not be parsed into the expected artifact
    #[error("unparseable artifact: {0}")]
    UnparseableArtifact(String),
}
