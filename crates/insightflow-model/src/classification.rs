//! Structured failure classifications
//!
//! A classification is created once per observed failure and never mutated.
//! The coordinator's entire recovery policy keys off `recoverability` and the
//! derived `retry_strategy`; no stage carries ad hoc retry logic.

use serde::{Deserialize, Serialize};

/// Broad failure category, derived from the failing stage and message shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Model produced no usable artifact
    Generation,
    /// Generated artifact failed local checks
    Validation,
    /// Query execution failed at the source
    Execution,
    /// Data source missing or unreadable
    DataAccess,
    /// Network-level failure reaching a collaborator
    Connectivity,
    /// Caller lacks rights on the data source
    Permission,
    /// Query references objects the schema does not have
    SchemaMismatch,
    /// External capability (model service) degraded
    ExternalCapability,
    /// Deadline expired
    Timeout,
    /// Nothing matched
    Unknown,
}

/// How bad the failure is for the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational only
    Info,
    /// Cosmetic or partial
    Low,
    /// Degraded result likely
    Medium,
    /// Run cannot produce its main artifact
    High,
    /// Systemic problem
    Critical,
}

/// Whether and how the coordinator may recover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recoverability {
    /// A deterministic local fix exists; apply once and retry
    AutomaticFixable,
    /// Transient; retry with backoff up to the cap
    Retryable,
    /// Only the user can unblock this
    RequiresInput,
    /// Abort immediately
    Fatal,
}

/// Retry strategy tag, a deterministic function of recoverability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Do not retry
    None,
    /// Retry without delay
    Immediate,
    /// Retry with exponential backoff and jitter
    Backoff,
    /// Apply the deterministic fix, then retry once for free
    FixThenRetry,
}

impl RetryStrategy {
    /// Derive the strategy tag from recoverability
    #[inline]
    #[must_use]
    pub fn for_recoverability(recoverability: Recoverability) -> Self {
        match recoverability {
            Recoverability::AutomaticFixable => Self::FixThenRetry,
            Recoverability::Retryable => Self::Backoff,
            Recoverability::RequiresInput | Recoverability::Fatal => Self::None,
        }
    }
}

/// One classified failure, attached to the run's error list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorClassification {
    /// Broad category
    pub category: ErrorCategory,
    /// Specific subtype, kebab-case (`missing-relation`, `rate-limit`, ...)
    pub subtype: String,
    /// Severity for surfacing decisions
    pub severity: Severity,
    /// Recovery policy input
    pub recoverability: Recoverability,
    /// Human-readable suggested fix
    pub suggested_fix: String,
    /// Derived retry strategy tag
    pub retry_strategy: RetryStrategy,
}

impl ErrorClassification {
    /// Create classification; the strategy tag is derived, not chosen
    #[inline]
    #[must_use]
    pub fn new(
        category: ErrorCategory,
        subtype: impl Into<String>,
        severity: Severity,
        recoverability: Recoverability,
        suggested_fix: impl Into<String>,
    ) -> Self {
        Self {
            category,
            subtype: subtype.into(),
            severity,
            recoverability,
            suggested_fix: suggested_fix.into(),
            retry_strategy: RetryStrategy::for_recoverability(recoverability),
        }
    }

    /// Retry is allowed (with or without a preceding fix)
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.recoverability,
            Recoverability::Retryable | Recoverability::AutomaticFixable
        )
    }

    /// Only the user can unblock this
    #[inline]
    #[must_use]
    pub fn requires_input(&self) -> bool {
        matches!(self.recoverability, Recoverability::RequiresInput)
    }

    /// Run must abort without retrying
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.recoverability,
            Recoverability::RequiresInput | Recoverability::Fatal
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_derivation_is_total() {
        assert_eq!(
            RetryStrategy::for_recoverability(Recoverability::AutomaticFixable),
            RetryStrategy::FixThenRetry
        );
        assert_eq!(
            RetryStrategy::for_recoverability(Recoverability::Retryable),
            RetryStrategy::Backoff
        );
        assert_eq!(
            RetryStrategy::for_recoverability(Recoverability::RequiresInput),
            RetryStrategy::None
        );
        assert_eq!(
            RetryStrategy::for_recoverability(Recoverability::Fatal),
            RetryStrategy::None
        );
    }

    #[test]
    fn classification_predicates() {
        let retryable = ErrorClassification::new(
            ErrorCategory::Connectivity,
            "connection-refused",
            Severity::High,
            Recoverability::Retryable,
            "Check that the data source is reachable",
        );
        assert!(retryable.is_retryable());
        assert!(!retryable.is_terminal());

        let blocked = ErrorClassification::new(
            ErrorCategory::Permission,
            "permission-denied",
            Severity::High,
            Recoverability::RequiresInput,
            "Grant read access to the data source",
        );
        assert!(blocked.requires_input());
        assert!(blocked.is_terminal());
        assert_eq!(blocked.retry_strategy, RetryStrategy::None);
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Low > Severity::Info);
    }
}
