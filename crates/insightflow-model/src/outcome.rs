//! Executed-query outcome

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Row set returned by query execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    /// Column names in result order
    pub columns: Vec<String>,
    /// Rows, each the same width as `columns`
    pub rows: Vec<Vec<Value>>,
    /// Row count as reported by the executor
    pub row_count: usize,
}

impl QueryOutcome {
    /// Create outcome; `row_count` is derived from `rows`
    #[inline]
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
        }
    }

    /// Outcome with no rows
    #[inline]
    #[must_use]
    pub fn empty(columns: Vec<String>) -> Self {
        Self::new(columns, Vec::new())
    }

    /// True when no rows came back
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Column set and row widths are consistent
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.columns.is_empty()
            && self.row_count == self.rows.len()
            && self.rows.iter().all(|r| r.len() == self.columns.len())
    }

    /// First `n` rows, for prompt context
    #[must_use]
    pub fn sample(&self, n: usize) -> &[Vec<Value>] {
        &self.rows[..self.rows.len().min(n)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn row_count_derived_from_rows() {
        let outcome = QueryOutcome::new(
            vec!["month".into(), "total".into()],
            vec![vec![json!("2026-01"), json!(1200.5)]],
        );
        assert_eq!(outcome.row_count, 1);
        assert!(!outcome.is_empty());
        assert!(outcome.is_well_formed());
    }

    #[test]
    fn empty_outcome() {
        let outcome = QueryOutcome::empty(vec!["month".into()]);
        assert!(outcome.is_empty());
        assert!(outcome.is_well_formed());
    }

    #[test]
    fn ragged_rows_are_malformed() {
        let outcome = QueryOutcome::new(
            vec!["a".into(), "b".into()],
            vec![vec![json!(1)], vec![json!(1), json!(2)]],
        );
        assert!(!outcome.is_well_formed());
    }

    #[test]
    fn sample_caps_at_available_rows() {
        let outcome = QueryOutcome::new(vec!["a".into()], vec![vec![json!(1)], vec![json!(2)]]);
        assert_eq!(outcome.sample(10).len(), 2);
        assert_eq!(outcome.sample(1).len(), 1);
    }
}
