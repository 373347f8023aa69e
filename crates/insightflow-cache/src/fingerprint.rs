//! Query normalization and fingerprinting
//!
//! Semantically identical queries must share a cache entry, so the fingerprint
//! is computed over a normalized form: case-folded, whitespace-collapsed, and
//! with literal parameters stripped. Table and column identifiers survive
//! normalization, so queries against different objects never collide.

use insightflow_model::DataSourceId;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

static STRING_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"'(?:[^']|'')*'").unwrap());
static NUMBER_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+(?:\.\d+)?\b").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Normalize query text for fingerprinting
///
/// Lowercases, replaces string and numeric literals with `?`, collapses
/// whitespace, and drops a trailing semicolon.
#[must_use]
pub fn normalize_query(sql: &str) -> String {
    let lowered = sql.to_lowercase();
    let no_strings = STRING_LITERAL.replace_all(&lowered, "?");
    let no_numbers = NUMBER_LITERAL.replace_all(&no_strings, "?");
    let collapsed = WHITESPACE.replace_all(&no_numbers, " ");
    collapsed.trim().trim_end_matches(';').trim().to_string()
}

/// Cache key for one executed query against one data source
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    /// Data source the query ran against
    pub data_source: DataSourceId,
    /// Hex digest of the normalized query text
    pub fingerprint: String,
}

impl QueryKey {
    /// Build the key for `sql` against `data_source`
    #[must_use]
    pub fn new(data_source: DataSourceId, sql: &str) -> Self {
        let normalized = normalize_query(sql);
        let mut hasher = Sha256::new();
        hasher.update(data_source.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(normalized.as_bytes());
        Self {
            data_source,
            fingerprint: hex::encode(hasher.finalize()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key(sql: &str) -> QueryKey {
        QueryKey::new(DataSourceId::new("warehouse-1"), sql)
    }

    #[test]
    fn case_and_whitespace_do_not_change_fingerprint() {
        let a = key("SELECT month, SUM(amount)  FROM sales\n GROUP BY month");
        let b = key("select month, sum(amount) from sales group by month");
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn literals_do_not_change_fingerprint() {
        let a = key("select * from sales where region = 'EMEA' and amount > 100");
        let b = key("select * from sales where region = 'APAC' and amount > 250");
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn different_tables_get_different_fingerprints() {
        let a = key("select count(*) from sales");
        let b = key("select count(*) from refunds");
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn different_data_sources_get_different_fingerprints() {
        let sql = "select count(*) from sales";
        let a = QueryKey::new(DataSourceId::new("warehouse-1"), sql);
        let b = QueryKey::new(DataSourceId::new("warehouse-2"), sql);
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn trailing_semicolon_is_ignored() {
        assert_eq!(
            key("select 1;").fingerprint,
            key("select 1").fingerprint
        );
    }

    #[test]
    fn identifiers_with_digits_survive_normalization() {
        // digits embedded in identifiers are not literals
        assert_eq!(normalize_query("select col1 from t2"), "select col1 from t2");
        assert_eq!(normalize_query("select 2 from t2"), "select ? from t2");
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(sql in ".{0,120}") {
            let once = normalize_query(&sql);
            let twice = normalize_query(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn normalization_is_case_insensitive(sql in "[ -~]{0,80}") {
            prop_assert_eq!(
                normalize_query(&sql.to_uppercase()),
                normalize_query(&sql.to_lowercase())
            );
        }
    }
}
