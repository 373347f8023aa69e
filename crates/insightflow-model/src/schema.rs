//! Schema metadata for a connected data source

use crate::ids::DataSourceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema snapshot for one data source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaInfo {
    /// Owning data source
    pub data_source: DataSourceId,
    /// Tables visible to query generation
    pub tables: Vec<TableInfo>,
    /// When this snapshot was fetched
    pub fetched_at: DateTime<Utc>,
}

impl SchemaInfo {
    /// Create snapshot fetched now
    #[inline]
    #[must_use]
    pub fn new(data_source: DataSourceId, tables: Vec<TableInfo>) -> Self {
        Self {
            data_source,
            tables,
            fetched_at: Utc::now(),
        }
    }

    /// Table names in declaration order
    #[must_use]
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Compact one-line-per-table description for prompt context,
    /// e.g. `sales(date date, amount numeric)`
    #[must_use]
    pub fn describe(&self) -> String {
        self.tables
            .iter()
            .map(TableInfo::describe)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One table in a schema snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    /// Table name
    pub name: String,
    /// Columns in declaration order
    pub columns: Vec<ColumnInfo>,
}

impl TableInfo {
    /// Create table description
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// `name(col type, ...)` form
    #[must_use]
    pub fn describe(&self) -> String {
        let cols = self
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.data_type))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({})", self.name, cols)
    }
}

/// One column of a table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Source-native type name (`date`, `numeric`, `text`, ...)
    pub data_type: String,
    /// Whether NULLs are allowed
    pub nullable: bool,
}

impl ColumnInfo {
    /// Create column description
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
        }
    }

    /// Mark column NOT NULL
    #[inline]
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}
