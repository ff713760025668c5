//! Tabular data as handed over by pipeline code, and its quality profile.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),
}

/// Column-named rows of JSON cells. `null` cells count as missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl TryFrom<RawTable> for Table {
    type Error = TableError;

    fn try_from(raw: RawTable) -> Result<Self, Self::Error> {
        Self::new(raw.columns, raw.rows)
    }
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self, TableError> {
        for (idx, name) in columns.iter().enumerate() {
            if columns[..idx].contains(name) {
                return Err(TableError::DuplicateColumn(name.clone()));
            }
        }
        for (row, cells) in rows.iter().enumerate() {
            if cells.len() != columns.len() {
                return Err(TableError::RaggedRow {
                    row,
                    found: cells.len(),
                    expected: columns.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    /// Interpret a JSON document shaped like `{"columns": [...], "rows": [[...]]}`.
    ///
    /// Returns `None` for anything else, including malformed tables.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        if object.len() != 2 {
            return None;
        }
        let columns = object
            .get("columns")?
            .as_array()?
            .iter()
            .map(|c| c.as_str().map(ToString::to_string))
            .collect::<Option<Vec<_>>>()?;
        let rows = object
            .get("rows")?
            .as_array()?
            .iter()
            .map(|r| r.as_array().cloned())
            .collect::<Option<Vec<_>>>()?;
        Self::new(columns, rows).ok()
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Representativeness {
    Pass,
    Warning,
}

/// Quality summary recorded with an extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataProfile {
    pub row_count: u64,
    pub column_count: u64,
    /// Inferred JSON type per column (`"number"`, `"string"`, `"mixed"`, ...).
    pub column_types: BTreeMap<String, String>,
    /// 1 - (null cells / total cells); 1.0 for an empty table.
    pub completeness: f64,
    pub duplicate_rows: u64,
    /// Share of rows per `target` value, when a `target` column exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_balance: Option<BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub representativeness: Option<Representativeness>,
}
