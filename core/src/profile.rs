//! Data handed to the tracker, and what gets recorded about it.
//!
//! Anything serializable can be tracked: it is fingerprinted through its
//! canonical JSON form. Tabular data additionally gets a quality profile at
//! extraction and a shape summary across transformations.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;
use serde_json::Value;

use provgate_types::{DataProfile, Representativeness, ShapeDelta, Table};

/// Column whose values are treated as class labels.
pub const TARGET_COLUMN: &str = "target";

/// Minimum share of rows every class needs for the sample to count as representative.
pub const MIN_CLASS_SHARE: f64 = 0.05;

pub trait TrackedData: Serialize {
    /// Tabular view of the data, if it has one.
    fn as_table(&self) -> Option<Cow<'_, Table>>;
}

impl TrackedData for Table {
    fn as_table(&self) -> Option<Cow<'_, Table>> {
        Some(Cow::Borrowed(self))
    }
}

impl TrackedData for Value {
    fn as_table(&self) -> Option<Cow<'_, Table>> {
        Table::from_value(self).map(Cow::Owned)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn class_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[must_use]
pub fn profile_table(table: &Table) -> DataProfile {
    let rows = table.rows();
    let columns = table.columns();

    let column_types = columns
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let seen: BTreeSet<&'static str> = rows
                .iter()
                .map(|row| &row[idx])
                .filter(|cell| !cell.is_null())
                .map(json_type)
                .collect();
            let ty = match seen.len() {
                0 => "null",
                1 => seen.first().copied().unwrap_or("null"),
                _ => "mixed",
            };
            (name.clone(), ty.to_string())
        })
        .collect();

    let total_cells = rows.len() * columns.len();
    let null_cells = rows.iter().flatten().filter(|cell| cell.is_null()).count();
    let completeness = if total_cells == 0 {
        1.0
    } else {
        1.0 - null_cells as f64 / total_cells as f64
    };

    let mut seen_rows = HashSet::new();
    let duplicate_rows = rows
        .iter()
        .filter(|row| !seen_rows.insert(Value::Array(row.to_vec()).to_string()))
        .count();

    let (class_balance, representativeness) = match table.column_index(TARGET_COLUMN) {
        Some(idx) => {
            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            for row in rows {
                *counts.entry(class_label(&row[idx])).or_default() += 1;
            }
            let balance: BTreeMap<String, f64> = counts
                .into_iter()
                .map(|(label, n)| (label, n as f64 / rows.len() as f64))
                .collect();
            let verdict = (!balance.is_empty()).then(|| {
                if balance.values().all(|share| *share >= MIN_CLASS_SHARE) {
                    Representativeness::Pass
                } else {
                    Representativeness::Warning
                }
            });
            (Some(balance), verdict)
        }
        None => (None, None),
    };

    DataProfile {
        row_count: rows.len() as u64,
        column_count: columns.len() as u64,
        column_types,
        completeness,
        duplicate_rows: duplicate_rows as u64,
        class_balance,
        representativeness,
    }
}

#[must_use]
pub fn shape_delta(input: &Table, output: &Table) -> ShapeDelta {
    let rows_before = input.row_count() as u64;
    let rows_after = output.row_count() as u64;
    ShapeDelta {
        rows_before,
        rows_after,
        rows_removed: rows_before as i64 - rows_after as i64,
        columns_added: output
            .columns()
            .iter()
            .filter(|c| !input.columns().contains(c))
            .cloned()
            .collect(),
        columns_removed: input
            .columns()
            .iter()
            .filter(|c| !output.columns().contains(c))
            .cloned()
            .collect(),
    }
}
