//! Purpose: Untyped raw table as read from a spreadsheet, CSV, or JSON source.
//! Exports: `RawValue`, `RawTable`, `TableProfile`, `ColumnProfile`.
//! Role: Source of truth before normalization; never carried past the normalizer.
//! Invariants: Row order is the source order; rows are padded to the header width.
//! Invariants: Looking up a column the table does not have yields `RawValue::Empty`.
use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum RawValue {
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawValue {
    /// Missing in the dataframe sense: empty cells and NaN floats.
    pub fn is_missing(&self) -> bool {
        match self {
            RawValue::Empty => true,
            RawValue::Float(value) => value.is_nan(),
            _ => false,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            RawValue::Empty => "empty",
            RawValue::Bool(_) => "bool",
            RawValue::Int(_) => "int",
            RawValue::Float(_) => "float",
            RawValue::Text(_) => "string",
        }
    }

    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => RawValue::Empty,
            Value::Bool(flag) => RawValue::Bool(*flag),
            Value::Number(num) => match num.as_i64() {
                Some(int) => RawValue::Int(int),
                None => num.as_f64().map(RawValue::Float).unwrap_or(RawValue::Empty),
            },
            Value::String(text) => RawValue::Text(text.clone()),
            other => RawValue::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            RawValue::Empty => Value::Null,
            RawValue::Bool(flag) => Value::Bool(*flag),
            RawValue::Int(int) => Value::from(*int),
            RawValue::Float(float) => serde_json::Number::from_f64(*float)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            RawValue::Text(text) => Value::String(text.clone()),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RawTable {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<RawValue>>,
}

impl RawTable {
    /// Build a table from a header and rows. Short rows are padded with `Empty`,
    /// long rows are truncated. Repeated header names keep the first occurrence
    /// for lookups.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<RawValue>>) -> Self {
        let width = columns.len();
        let mut index = HashMap::with_capacity(width);
        for (idx, name) in columns.iter().enumerate() {
            index.entry(name.clone()).or_insert(idx);
        }
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, RawValue::Empty);
                row
            })
            .collect();
        Self {
            columns,
            index,
            rows,
        }
    }

    /// Build a table from JSON row objects; the column order is first-seen order.
    pub fn from_json_rows(rows: &[serde_json::Map<String, Value>]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut seen = BTreeSet::new();
        for row in rows {
            for key in row.keys() {
                if seen.insert(key.clone()) {
                    columns.push(key.clone());
                }
            }
        }
        let values = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|name| row.get(name).map(RawValue::from_json).unwrap_or(RawValue::Empty))
                    .collect()
            })
            .collect();
        Self::new(columns, values)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn row(&self, row: usize) -> Option<&[RawValue]> {
        self.rows.get(row).map(Vec::as_slice)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[RawValue]> + '_ {
        self.rows.iter().map(Vec::as_slice)
    }

    pub fn value(&self, row: usize, column: &str) -> &RawValue {
        static EMPTY: RawValue = RawValue::Empty;
        self.column_index(column)
            .and_then(|idx| self.rows.get(row).and_then(|values| values.get(idx)))
            .unwrap_or(&EMPTY)
    }

    /// Shape, missing-value counts, and observed scalar kinds per column.
    pub fn profile(&self, sample_rows: usize) -> TableProfile {
        let columns = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let mut missing = 0usize;
                let mut kinds = BTreeSet::new();
                for row in &self.rows {
                    let value = &row[idx];
                    if value.is_missing() {
                        missing += 1;
                    } else {
                        kinds.insert(value.kind_name());
                    }
                }
                ColumnProfile {
                    name: name.clone(),
                    missing,
                    kinds: kinds.into_iter().collect(),
                }
            })
            .collect();
        let sample = self
            .rows
            .iter()
            .take(sample_rows)
            .map(|row| {
                let mut map = serde_json::Map::new();
                for (name, value) in self.columns.iter().zip(row) {
                    map.insert(name.clone(), value.to_json());
                }
                map
            })
            .collect();
        TableProfile {
            total_rows: self.rows.len(),
            total_columns: self.columns.len(),
            columns,
            sample,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TableProfile {
    pub total_rows: usize,
    pub total_columns: usize,
    pub columns: Vec<ColumnProfile>,
    pub sample: Vec<serde_json::Map<String, Value>>,
}

impl TableProfile {
    pub fn total_missing(&self) -> usize {
        self.columns.iter().map(|column| column.missing).sum()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub missing: usize,
    pub kinds: Vec<&'static str>,
}
