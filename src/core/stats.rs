//! Purpose: Column statistics over a record store or a query result.
//! Exports: `NumericSummary`, `TextSummary`, `ColumnStats`, `DescribeReport`,
//!          `CorrelationMatrix`, `aggregate_numeric`, `aggregate_text`, `column_stats`,
//!          `value_counts`, `correlation`, `describe`, `percentile`.
//! Role: Reproducible replacements for dataframe describe/value_counts/corr.
//! Invariants: Numeric statistics only read integer-declared fields (FieldType otherwise).
//! Invariants: Quartiles use linear interpolation at rank `p * (n - 1)`.
//! Invariants: Text lengths count Unicode scalar values, not bytes.
use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use super::error::{Error, ErrorKind};
use super::record::RecordView;
use super::schema::{FieldSpec, FieldType};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NumericSummary {
    pub field: String,
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub p25: Option<f64>,
    pub p50: Option<f64>,
    pub p75: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TextSummary {
    pub field: String,
    pub count: usize,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub mean_length: Option<f64>,
    pub distinct_count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "dtype")]
pub enum ColumnStats {
    #[serde(rename = "int64")]
    Numeric(NumericSummary),
    #[serde(rename = "string")]
    Text(TextSummary),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DescribeReport {
    pub rows: usize,
    pub numeric: Vec<NumericSummary>,
    pub text: Vec<TextSummary>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub fields: Vec<String>,
    /// Row-major; `None` where the coefficient is undefined.
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let row = self.fields.iter().position(|name| name == a)?;
        let col = self.fields.iter().position(|name| name == b)?;
        self.values[row][col]
    }
}

pub fn aggregate_numeric<V: RecordView + ?Sized>(
    view: &V,
    field: &str,
) -> Result<NumericSummary, Error> {
    let position = require_typed(view, field, FieldType::Integer)?;
    let mut values: Vec<i64> = view
        .records_iter()
        .filter_map(|record| record.integer_at(position))
        .collect();
    values.sort_unstable();
    Ok(summarize_sorted(field, &values))
}

fn summarize_sorted(field: &str, sorted: &[i64]) -> NumericSummary {
    let count = sorted.len();
    if count == 0 {
        return NumericSummary {
            field: field.to_string(),
            count,
            mean: None,
            std: None,
            min: None,
            max: None,
            p25: None,
            p50: None,
            p75: None,
        };
    }
    let as_f64: Vec<f64> = sorted.iter().map(|value| *value as f64).collect();
    let mean = as_f64.iter().sum::<f64>() / count as f64;
    let std = (count > 1).then(|| {
        let variance =
            as_f64.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        variance.sqrt()
    });
    NumericSummary {
        field: field.to_string(),
        count,
        mean: Some(mean),
        std,
        min: sorted.first().copied(),
        max: sorted.last().copied(),
        p25: percentile(&as_f64, 0.25),
        p50: percentile(&as_f64, 0.50),
        p75: percentile(&as_f64, 0.75),
    }
}

/// Inclusive linear-interpolation percentile over an ascending slice.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&p) {
        return None;
    }
    let rank = p * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

pub fn aggregate_text<V: RecordView + ?Sized>(view: &V, field: &str) -> Result<TextSummary, Error> {
    let position = require_typed(view, field, FieldType::Text)?;
    let mut count = 0usize;
    let mut total = 0usize;
    let mut min_length: Option<usize> = None;
    let mut max_length: Option<usize> = None;
    let mut distinct: HashSet<&str> = HashSet::new();
    for text in view
        .records_iter()
        .filter_map(|record| record.text_at(position))
    {
        let length = text.chars().count();
        count += 1;
        total += length;
        min_length = Some(min_length.map_or(length, |current| current.min(length)));
        max_length = Some(max_length.map_or(length, |current| current.max(length)));
        distinct.insert(text);
    }
    Ok(TextSummary {
        field: field.to_string(),
        count,
        min_length,
        max_length,
        mean_length: (count > 0).then(|| total as f64 / count as f64),
        distinct_count: distinct.len(),
    })
}

/// Summary matching the field's declared type.
pub fn column_stats<V: RecordView + ?Sized>(view: &V, field: &str) -> Result<ColumnStats, Error> {
    let (_, spec) = view.schema().require(field)?;
    match spec.field_type {
        FieldType::Integer => aggregate_numeric(view, field).map(ColumnStats::Numeric),
        FieldType::Text => aggregate_text(view, field).map(ColumnStats::Text),
    }
}

/// Frequency of each value of an integer field, ascending by value.
pub fn value_counts<V: RecordView + ?Sized>(
    view: &V,
    field: &str,
) -> Result<Vec<(i64, usize)>, Error> {
    let position = require_typed(view, field, FieldType::Integer)?;
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for value in view
        .records_iter()
        .filter_map(|record| record.integer_at(position))
    {
        *counts.entry(value).or_insert(0) += 1;
    }
    Ok(counts.into_iter().collect())
}

/// Pearson correlation between every pair of integer fields.
pub fn correlation<V: RecordView + ?Sized>(view: &V) -> CorrelationMatrix {
    let schema = view.schema();
    let positions = schema.positions_of(FieldType::Integer);
    let columns: Vec<Vec<f64>> = positions
        .iter()
        .map(|position| {
            view.records_iter()
                .filter_map(|record| record.integer_at(*position))
                .map(|value| value as f64)
                .collect()
        })
        .collect();
    let values = columns
        .iter()
        .map(|a| columns.iter().map(|b| pearson(a, b)).collect())
        .collect();
    CorrelationMatrix {
        fields: positions
            .iter()
            .map(|position| schema.fields()[*position].name.clone())
            .collect(),
        values,
    }
}

fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len();
    if n < 2 || n != b.len() {
        return None;
    }
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some((cov / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0))
}

pub fn describe<V: RecordView + ?Sized>(view: &V) -> Result<DescribeReport, Error> {
    let schema = view.schema();
    let mut numeric = Vec::new();
    let mut text = Vec::new();
    for field in schema.fields() {
        match field.field_type {
            FieldType::Integer => numeric.push(aggregate_numeric(view, &field.name)?),
            FieldType::Text => text.push(aggregate_text(view, &field.name)?),
        }
    }
    Ok(DescribeReport {
        rows: view.row_count(),
        numeric,
        text,
    })
}

fn require_typed<V: RecordView + ?Sized>(
    view: &V,
    field: &str,
    expected: FieldType,
) -> Result<usize, Error> {
    let (position, spec) = view.schema().require(field)?;
    ensure_type(spec, expected)?;
    Ok(position)
}

fn ensure_type(spec: &FieldSpec, expected: FieldType) -> Result<(), Error> {
    if spec.field_type == expected {
        return Ok(());
    }
    let err = Error::new(ErrorKind::FieldType)
        .with_message(format!(
            "field is declared {} but {} statistics were requested",
            spec.field_type, expected
        ))
        .with_field(spec.name.clone());
    Err(match expected {
        FieldType::Integer => err.with_hint("Numeric statistics apply to int64 fields only."),
        FieldType::Text => err.with_hint("Text-length statistics apply to string fields only."),
    })
}
