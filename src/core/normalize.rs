//! Purpose: Map raw heterogeneous rows onto the typed schema.
//! Exports: `normalize`, `coerce_integer`, `coerce_text`.
//! Role: The only boundary where untyped values become `FieldValue`s.
//! Invariants: Output order equals input row order; every record has every schema field.
//! Invariants: Columns outside the schema are dropped.
//! Invariants: Any failure aborts the whole load; no partial store is returned.
use std::sync::Arc;

use super::error::{Error, ErrorKind};
use super::record::{FieldValue, Record, RecordStore};
use super::schema::{FieldType, FillPolicy, Schema};
use super::table::{RawTable, RawValue};

/// Outcome of coercing one cell to an integer before the fill policy applies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum IntegerCoercion {
    Value(i64),
    /// Absent, NaN, or unparseable; the field's fill value is used.
    Missing,
    /// Numeric but not representable as i64 (infinite or out of range).
    Unrepresentable(f64),
}

pub fn normalize(table: &RawTable, schema: Arc<Schema>) -> Result<RecordStore, Error> {
    let columns: Vec<Option<usize>> = schema
        .fields()
        .iter()
        .map(|field| table.column_index(&field.name))
        .collect();

    let dropped = table
        .columns()
        .iter()
        .filter(|name| schema.position(name).is_none())
        .count();
    if dropped > 0 {
        tracing::debug!(dropped, "columns outside the schema dropped");
    }
    let absent = columns.iter().filter(|column| column.is_none()).count();
    if absent > 0 {
        tracing::warn!(absent, "schema fields missing from input; fill policy applies");
    }

    let mut records = Vec::with_capacity(table.len());
    for (row_idx, row) in table.rows().enumerate() {
        let mut values = Vec::with_capacity(schema.len());
        for (field, column) in schema.fields().iter().zip(&columns) {
            let raw = column.and_then(|idx| row.get(idx)).unwrap_or(&RawValue::Empty);
            let value = match (field.field_type, &field.fill) {
                (FieldType::Integer, FillPolicy::Integer(fill)) => match coerce_integer(raw) {
                    IntegerCoercion::Value(value) => FieldValue::Integer(value),
                    IntegerCoercion::Missing => FieldValue::Integer(*fill),
                    IntegerCoercion::Unrepresentable(value) => {
                        return Err(Error::new(ErrorKind::SchemaViolation)
                            .with_message(format!("value {value} cannot be stored as int64"))
                            .with_field(field.name.clone())
                            .with_row(row_idx)
                            .with_hint("Fix the cell in the source sheet or clear it to use the fill value."));
                    }
                },
                (FieldType::Text, FillPolicy::Text(fill)) => {
                    FieldValue::Text(coerce_text(raw).unwrap_or_else(|| fill.clone()))
                }
                _ => {
                    return Err(Error::new(ErrorKind::SchemaViolation)
                        .with_message("fill policy does not match field type")
                        .with_field(field.name.clone()));
                }
            };
            values.push(value);
        }
        records.push(Record::from_values(values));
    }

    tracing::debug!(rows = records.len(), fields = schema.len(), "normalized table");
    Ok(RecordStore::new(schema, records))
}

pub fn coerce_integer(raw: &RawValue) -> IntegerCoercion {
    match raw {
        RawValue::Empty => IntegerCoercion::Missing,
        RawValue::Int(value) => IntegerCoercion::Value(*value),
        RawValue::Bool(flag) => IntegerCoercion::Value(i64::from(*flag)),
        RawValue::Float(value) => float_to_integer(*value),
        RawValue::Text(text) => {
            let trimmed = text.trim();
            if let Ok(value) = trimmed.parse::<i64>() {
                return IntegerCoercion::Value(value);
            }
            match trimmed {
                "True" | "TRUE" | "true" => return IntegerCoercion::Value(1),
                "False" | "FALSE" | "false" => return IntegerCoercion::Value(0),
                _ => {}
            }
            match trimmed.parse::<f64>() {
                Ok(value) => float_to_integer(value),
                Err(_) => IntegerCoercion::Missing,
            }
        }
    }
}

fn float_to_integer(value: f64) -> IntegerCoercion {
    if value.is_nan() {
        return IntegerCoercion::Missing;
    }
    let truncated = value.trunc();
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
    if !truncated.is_finite() || truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return IntegerCoercion::Unrepresentable(value);
    }
    IntegerCoercion::Value(truncated as i64)
}

/// Render a raw cell as text; `None` means missing.
pub fn coerce_text(raw: &RawValue) -> Option<String> {
    match raw {
        RawValue::Empty => None,
        RawValue::Text(text) => Some(text.clone()),
        RawValue::Int(value) => Some(value.to_string()),
        RawValue::Bool(true) => Some("True".to_string()),
        RawValue::Bool(false) => Some("False".to_string()),
        RawValue::Float(value) if value.is_nan() => None,
        RawValue::Float(value) => Some(render_float(*value)),
    }
}

/// Shortest round-trip text for a float, with exponent form outside `1e-4..1e16`.
fn render_float(value: f64) -> String {
    let magnitude = value.abs();
    if value.is_finite() && value != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let scientific = format!("{value:e}");
        if let Some((mantissa, exponent)) = scientific.split_once('e') {
            if let Ok(exponent) = exponent.parse::<i32>() {
                let sign = if exponent < 0 { '-' } else { '+' };
                return format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs());
            }
        }
        return scientific;
    }
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{IntegerCoercion, coerce_integer, coerce_text, normalize};
    use crate::core::error::ErrorKind;
    use crate::core::record::FieldValue;
    use crate::core::schema::{FieldType, essay_schema};
    use crate::core::table::{RawTable, RawValue};

    fn text(value: &str) -> RawValue {
        RawValue::Text(value.to_string())
    }

    #[test]
    fn integer_coercion_follows_numeric_rules() {
        assert_eq!(coerce_integer(&RawValue::Int(7)), IntegerCoercion::Value(7));
        assert_eq!(coerce_integer(&RawValue::Float(6.9)), IntegerCoercion::Value(6));
        assert_eq!(coerce_integer(&RawValue::Float(-6.9)), IntegerCoercion::Value(-6));
        assert_eq!(coerce_integer(&RawValue::Bool(true)), IntegerCoercion::Value(1));
        assert_eq!(coerce_integer(&text(" 8 ")), IntegerCoercion::Value(8));
        assert_eq!(coerce_integer(&text("7.5")), IntegerCoercion::Value(7));
        assert_eq!(coerce_integer(&text("seven")), IntegerCoercion::Missing);
        assert_eq!(coerce_integer(&text("007")), IntegerCoercion::Value(7));
        assert_eq!(coerce_integer(&text("TRUE")), IntegerCoercion::Value(1));
        assert_eq!(coerce_integer(&text("false")), IntegerCoercion::Value(0));
        assert_eq!(coerce_integer(&text("1e3")), IntegerCoercion::Value(1000));
        assert!(matches!(
            coerce_integer(&text("1e400")),
            IntegerCoercion::Unrepresentable(_)
        ));
        assert_eq!(coerce_integer(&RawValue::Float(f64::NAN)), IntegerCoercion::Missing);
        assert_eq!(coerce_integer(&RawValue::Empty), IntegerCoercion::Missing);
        assert!(matches!(
            coerce_integer(&RawValue::Float(f64::INFINITY)),
            IntegerCoercion::Unrepresentable(_)
        ));
        assert!(matches!(
            coerce_integer(&RawValue::Float(1e30)),
            IntegerCoercion::Unrepresentable(_)
        ));
    }

    #[test]
    fn text_coercion_renders_scalars() {
        assert_eq!(coerce_text(&RawValue::Empty), None);
        assert_eq!(coerce_text(&RawValue::Int(3)), Some("3".to_string()));
        assert_eq!(coerce_text(&RawValue::Float(3.0)), Some("3.0".to_string()));
        assert_eq!(coerce_text(&RawValue::Float(2.5)), Some("2.5".to_string()));
        assert_eq!(coerce_text(&RawValue::Bool(false)), Some("False".to_string()));
        assert_eq!(coerce_text(&RawValue::Float(f64::NAN)), None);
    }

    #[test]
    fn extreme_floats_render_in_exponent_form() {
        let render = |value: f64| coerce_text(&RawValue::Float(value));
        assert_eq!(render(1e30), Some("1e+30".to_string()));
        assert_eq!(render(-2.5e16), Some("-2.5e+16".to_string()));
        assert_eq!(render(1.5e-5), Some("1.5e-05".to_string()));
        assert_eq!(render(0.0001), Some("0.0001".to_string()));
        assert_eq!(render(1e15), Some("1000000000000000.0".to_string()));
        assert_eq!(render(0.0), Some("0.0".to_string()));
        assert_eq!(render(f64::INFINITY), Some("inf".to_string()));
    }

    #[test]
    fn normalize_fills_missing_and_drops_extra_columns() {
        let table = RawTable::new(
            vec![
                "Essay_id".to_string(),
                "Essay".to_string(),
                "Essay_score".to_string(),
                "Unnamed: 14".to_string(),
            ],
            vec![
                vec![RawValue::Int(1), text("first"), RawValue::Float(6.0), text("x")],
                vec![RawValue::Int(2), RawValue::Empty, text("n/a"), RawValue::Empty],
            ],
        );
        let store = normalize(&table, essay_schema()).expect("normalize");
        assert_eq!(store.len(), 2);
        let schema = store.schema();
        let score = schema.position("Essay_score").expect("score");
        let essay = schema.position("Essay").expect("essay");
        let feedback = schema.position("Feedback_TR").expect("feedback");
        let second = store.get(1).expect("row");
        assert_eq!(second.integer_at(score), Some(0));
        assert_eq!(second.text_at(essay), Some(""));
        assert_eq!(second.text_at(feedback), Some(""));
        assert_eq!(store.get(0).and_then(|r| r.integer_at(score)), Some(6));
        for record in store.records() {
            assert_eq!(record.values().len(), schema.len());
            for (field, value) in schema.fields().iter().zip(record.values()) {
                match field.field_type {
                    FieldType::Integer => assert!(matches!(value, FieldValue::Integer(_))),
                    FieldType::Text => assert!(matches!(value, FieldValue::Text(_))),
                }
            }
        }
    }

    #[test]
    fn normalize_rejects_unrepresentable_integers() {
        let table = RawTable::new(
            vec!["Essay_id".to_string(), "Essay_score".to_string()],
            vec![
                vec![RawValue::Int(1), RawValue::Int(5)],
                vec![RawValue::Int(2), RawValue::Float(f64::NEG_INFINITY)],
            ],
        );
        let err = normalize(&table, essay_schema()).expect_err("violation");
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
        assert_eq!(err.row(), Some(1));
        assert_eq!(err.field(), Some("Essay_score"));
    }

    #[test]
    fn normalize_preserves_row_order() {
        let rows = (0..5).rev().map(|n| vec![RawValue::Int(n)]).collect();
        let table = RawTable::new(vec!["Essay_id".to_string()], rows);
        let store = normalize(&table, essay_schema()).expect("normalize");
        let ids: Vec<i64> = store
            .records()
            .iter()
            .filter_map(|r| r.integer_at(0))
            .collect();
        assert_eq!(ids, vec![4, 3, 2, 1, 0]);
    }
}
