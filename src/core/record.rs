//! Purpose: Typed records, the immutable record store, and order-preserving query views.
//! Exports: `FieldValue`, `Record`, `RecordStore`, `QueryResult`, `RecordView`, `RecordRow`.
//! Role: The unit exchanged between normalizer, filter, pagination, stats, and layout.
//! Invariants: A store never changes after construction; clones share the same records.
//! Invariants: Query results hold row membership only, in ascending store order.
//! Invariants: The identity query carries no index list.
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};

use super::schema::Schema;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
}

impl FieldValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(value) => Some(*value),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(value) => Some(value.as_str()),
            FieldValue::Integer(_) => None,
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Integer(value) => serializer.serialize_i64(*value),
            FieldValue::Text(value) => serializer.serialize_str(value),
        }
    }
}

/// One normalized row; values are positional in schema order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    values: Box<[FieldValue]>,
}

impl Record {
    pub(crate) fn from_values(values: Vec<FieldValue>) -> Self {
        Self {
            values: values.into_boxed_slice(),
        }
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    pub fn get(&self, position: usize) -> Option<&FieldValue> {
        self.values.get(position)
    }

    pub fn integer_at(&self, position: usize) -> Option<i64> {
        self.get(position).and_then(FieldValue::as_integer)
    }

    pub fn text_at(&self, position: usize) -> Option<&str> {
        self.get(position).and_then(FieldValue::as_text)
    }
}

/// A record paired with its schema so it serializes as an ordered JSON object.
pub struct RecordRow<'a> {
    pub schema: &'a Schema,
    pub record: &'a Record,
}

impl Serialize for RecordRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.schema.len()))?;
        for (field, value) in self.schema.fields().iter().zip(self.record.values()) {
            map.serialize_entry(&field.name, value)?;
        }
        map.end()
    }
}

#[derive(Clone, Debug)]
pub struct RecordStore {
    schema: Arc<Schema>,
    records: Arc<[Record]>,
}

impl RecordStore {
    pub(crate) fn new(schema: Arc<Schema>, records: Vec<Record>) -> Self {
        Self {
            schema,
            records: records.into(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, row: usize) -> Option<&Record> {
        self.records.get(row)
    }

    pub fn row<'a>(&'a self, record: &'a Record) -> RecordRow<'a> {
        RecordRow {
            schema: &self.schema,
            record,
        }
    }

    /// View covering the whole store.
    pub fn all(&self) -> QueryResult {
        QueryResult {
            store: self.clone(),
            rows: None,
        }
    }

    /// True when both handles point at the same underlying records.
    pub fn shares_records_with(&self, other: &RecordStore) -> bool {
        Arc::ptr_eq(&self.records, &other.records)
    }
}

#[derive(Clone, Debug)]
pub struct QueryResult {
    store: RecordStore,
    rows: Option<Arc<[usize]>>,
}

impl QueryResult {
    /// `rows` must be strictly ascending store positions.
    pub(crate) fn from_rows(store: RecordStore, rows: Vec<usize>) -> Self {
        debug_assert!(rows.windows(2).all(|pair| pair[0] < pair[1]));
        Self {
            store,
            rows: Some(rows.into()),
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn is_identity(&self) -> bool {
        self.rows.is_none()
    }

    pub fn len(&self) -> usize {
        match &self.rows {
            Some(rows) => rows.len(),
            None => self.store.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store position of the `index`-th matching record.
    pub fn store_position(&self, index: usize) -> Option<usize> {
        match &self.rows {
            Some(rows) => rows.get(index).copied(),
            None => (index < self.store.len()).then_some(index),
        }
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.store_position(index)
            .and_then(|position| self.store.get(position))
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = &Record> + '_> {
        match &self.rows {
            Some(rows) => Box::new(rows.iter().filter_map(|row| self.store.get(*row))),
            None => Box::new(self.store.records().iter()),
        }
    }

    pub fn positions(&self) -> Vec<usize> {
        match &self.rows {
            Some(rows) => rows.to_vec(),
            None => (0..self.store.len()).collect(),
        }
    }
}

impl PartialEq for QueryResult {
    fn eq(&self, other: &Self) -> bool {
        self.store.schema() == other.store.schema()
            && self.len() == other.len()
            && self.iter().eq(other.iter())
    }
}

/// Read-only row source accepted by the aggregators.
pub trait RecordView {
    fn schema(&self) -> &Schema;
    fn row_count(&self) -> usize;
    fn records_iter(&self) -> Box<dyn Iterator<Item = &Record> + '_>;
}

impl RecordView for RecordStore {
    fn schema(&self) -> &Schema {
        RecordStore::schema(self)
    }

    fn row_count(&self) -> usize {
        self.len()
    }

    fn records_iter(&self) -> Box<dyn Iterator<Item = &Record> + '_> {
        Box::new(self.records.iter())
    }
}

impl RecordView for QueryResult {
    fn schema(&self) -> &Schema {
        self.store.schema()
    }

    fn row_count(&self) -> usize {
        self.len()
    }

    fn records_iter(&self) -> Box<dyn Iterator<Item = &Record> + '_> {
        self.iter()
    }
}
