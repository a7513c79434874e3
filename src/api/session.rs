//! Purpose: Shared, reloadable view of one loaded dataset.
//! Exports: `DatasetSession`, `DatasetSummary`, `ColumnInfo`, `RowSet`, `PageView`.
//! Role: State behind the viewer routes and the read-only CLI commands.
//! Invariants: Callers work on an `Arc` snapshot; `reload` swaps the snapshot atomically.
//! Invariants: A failed reload leaves the current snapshot in place.
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};

use super::dataset::{LoadedDataset, load_dataset};
use crate::core::error::{Error, ErrorKind};
use crate::core::page::paginate;
use crate::core::query::filter;
use crate::core::record::{QueryResult, RecordStore};
use crate::core::stats::{
    ColumnStats, CorrelationMatrix, DescribeReport, column_stats, correlation, describe,
    value_counts,
};

#[derive(Clone, Debug, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub dtype: &'static str,
    pub description: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct DatasetSummary {
    pub name: String,
    pub version: Option<String>,
    pub root: PathBuf,
    pub rows: usize,
    pub columns: Vec<ColumnInfo>,
}

impl DatasetSummary {
    pub fn of(dataset: &LoadedDataset) -> Self {
        Self {
            name: dataset.name().to_string(),
            version: dataset.info.as_ref().map(|info| info.version.clone()),
            root: dataset.layout.root().to_path_buf(),
            rows: dataset.store.len(),
            columns: dataset
                .store
                .schema()
                .fields()
                .iter()
                .map(|field| ColumnInfo {
                    name: field.name.clone(),
                    dtype: field.field_type.dtype(),
                    description: field.description.clone(),
                })
                .collect(),
        }
    }
}

/// Owned rows of a store, serialized as ordered objects.
#[derive(Clone, Debug)]
pub struct RowSet {
    store: RecordStore,
    positions: Vec<usize>,
}

impl RowSet {
    pub fn from_result(result: &QueryResult) -> Self {
        Self {
            store: result.store().clone(),
            positions: result.positions(),
        }
    }

    fn from_range(result: &QueryResult, start: usize, end: usize) -> Self {
        Self {
            store: result.store().clone(),
            positions: (start..end)
                .filter_map(|index| result.store_position(index))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn positions(&self) -> &[usize] {
        &self.positions
    }
}

impl Serialize for RowSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.positions.len()))?;
        for position in &self.positions {
            if let Some(record) = self.store.get(*position) {
                seq.serialize_element(&self.store.row(record))?;
            }
        }
        seq.end()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PageView {
    pub query: String,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total_count: usize,
    pub start: usize,
    pub end: usize,
    pub has_previous: bool,
    pub has_next: bool,
    pub rows: RowSet,
}

#[derive(Debug)]
pub struct DatasetSession {
    root: PathBuf,
    current: RwLock<Arc<LoadedDataset>>,
}

impl DatasetSession {
    pub fn open(path: &Path) -> Result<Self, Error> {
        load_dataset(path).map(Self::new)
    }

    pub fn new(dataset: LoadedDataset) -> Self {
        Self {
            root: dataset.layout.root().to_path_buf(),
            current: RwLock::new(Arc::new(dataset)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshot(&self) -> Result<Arc<LoadedDataset>, Error> {
        self.current
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| lock_poisoned())
    }

    /// Load the dataset from disk again and swap it in.
    pub fn reload(&self) -> Result<Arc<LoadedDataset>, Error> {
        let fresh = Arc::new(load_dataset(&self.root)?);
        let mut guard = self.current.write().map_err(|_| lock_poisoned())?;
        *guard = Arc::clone(&fresh);
        tracing::info!(rows = fresh.store.len(), "reloaded dataset");
        Ok(fresh)
    }

    pub fn summary(&self) -> Result<DatasetSummary, Error> {
        Ok(DatasetSummary::of(&*self.snapshot()?))
    }

    pub fn query(&self, term: &str) -> Result<QueryResult, Error> {
        Ok(filter(&self.snapshot()?.store, term))
    }

    pub fn search(&self, term: &str) -> Result<RowSet, Error> {
        Ok(RowSet::from_result(&self.query(term)?))
    }

    pub fn get_page(
        &self,
        term: &str,
        page_number: usize,
        page_size: usize,
    ) -> Result<PageView, Error> {
        let result = self.query(term)?;
        page_view(&result, term, page_number, page_size)
    }

    pub fn get_column_stats(&self, field: &str) -> Result<ColumnStats, Error> {
        column_stats(&self.snapshot()?.store, field)
    }

    pub fn describe(&self) -> Result<DescribeReport, Error> {
        describe(&self.snapshot()?.store)
    }

    pub fn correlation(&self) -> Result<CorrelationMatrix, Error> {
        Ok(correlation(&self.snapshot()?.store))
    }

    pub fn value_counts(&self, field: &str) -> Result<Vec<(i64, usize)>, Error> {
        value_counts(&self.snapshot()?.store, field)
    }
}

/// One page of `result` as an owned, serializable view.
pub fn page_view(
    result: &QueryResult,
    term: &str,
    page_number: usize,
    page_size: usize,
) -> Result<PageView, Error> {
    let page = paginate(result, page_size, page_number)?;
    Ok(PageView {
        query: term.to_string(),
        page: page.page_number,
        page_size: page.page_size,
        total_pages: page.total_pages,
        total_count: page.total_count,
        start: page.start,
        end: page.end,
        has_previous: page.has_previous(),
        has_next: page.has_next(),
        rows: RowSet::from_range(result, page.start, page.end),
    })
}

fn lock_poisoned() -> Error {
    Error::new(ErrorKind::Internal).with_message("dataset session lock poisoned")
}
