//! Purpose: Public Rust API of essayset: loading, persisting, viewing, and publishing datasets.
//! Exports: Pipeline types from `core` plus the dataset, session, and registry layers.
//! Role: The only path the CLI and server use into the pipeline.
//! Invariants: Submodules stay private; everything callers need is re-exported here.

mod dataset;
mod hub;
mod publish;
mod session;
mod sheet;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::normalize::{IntegerCoercion, coerce_integer, coerce_text, normalize};
pub use crate::core::page::{Page, paginate, total_pages};
pub use crate::core::query::{SearchTerm, filter};
pub use crate::core::record::{FieldValue, QueryResult, Record, RecordStore, RecordView};
pub use crate::core::schema::{FieldSpec, FieldType, FillPolicy, Schema, essay_schema};
pub use crate::core::stats::{
    ColumnStats, CorrelationMatrix, DescribeReport, NumericSummary, TextSummary,
    aggregate_numeric, aggregate_text, column_stats, correlation, describe, percentile,
    value_counts,
};
pub use crate::core::table::{ColumnProfile, RawTable, RawValue, TableProfile};
pub use dataset::{
    DatasetInfo, DatasetLayout, FeatureInfo, Features, LoadedDataset, README_FILE, SplitInfo,
    load_dataset, render_readme, save_dataset,
};
pub use hub::{
    CommitReport, DEFAULT_ENDPOINT, HubClient, HubConfig, Identity, RepoId, TokenSource,
    UploadedFile,
};
pub use publish::{
    DatasetRegistry, PublishReport, PublishRequest, PublishStep, StepStatus, publish,
};
pub use session::{ColumnInfo, DatasetSession, DatasetSummary, PageView, RowSet, page_view};
pub use sheet::{InputFormat, load_table, read_csv, read_json_rows};
