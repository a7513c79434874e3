//! Purpose: Write and read the persisted dataset directory.
//! Exports: `DatasetInfo`, `Features`, `FeatureInfo`, `SplitInfo`, `DatasetLayout`,
//!          `LoadedDataset`, `save_dataset`, `load_dataset`, `render_readme`.
//! Role: On-disk contract shared by `convert`, the viewer, and `upload`.
//! Invariants: Layout is `<root>/dataset/{dataset_dict.json,train/data.jsonl}`,
//!             `<root>/dataset_info.json`, `<root>/README.md`.
//! Invariants: Feature order in the sidecar is the schema order.
//! Invariants: Loading always re-normalizes rows, so hand-edited files cannot break record typing.
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::sheet::read_json_lines_file;
use crate::core::error::{Error, ErrorKind};
use crate::core::normalize::normalize;
use crate::core::record::RecordStore;
use crate::core::schema::{FieldSpec, FieldType, Schema, essay_schema};

pub const DATASET_DIR: &str = "dataset";
pub const TRAIN_SPLIT: &str = "train";
pub const DATA_FILE: &str = "data.jsonl";
pub const DICT_FILE: &str = "dataset_dict.json";
pub const INFO_FILE: &str = "dataset_info.json";
pub const README_FILE: &str = "README.md";

pub const DEFAULT_DATASET_NAME: &str = "essay_feedback_dataset";
pub const DEFAULT_VERSION: &str = "1.0.0";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureInfo {
    pub dtype: String,
    #[serde(default)]
    pub description: String,
}

/// Ordered `field -> feature` map.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Features(pub Vec<(String, FeatureInfo)>);

impl Serialize for Features {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, feature) in &self.0 {
            map.serialize_entry(name, feature)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Features {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FeaturesVisitor;

        impl<'de> Visitor<'de> for FeaturesVisitor {
            type Value = Features;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field name to feature")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Features, A::Error> {
                let mut out = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, feature)) = access.next_entry::<String, FeatureInfo>()? {
                    out.push((name, feature));
                }
                Ok(Features(out))
            }
        }

        deserializer.deserialize_map(FeaturesVisitor)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitInfo {
    pub num_examples: usize,
    #[serde(default)]
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub dataset_name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub task_categories: Vec<String>,
    pub features: Features,
    #[serde(default)]
    pub splits: BTreeMap<String, SplitInfo>,
}

impl DatasetInfo {
    pub fn for_store(store: &RecordStore) -> Self {
        let features = store
            .schema()
            .fields()
            .iter()
            .map(|field| {
                (
                    field.name.clone(),
                    FeatureInfo {
                        dtype: field.field_type.dtype().to_string(),
                        description: field.description.clone(),
                    },
                )
            })
            .collect();
        let mut splits = BTreeMap::new();
        splits.insert(
            TRAIN_SPLIT.to_string(),
            SplitInfo {
                num_examples: store.len(),
                description: "Training split".to_string(),
            },
        );
        Self {
            dataset_name: DEFAULT_DATASET_NAME.to_string(),
            version: DEFAULT_VERSION.to_string(),
            description: "English essay scoring and feedback dataset".to_string(),
            language: "zh".to_string(),
            task_categories: vec![
                "text-classification".to_string(),
                "text-generation".to_string(),
            ],
            features: Features(features),
            splits,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.dataset_name = name.into();
        self
    }

    /// Rebuild the schema declared by `features`.
    pub fn schema(&self) -> Result<Arc<Schema>, Error> {
        let mut fields = Vec::with_capacity(self.features.0.len());
        for (name, feature) in &self.features.0 {
            let field_type = FieldType::from_dtype(&feature.dtype).ok_or_else(|| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("unsupported feature dtype `{}`", feature.dtype))
                    .with_field(name.clone())
                    .with_hint("Supported dtypes: int64, string.")
            })?;
            fields.push(FieldSpec::new(name.clone(), field_type, feature.description.clone()));
        }
        Schema::new(fields).map(Arc::new)
    }

    pub fn num_examples(&self, split: &str) -> Option<usize> {
        self.splits.get(split).map(|info| info.num_examples)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct DatasetDict {
    splits: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetLayout {
    root: PathBuf,
}

impl DatasetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Accept either the output root or its `dataset/` directory.
    pub fn resolve(path: &Path) -> Result<Self, Error> {
        if path.join(DATASET_DIR).join(DICT_FILE).is_file() {
            return Ok(Self::new(path));
        }
        if path.join(DICT_FILE).is_file() {
            return Ok(Self::new(parent_or_current(path)));
        }
        Err(Error::new(ErrorKind::NotFound)
            .with_message("dataset not found")
            .with_path(path)
            .with_hint("Point at a directory created by `essayset convert`."))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dataset_dir(&self) -> PathBuf {
        self.root.join(DATASET_DIR)
    }

    pub fn dict_file(&self) -> PathBuf {
        self.dataset_dir().join(DICT_FILE)
    }

    pub fn split_file(&self, split: &str) -> PathBuf {
        self.dataset_dir().join(split).join(DATA_FILE)
    }

    pub fn info_file(&self) -> PathBuf {
        self.root.join(INFO_FILE)
    }

    pub fn readme_file(&self) -> PathBuf {
        self.root.join(README_FILE)
    }
}

// A bare relative name like `dataset` has an empty parent; that means the working directory.
fn parent_or_current(path: &Path) -> PathBuf {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Clone, Debug)]
pub struct LoadedDataset {
    pub layout: DatasetLayout,
    pub info: Option<DatasetInfo>,
    pub store: RecordStore,
}

impl LoadedDataset {
    pub fn name(&self) -> &str {
        self.info
            .as_ref()
            .map(|info| info.dataset_name.as_str())
            .unwrap_or(DEFAULT_DATASET_NAME)
    }
}

pub fn save_dataset(
    store: &RecordStore,
    info: &DatasetInfo,
    output_dir: &Path,
) -> Result<DatasetLayout, Error> {
    let layout = DatasetLayout::new(output_dir);
    let split_file = layout.split_file(TRAIN_SPLIT);
    if let Some(parent) = split_file.parent() {
        create_dir(parent)?;
    }

    let file = File::create(&split_file).map_err(|err| io_error(err, &split_file, "failed to create split file"))?;
    let mut writer = BufWriter::new(file);
    for record in store.records() {
        serde_json::to_writer(&mut writer, &store.row(record)).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode record")
                .with_path(&split_file)
                .with_source(err)
        })?;
        writer
            .write_all(b"\n")
            .map_err(|err| io_error(err, &split_file, "failed to write split file"))?;
    }
    writer
        .flush()
        .map_err(|err| io_error(err, &split_file, "failed to write split file"))?;

    let dict = DatasetDict {
        splits: vec![TRAIN_SPLIT.to_string()],
    };
    write_json(&layout.dict_file(), &dict)?;
    write_json(&layout.info_file(), info)?;
    let readme = layout.readme_file();
    fs::write(&readme, render_readme(info))
        .map_err(|err| io_error(err, &readme, "failed to write README"))?;

    tracing::info!(
        root = %layout.root().display(),
        rows = store.len(),
        "saved dataset"
    );
    Ok(layout)
}

pub fn load_dataset(path: &Path) -> Result<LoadedDataset, Error> {
    let layout = DatasetLayout::resolve(path)?;
    let info = read_info(&layout.info_file())?;
    let schema = match &info {
        Some(info) => info.schema()?,
        None => {
            tracing::warn!(
                path = %layout.info_file().display(),
                "dataset_info.json missing; using the built-in essay schema"
            );
            essay_schema()
        }
    };

    let dict_path = layout.dict_file();
    let dict: DatasetDict = read_json(&dict_path)?;
    if !dict.splits.iter().any(|split| split == TRAIN_SPLIT) {
        return Err(Error::new(ErrorKind::NotFound)
            .with_message("dataset has no train split")
            .with_path(dict_path));
    }

    let split_file = layout.split_file(TRAIN_SPLIT);
    let table = read_json_lines_file(&split_file)?;
    let store = normalize(&table, schema).map_err(|err| err.with_path(&split_file))?;
    if let Some(expected) = info.as_ref().and_then(|info| info.num_examples(TRAIN_SPLIT)) {
        if expected != store.len() {
            tracing::warn!(
                expected,
                actual = store.len(),
                "train split size differs from dataset_info.json"
            );
        }
    }
    tracing::info!(root = %layout.root().display(), rows = store.len(), "loaded dataset");
    Ok(LoadedDataset {
        layout,
        info,
        store,
    })
}

fn read_info(path: &Path) -> Result<Option<DatasetInfo>, Error> {
    if !path.is_file() {
        return Ok(None);
    }
    read_json(path).map(Some)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Error> {
    let text = fs::read_to_string(path).map_err(|err| io_error(err, path, "failed to read file"))?;
    serde_json::from_str(&text).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid json")
            .with_path(path)
            .with_source(err)
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), Error> {
    let mut text = serde_json::to_string_pretty(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode json")
            .with_path(path)
            .with_source(err)
    })?;
    text.push('\n');
    fs::write(path, text).map_err(|err| io_error(err, path, "failed to write file"))
}

fn create_dir(path: &Path) -> Result<(), Error> {
    fs::create_dir_all(path).map_err(|err| io_error(err, path, "failed to create directory"))
}

fn io_error(err: std::io::Error, path: &Path, message: &str) -> Error {
    let kind = match err.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::NotFound,
        std::io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::Io,
    };
    Error::new(kind)
        .with_message(message)
        .with_path(path)
        .with_source(err)
}

pub fn render_readme(info: &DatasetInfo) -> String {
    let examples = info.num_examples(TRAIN_SPLIT).unwrap_or(0);
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", title_case(&info.dataset_name)));
    out.push_str("## Description\n\n");
    out.push_str(&format!("{}\n\n", info.description));
    out.push_str("## Structure\n\n");
    out.push_str(&format!("- **Examples (train)**: {examples}\n"));
    out.push_str(&format!("- **Features**: {}\n", info.features.0.len()));
    out.push_str(&format!("- **Version**: {}\n", info.version));
    if !info.language.is_empty() {
        out.push_str(&format!("- **Language**: {}\n", info.language));
    }
    if !info.task_categories.is_empty() {
        out.push_str(&format!(
            "- **Task categories**: {}\n",
            info.task_categories.join(", ")
        ));
    }
    out.push_str("\n## Fields\n\n");
    out.push_str("| Field | Type | Description |\n|---|---|---|\n");
    for (name, feature) in &info.features.0 {
        out.push_str(&format!(
            "| `{name}` | `{}` | {} |\n",
            feature.dtype, feature.description
        ));
    }
    out.push_str("\n## Layout\n\n");
    out.push_str(&format!(
        "- `{DATASET_DIR}/{DICT_FILE}`: split list\n- `{DATASET_DIR}/{TRAIN_SPLIT}/{DATA_FILE}`: one JSON object per record\n- `{INFO_FILE}`: feature and split metadata\n"
    ));
    out.push_str("\n## Usage\n\n```sh\n");
    out.push_str("essayset info .\n");
    out.push_str("essayset search . \"cohesion\" --page-size 10\n");
    out.push_str("essayset stats . Essay_score\n");
    out.push_str("essayset serve .\n");
    out.push_str("```\n\n");
    out.push_str("```python\nfrom datasets import load_dataset\n\n");
    out.push_str(&format!(
        "ds = load_dataset(\"json\", data_files={{\"{TRAIN_SPLIT}\": \"{DATASET_DIR}/{TRAIN_SPLIT}/{DATA_FILE}\"}})\n"
    ));
    out.push_str("```\n");
    out
}

fn title_case(name: &str) -> String {
    name.split(['_', '-', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
