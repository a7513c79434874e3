//! Purpose: Declare the typed field layout records are normalized into.
//! Exports: `FieldType`, `FillPolicy`, `FieldSpec`, `Schema`, `essay_schema`.
//! Role: Single source of truth for field order, types, and missing-value rules.
//! Invariants: Field names are unique; order is the record/column order everywhere.
//! Invariants: Fill policies are explicit per field, never an ambient default.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldType {
    Integer,
    Text,
}

impl FieldType {
    /// Dtype name used in `dataset_info.json`.
    pub fn dtype(self) -> &'static str {
        match self {
            FieldType::Integer => "int64",
            FieldType::Text => "string",
        }
    }

    pub fn from_dtype(dtype: &str) -> Option<Self> {
        match dtype {
            "int64" | "int32" | "int16" | "int8" | "integer" => Some(FieldType::Integer),
            "string" | "large_string" | "text" => Some(FieldType::Text),
            _ => None,
        }
    }

    pub fn default_fill(self) -> FillPolicy {
        match self {
            FieldType::Integer => FillPolicy::Integer(0),
            FieldType::Text => FillPolicy::Text(String::new()),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dtype())
    }
}

/// Value substituted when a cell is absent or cannot be coerced.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FillPolicy {
    Integer(i64),
    Text(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub fill: FillPolicy,
    pub description: String,
}

impl FieldSpec {
    pub fn integer(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer, description)
    }

    pub fn text(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, FieldType::Text, description)
    }

    pub fn new(
        name: impl Into<String>,
        field_type: FieldType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            field_type,
            fill: field_type.default_fill(),
            description: description.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    fields: Vec<FieldSpec>,
    index: HashMap<String, usize>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, Error> {
        let mut index = HashMap::with_capacity(fields.len());
        for (idx, field) in fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("schema field names must not be empty"));
            }
            if index.insert(field.name.clone(), idx).is_some() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("duplicate schema field")
                    .with_field(field.name.clone()));
            }
            let fill_matches = matches!(
                (&field.fill, field.field_type),
                (FillPolicy::Integer(_), FieldType::Integer) | (FillPolicy::Text(_), FieldType::Text)
            );
            if !fill_matches {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("fill policy does not match field type")
                    .with_field(field.name.clone()));
            }
        }
        Ok(Self { fields, index })
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.position(name).map(|idx| &self.fields[idx])
    }

    /// Resolve a field name, failing with `NotFound` for undeclared names.
    pub fn require(&self, name: &str) -> Result<(usize, &FieldSpec), Error> {
        self.position(name)
            .map(|idx| (idx, &self.fields[idx]))
            .ok_or_else(|| {
                Error::new(ErrorKind::NotFound)
                    .with_message("unknown field")
                    .with_field(name)
                    .with_hint(format!("Known fields: {}.", self.field_names().join(", ")))
            })
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|field| field.name.as_str()).collect()
    }

    pub fn positions_of(&self, field_type: FieldType) -> Vec<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, field)| field.field_type == field_type)
            .map(|(idx, _)| idx)
            .collect()
    }
}

/// The fixed essay-scoring schema.
pub fn essay_schema() -> Arc<Schema> {
    let fields = vec![
        FieldSpec::integer("Essay_id", "Essay identifier"),
        FieldSpec::text("Essay_Prompt", "Essay prompt"),
        FieldSpec::text("Essay", "Essay body"),
        FieldSpec::integer("Essay_score", "Essay total score"),
        FieldSpec::integer("Overall_score", "Overall band score"),
        FieldSpec::integer("Score_TR", "Task response score"),
        FieldSpec::integer("Score_CC", "Coherence and cohesion score"),
        FieldSpec::integer("Score_LR", "Lexical resource score"),
        FieldSpec::integer("Score_GRA", "Grammatical range and accuracy score"),
        FieldSpec::text("Feedback_TR", "Task response feedback"),
        FieldSpec::text("Feedback_CC", "Coherence and cohesion feedback"),
        FieldSpec::text("Feedback_LR", "Lexical resource feedback"),
        FieldSpec::text("Feedback_GRA", "Grammatical range and accuracy feedback"),
        FieldSpec::text("Suggestion for improvement", "Suggestions for improvement"),
    ];
    // Names above are distinct literals, so construction cannot fail.
    Arc::new(Schema {
        index: fields
            .iter()
            .enumerate()
            .map(|(idx, field)| (field.name.clone(), idx))
            .collect(),
        fields,
    })
}
