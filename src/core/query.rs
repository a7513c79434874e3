//! Purpose: Case-insensitive substring search over the text fields of a record store.
//! Exports: `filter`, `SearchTerm`.
//! Role: Produces order-preserving `QueryResult` views for the viewer and CLI.
//! Invariants: An empty term returns the identity view without scanning.
//! Invariants: Only text-typed fields participate; integer fields never match.
use super::record::{QueryResult, Record, RecordStore};
use super::schema::FieldType;

/// A prepared search term; lowercased once per query.
#[derive(Clone, Debug)]
pub struct SearchTerm {
    needle: String,
}

impl SearchTerm {
    pub fn new(term: &str) -> Option<Self> {
        if term.is_empty() {
            return None;
        }
        Some(Self {
            needle: term.to_lowercase(),
        })
    }

    pub fn matches_text(&self, haystack: &str) -> bool {
        haystack.to_lowercase().contains(&self.needle)
    }

    pub fn matches_record(&self, record: &Record, text_positions: &[usize]) -> bool {
        text_positions.iter().any(|position| {
            record
                .text_at(*position)
                .is_some_and(|text| self.matches_text(text))
        })
    }
}

pub fn filter(store: &RecordStore, term: &str) -> QueryResult {
    let Some(term) = SearchTerm::new(term) else {
        return store.all();
    };
    let text_positions = store.schema().positions_of(FieldType::Text);
    let rows = store
        .records()
        .iter()
        .enumerate()
        .filter(|(_, record)| term.matches_record(record, &text_positions))
        .map(|(row, _)| row)
        .collect::<Vec<_>>();
    tracing::debug!(matches = rows.len(), total = store.len(), "filtered store");
    QueryResult::from_rows(store.clone(), rows)
}

#[cfg(test)]
mod tests {
    use super::{SearchTerm, filter};
    use crate::core::normalize::normalize;
    use crate::core::record::RecordStore;
    use crate::core::schema::essay_schema;
    use crate::core::table::{RawTable, RawValue};

    fn store(rows: &[(i64, &str, &str)]) -> RecordStore {
        let table = RawTable::new(
            vec![
                "Essay_id".to_string(),
                "Essay".to_string(),
                "Feedback_TR".to_string(),
            ],
            rows.iter()
                .map(|(id, essay, feedback)| {
                    vec![
                        RawValue::Int(*id),
                        RawValue::Text(essay.to_string()),
                        RawValue::Text(feedback.to_string()),
                    ]
                })
                .collect(),
        );
        normalize(&table, essay_schema()).expect("normalize")
    }

    fn essays(result: &crate::core::record::QueryResult) -> Vec<String> {
        let essay = result.store().schema().position("Essay").expect("essay");
        result
            .iter()
            .filter_map(|record| record.text_at(essay).map(str::to_string))
            .collect()
    }

    #[test]
    fn substring_match_preserves_store_order() {
        let store = store(&[(1, "cat", ""), (2, "dog", ""), (3, "catalog", "")]);
        let result = filter(&store, "cat");
        assert_eq!(essays(&result), vec!["cat", "catalog"]);
        assert_eq!(result.positions(), vec![0, 2]);
    }

    #[test]
    fn empty_term_is_identity() {
        let store = store(&[(1, "a", ""), (2, "b", "")]);
        let result = filter(&store, "");
        assert!(result.is_identity());
        assert_eq!(result, store.all());
    }

    #[test]
    fn match_is_case_insensitive_across_text_fields() {
        let store = store(&[
            (1, "nothing here", "Great COHESION"),
            (2, "Cohesion matters", ""),
            (3, "unrelated", "fine"),
        ]);
        let result = filter(&store, "cohesion");
        assert_eq!(result.positions(), vec![0, 1]);
    }

    #[test]
    fn integer_fields_are_not_searched() {
        let store = store(&[(42, "essay", "feedback")]);
        assert!(filter(&store, "42").is_empty());
    }

    #[test]
    fn matches_and_non_matches_partition_the_store() {
        let store = store(&[
            (1, "Alpha", "x"),
            (2, "beta", "ALPHA"),
            (3, "gamma", "delta"),
            (4, "", ""),
        ]);
        let term = SearchTerm::new("alpha").expect("term");
        let text_positions = store
            .schema()
            .positions_of(crate::core::schema::FieldType::Text);
        let result = filter(&store, "alpha");
        let matched = result.positions();
        for (row, record) in store.records().iter().enumerate() {
            assert_eq!(
                matched.contains(&row),
                term.matches_record(record, &text_positions)
            );
        }
        assert_eq!(matched, vec![0, 1]);
    }

    #[test]
    fn unicode_terms_lowercase_both_sides() {
        let store = store(&[(1, "Ärger im Büro", ""), (2, "calm", "")]);
        assert_eq!(filter(&store, "äRGER").positions(), vec![0]);
    }
}
