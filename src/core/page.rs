//! Purpose: Slice a query result into fixed-size pages.
//! Exports: `Page`, `paginate`, `total_pages`.
//! Role: Pagination for the viewer table and the `search` command.
//! Invariants: `end <= total_count`; an empty result still has exactly one page.
//! Invariants: Requests past the last page are rejected, never clamped.
use super::error::{Error, ErrorKind};
use super::record::{QueryResult, Record};

#[derive(Clone, Debug, PartialEq)]
pub struct Page<'a> {
    pub records: Vec<&'a Record>,
    pub page_number: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total_count: usize,
    pub start: usize,
    pub end: usize,
}

impl Page<'_> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_previous(&self) -> bool {
        self.page_number > 1
    }

    pub fn has_next(&self) -> bool {
        self.page_number < self.total_pages
    }
}

pub fn total_pages(total_count: usize, page_size: usize) -> usize {
    if total_count == 0 || page_size == 0 {
        return 1;
    }
    total_count.div_ceil(page_size)
}

pub fn paginate(
    result: &QueryResult,
    page_size: usize,
    page_number: usize,
) -> Result<Page<'_>, Error> {
    if page_size == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("page size must be at least 1")
            .with_hint("Use a positive page size like 25."));
    }
    let total_count = result.len();
    let total_pages = total_pages(total_count, page_size);
    if page_number == 0 || page_number > total_pages {
        return Err(Error::new(ErrorKind::OutOfRange)
            .with_message(format!(
                "page {page_number} is out of range (1..={total_pages})"
            ))
            .with_hint(format!("Request a page between 1 and {total_pages}.")));
    }
    let start = (page_number - 1) * page_size;
    let end = (start + page_size).min(total_count);
    let records = (start..end).filter_map(|index| result.get(index)).collect();
    Ok(Page {
        records,
        page_number,
        page_size,
        total_pages,
        total_count,
        start,
        end,
    })
}

#[cfg(test)]
mod tests {
    use super::{paginate, total_pages};
    use crate::core::error::ErrorKind;
    use crate::core::normalize::normalize;
    use crate::core::query::filter;
    use crate::core::record::RecordStore;
    use crate::core::schema::essay_schema;
    use crate::core::table::{RawTable, RawValue};

    fn store(count: i64) -> RecordStore {
        let rows = (1..=count)
            .map(|n| vec![RawValue::Int(n), RawValue::Text(format!("essay {n}"))])
            .collect();
        let table = RawTable::new(vec!["Essay_id".to_string(), "Essay".to_string()], rows);
        normalize(&table, essay_schema()).expect("normalize")
    }

    #[test]
    fn last_page_is_partial() {
        let store = store(5);
        let result = store.all();
        let page = paginate(&result, 2, 3).expect("page");
        assert_eq!(page.len(), 1);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total_count, 5);
        assert_eq!((page.start, page.end), (4, 5));
        assert_eq!(page.records[0].integer_at(0), Some(5));
        assert!(page.has_previous());
        assert!(!page.has_next());
    }

    #[test]
    fn empty_result_has_one_empty_page() {
        let store = store(3);
        let result = filter(&store, "no such text");
        let page = paginate(&result, 10, 1).expect("page");
        assert!(page.is_empty());
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.total_count, 0);
        let err = paginate(&result, 10, 2).expect_err("out of range");
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
    }

    #[test]
    fn page_past_the_end_is_rejected() {
        let store = store(5);
        let result = store.all();
        let err = paginate(&result, 2, 4).expect_err("out of range");
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
        let err = paginate(&result, 2, 0).expect_err("page zero");
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
        let err = paginate(&result, 0, 1).expect_err("size zero");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn repeated_calls_are_identical() {
        let store = store(7);
        let result = filter(&store, "essay");
        let first = paginate(&result, 3, 2).expect("page");
        let second = paginate(&result, 3, 2).expect("page");
        assert_eq!(first, second);
    }

    #[test]
    fn pages_cover_filtered_rows_in_order() {
        let store = store(12);
        let result = filter(&store, "essay 1");
        // essay 1, essay 10, essay 11, essay 12
        assert_eq!(result.len(), 4);
        let ids: Vec<i64> = (1..=total_pages(result.len(), 3))
            .flat_map(|n| {
                paginate(&result, 3, n)
                    .expect("page")
                    .records
                    .into_iter()
                    .filter_map(|r| r.integer_at(0))
                    .collect::<Vec<_>>()
            })
            .collect();
        assert_eq!(ids, vec![1, 10, 11, 12]);
    }
}
