//! Purpose: Read input tables (workbooks, CSV, JSON/JSONL) into a `RawTable`.
//! Exports: `InputFormat`, `load_table`, `read_csv`, `read_json_rows`.
//! Role: The spreadsheet-parser edge of the pipeline; nothing here knows the schema.
//! Invariants: The first row of a sheet/CSV is the header; blank headers become `Unnamed: N`.
//! Invariants: Missing-value tokens map to `RawValue::Empty`, never to a fill value.
//! Invariants: CSV cells stay text; workbook dates become timestamp text.
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use calamine::{Data, ExcelDateTime, ExcelDateTimeType, Reader, open_workbook_auto};
use serde_json::Value;
use time::{Date, Duration, Month, PrimitiveDateTime, Time};

use crate::core::error::{Error, ErrorKind};
use crate::core::table::{RawTable, RawValue};

/// CSV cells treated as missing, matching common dataframe readers.
const MISSING_TOKENS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "NULL", "null", "None", "#N/A"];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InputFormat {
    Workbook,
    Csv,
    Json,
    JsonLines,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(InputFormat::Workbook),
            "csv" => Ok(InputFormat::Csv),
            "json" => Ok(InputFormat::Json),
            "jsonl" | "ndjson" => Ok(InputFormat::JsonLines),
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message("unsupported input format")
                .with_path(path)
                .with_hint("Use a .xlsx, .xls, .ods, .csv, .json, or .jsonl file.")),
        }
    }
}

/// Load the table at `path`. `sheet` selects a worksheet by name (workbooks only);
/// otherwise the first sheet is read.
pub fn load_table(path: &Path, sheet: Option<&str>) -> Result<RawTable, Error> {
    if !path.exists() {
        return Err(Error::new(ErrorKind::NotFound)
            .with_message("input file not found")
            .with_path(path));
    }
    let format = InputFormat::from_path(path)?;
    if sheet.is_some() && format != InputFormat::Workbook {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--sheet only applies to workbook inputs")
            .with_path(path));
    }
    let table = match format {
        InputFormat::Workbook => read_workbook(path, sheet)?,
        InputFormat::Csv => read_csv(open(path)?).map_err(|err| err.with_path(path))?,
        InputFormat::Json => {
            let rows: Value = serde_json::from_reader(BufReader::new(open(path)?)).map_err(|err| {
                Error::new(ErrorKind::Usage)
                    .with_message("invalid json input")
                    .with_path(path)
                    .with_source(err)
            })?;
            read_json_rows(rows).map_err(|err| err.with_path(path))?
        }
        InputFormat::JsonLines => read_json_lines(open(path)?).map_err(|err| err.with_path(path))?,
    };
    tracing::info!(
        path = %path.display(),
        rows = table.len(),
        columns = table.columns().len(),
        "loaded input table"
    );
    Ok(table)
}

fn open(path: &Path) -> Result<File, Error> {
    File::open(path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to open input")
            .with_path(path)
            .with_source(err)
    })
}

fn read_workbook(path: &Path, sheet: Option<&str>) -> Result<RawTable, Error> {
    let mut workbook = open_workbook_auto(path).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("failed to open workbook: {err}"))
            .with_path(path)
    })?;
    let names = workbook.sheet_names();
    let name = match sheet {
        Some(wanted) => names
            .iter()
            .find(|name| name.as_str() == wanted)
            .cloned()
            .ok_or_else(|| {
                Error::new(ErrorKind::NotFound)
                    .with_message(format!("sheet `{wanted}` not found"))
                    .with_path(path)
                    .with_hint(format!("Available sheets: {}.", names.join(", ")))
            })?,
        None => names.first().cloned().ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message("workbook has no sheets")
                .with_path(path)
        })?,
    };
    let range = workbook.worksheet_range(&name).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("failed to read sheet `{name}`: {err}"))
            .with_path(path)
    })?;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(RawTable::new(Vec::new(), Vec::new()));
    };
    let columns = header
        .iter()
        .enumerate()
        .map(|(idx, cell)| header_name(idx, &cell_text(cell)))
        .collect();
    let values = rows
        .map(|row| row.iter().map(raw_from_cell).collect())
        .collect();
    Ok(RawTable::new(columns, values))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(text) => text.clone(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn raw_from_cell(cell: &Data) -> RawValue {
    match cell {
        Data::Empty | Data::Error(_) => RawValue::Empty,
        Data::Int(value) => RawValue::Int(*value),
        Data::Float(value) => RawValue::Float(*value),
        Data::Bool(value) => RawValue::Bool(*value),
        Data::String(text) if text.is_empty() => RawValue::Empty,
        Data::String(text) => RawValue::Text(text.clone()),
        Data::DateTime(value) => match excel_timestamp(value) {
            Some(text) => RawValue::Text(text),
            None => RawValue::Float(value.as_f64()),
        },
        Data::DateTimeIso(text) | Data::DurationIso(text) => RawValue::Text(text.clone()),
    }
}

// Days between the 1900 and 1904 workbook epochs.
const EPOCH_1904_OFFSET: f64 = 1462.0;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Render a workbook date cell as `YYYY-MM-DD HH:MM:SS[.ffffff]`; durations yield `None`.
fn excel_timestamp(cell: &ExcelDateTime) -> Option<String> {
    let serial = cell.as_f64();
    // ExcelDateTime keeps its kind and epoch private; compare against rebuilt values.
    let rebuilt = |kind, is_1904| ExcelDateTime::new(serial, kind, is_1904);
    if *cell == rebuilt(ExcelDateTimeType::TimeDelta, false)
        || *cell == rebuilt(ExcelDateTimeType::TimeDelta, true)
    {
        return None;
    }
    let is_1904 = *cell == rebuilt(ExcelDateTimeType::DateTime, true);
    serial_to_timestamp(serial, is_1904)
}

fn serial_to_timestamp(serial: f64, is_1904: bool) -> Option<String> {
    let mut days = if is_1904 { serial + EPOCH_1904_OFFSET } else { serial };
    // Serials below 60 predate the phantom 1900-02-29 of the 1900 epoch.
    if days < 60.0 {
        days += 1.0;
    }
    let millis = (days * MILLIS_PER_DAY).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    let epoch = Date::from_calendar_date(1899, Month::December, 30).ok()?;
    let moment = PrimitiveDateTime::new(epoch, Time::MIDNIGHT)
        .checked_add(Duration::milliseconds(millis as i64))?;
    let mut text = format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        moment.year(),
        u8::from(moment.month()),
        moment.day(),
        moment.hour(),
        moment.minute(),
        moment.second()
    );
    if moment.microsecond() != 0 {
        text.push_str(&format!(".{:06}", moment.microsecond()));
    }
    Some(text)
}

fn header_name(idx: usize, raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        format!("Unnamed: {idx}")
    } else {
        trimmed.to_string()
    }
}

pub fn read_csv<R: Read>(reader: R) -> Result<RawTable, Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let columns = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .enumerate()
        .map(|(idx, name)| header_name(idx, name))
        .collect::<Vec<_>>();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        rows.push(record.iter().map(raw_from_csv).collect());
    }
    Ok(RawTable::new(columns, rows))
}

fn csv_error(err: csv::Error) -> Error {
    let mut out = Error::new(ErrorKind::Usage).with_message("invalid csv input");
    if let Some(position) = err.position() {
        out = out.with_row(position.record() as usize);
    }
    out.with_source(err)
}

/// CSV cells stay text; numeric and boolean readings happen per field during normalization.
fn raw_from_csv(cell: &str) -> RawValue {
    if MISSING_TOKENS.contains(&cell) {
        return RawValue::Empty;
    }
    RawValue::Text(cell.to_string())
}

/// Rows from a JSON array of objects.
pub fn read_json_rows(value: Value) -> Result<RawTable, Error> {
    let Value::Array(items) = value else {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("json input must be an array of row objects"));
    };
    let mut rows = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(map) => rows.push(map),
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("json row is not an object")
                    .with_row(idx));
            }
        }
    }
    Ok(RawTable::from_json_rows(&rows))
}

/// Rows from a JSON-lines file on disk; errors carry the path.
pub(crate) fn read_json_lines_file(path: &Path) -> Result<RawTable, Error> {
    let file = File::open(path).map_err(|err| {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            _ => ErrorKind::Io,
        };
        Error::new(kind)
            .with_message("failed to open json lines")
            .with_path(path)
            .with_source(err)
    })?;
    read_json_lines(file).map_err(|err| err.with_path(path))
}

fn read_json_lines<R: Read>(reader: R) -> Result<RawTable, Error> {
    let mut rows = Vec::new();
    for (idx, line) in BufReader::new(reader).lines().enumerate() {
        let line = line.map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read json lines")
                .with_source(err)
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(&line).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid json line")
                .with_row(idx)
                .with_source(err)
        })?;
        match value {
            Value::Object(map) => rows.push(map),
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("json line is not an object")
                    .with_row(idx));
            }
        }
    }
    Ok(RawTable::from_json_rows(&rows))
}

#[cfg(test)]
mod tests {
    use super::{
        InputFormat, excel_timestamp, load_table, raw_from_cell, read_csv, read_json_rows,
        serial_to_timestamp,
    };
    use calamine::{Data, ExcelDateTime, ExcelDateTimeType};
    use crate::core::error::ErrorKind;
    use crate::core::normalize::normalize;
    use crate::core::schema::essay_schema;
    use crate::core::table::RawValue;
    use serde_json::json;
    use std::path::Path;

    #[test]
    fn csv_cells_keep_source_text() {
        let input = "Essay_id,Essay,Essay_score,\n1,\"Hello, world\",6.5,x\n2,NA,,\n007,true,TRUE,1e3\n";
        let table = read_csv(input.as_bytes()).expect("csv");
        assert_eq!(table.columns()[3], "Unnamed: 3");
        assert_eq!(table.len(), 3);
        assert_eq!(table.value(0, "Essay"), &RawValue::Text("Hello, world".to_string()));
        assert_eq!(table.value(0, "Essay_score"), &RawValue::Text("6.5".to_string()));
        assert_eq!(table.value(1, "Essay"), &RawValue::Empty);
        assert_eq!(table.value(1, "Essay_score"), &RawValue::Empty);
        assert_eq!(table.value(2, "Essay_id"), &RawValue::Text("007".to_string()));
        assert_eq!(table.value(2, "Essay"), &RawValue::Text("true".to_string()));
        assert_eq!(table.value(2, "Unnamed: 3"), &RawValue::Text("1e3".to_string()));
    }

    #[test]
    fn csv_text_fields_survive_normalization() {
        let input = "Essay_id,Essay_Prompt,Feedback_TR,Essay,Essay_score\n007,007,true,1e3,6.5\n";
        let table = read_csv(input.as_bytes()).expect("csv");
        let store = normalize(&table, essay_schema()).expect("normalize");
        let schema = store.schema();
        let record = store.get(0).expect("row");
        let at = |field: &str| schema.position(field).expect("field");
        assert_eq!(record.integer_at(at("Essay_id")), Some(7));
        assert_eq!(record.text_at(at("Essay_Prompt")), Some("007"));
        assert_eq!(record.text_at(at("Feedback_TR")), Some("true"));
        assert_eq!(record.text_at(at("Essay")), Some("1e3"));
        assert_eq!(record.integer_at(at("Essay_score")), Some(6));
    }

    #[test]
    fn workbook_dates_render_as_timestamps() {
        assert_eq!(
            serial_to_timestamp(45000.5, false).as_deref(),
            Some("2023-03-15 12:00:00")
        );
        assert_eq!(
            serial_to_timestamp(25569.0, false).as_deref(),
            Some("1970-01-01 00:00:00")
        );
        assert_eq!(
            serial_to_timestamp(43538.5, true).as_deref(),
            Some("2023-03-15 12:00:00")
        );
        assert_eq!(serial_to_timestamp(f64::INFINITY, false), None);

        let date = ExcelDateTime::new(45000.25, ExcelDateTimeType::DateTime, false);
        assert_eq!(
            raw_from_cell(&Data::DateTime(date)),
            RawValue::Text("2023-03-15 06:00:00".to_string())
        );
        let span = ExcelDateTime::new(1.5, ExcelDateTimeType::TimeDelta, false);
        assert_eq!(excel_timestamp(&span), None);
        assert_eq!(raw_from_cell(&Data::DateTime(span)), RawValue::Float(1.5));
    }

    #[test]
    fn json_rows_must_be_objects() {
        let table = read_json_rows(json!([{"Essay_id": 1}, {"Essay": "x"}])).expect("rows");
        assert_eq!(table.len(), 2);
        let err = read_json_rows(json!([{"Essay_id": 1}, 3])).expect_err("not object");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(err.row(), Some(1));
        let err = read_json_rows(json!({"Essay_id": 1})).expect_err("not array");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            InputFormat::from_path(Path::new("data/Beige.XLSX")).expect("format"),
            InputFormat::Workbook
        );
        assert_eq!(
            InputFormat::from_path(Path::new("rows.jsonl")).expect("format"),
            InputFormat::JsonLines
        );
        let err = InputFormat::from_path(Path::new("notes.txt")).expect_err("format");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn load_table_reads_jsonl_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("rows.jsonl");
        std::fs::write(&path, "{\"Essay_id\": 1}\n\n{\"Essay_id\": 2, \"Essay\": \"b\"}\n")
            .expect("write");
        let table = load_table(&path, None).expect("table");
        assert_eq!(table.len(), 2);
        assert_eq!(table.value(1, "Essay"), &RawValue::Text("b".to_string()));
        let err = load_table(&path, Some("Sheet1")).expect_err("sheet on jsonl");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn load_table_reports_missing_files() {
        let err = load_table(Path::new("/nonexistent/input.csv"), None).expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
