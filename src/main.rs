//! Purpose: `essayset` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, emits JSON or tables on stdout.
//! Invariants: Stdout carries JSON when `--json` is set or stdout is not a terminal.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod serve;

use essayset::api::{
    ColumnStats, DescribeReport, Error, ErrorKind, NumericSummary, PageView, PublishReport,
    StepStatus, TableProfile, TextSummary, to_exit_code,
};
use essayset::notice::{Notice, notice_json};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                let message = clap_error_summary(&err);
                let hint = clap_error_hint(&err);
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(message)
                        .with_hint(hint),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    if !matches!(cli.command, Command::Serve { .. }) {
        init_logging("warn");
    }

    let result = command_dispatch::dispatch_command(cli.command, color_mode);

    result
        .map_err(add_schema_hint)
        .map_err(add_io_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let replacement = arg.to_str().and_then(|value| match value {
                "---help" => Some("--help"),
                "---version" => Some("--version"),
                _ => None,
            });
            replacement.map(OsString::from).unwrap_or_else(|| arg)
        })
        .collect()
}

/// Stderr logging for one-shot commands; `RUST_LOG` overrides `default`.
fn init_logging(default: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "essayset",
    version,
    about = "Typed essay-scoring datasets from spreadsheets",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"Spreadsheet rows become typed records: scores are integers, text is never null.

Mental model:
  - `convert` turns a workbook/CSV into a dataset directory
  - `search`, `stats`, `analyze` read that directory
  - `serve` browses it in a web page; `upload` publishes it
"#,
    after_help = r#"EXAMPLES
  $ essayset convert essays.xlsx -o essay_dataset
  $ essayset search essay_dataset "cohesion" --page-size 10
  $ essayset stats essay_dataset Essay_score
  $ essayset serve essay_dataset
  $ essayset upload essay_dataset alice/essay-feedback --token-file ~/.hf_token

LEARN MORE
  $ essayset <command> --help"#,
    arg_required_else_help = true,
    disable_help_subcommand = false
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Convert a workbook, CSV, or JSON table into a dataset directory",
        after_help = r#"EXAMPLES
  $ essayset convert essays.xlsx
  $ essayset convert essays.xlsx --sheet Sheet2 -o out/essays
  $ essayset convert essays.csv --name ielts_feedback --json

NOTES
  - Integer fields: missing or unparseable values become 0
  - Text fields: missing values become an empty string
  - Columns outside the essay schema are dropped with a warning"#
    )]
    Convert {
        #[arg(help = "Input table (.xlsx/.xls/.ods/.csv/.json/.jsonl)", value_hint = ValueHint::FilePath)]
        input: PathBuf,
        #[arg(
            short,
            long,
            default_value = "essay_dataset",
            help = "Output directory",
            value_hint = ValueHint::DirPath
        )]
        output: PathBuf,
        #[arg(long, help = "Worksheet name (workbooks only; default: first sheet)")]
        sheet: Option<String>,
        #[arg(long, help = "Dataset name recorded in dataset_info.json")]
        name: Option<String>,
        #[arg(long, help = "Emit JSON instead of a human summary")]
        json: bool,
    },
    #[command(about = "Show dataset metadata and columns")]
    Info {
        #[arg(help = "Dataset directory", value_hint = ValueHint::DirPath)]
        dataset: PathBuf,
        #[arg(long, help = "Emit JSON")]
        json: bool,
    },
    #[command(
        about = "Search text fields and print one page of matching rows",
        after_help = r#"EXAMPLES
  $ essayset search essay_dataset
  $ essayset search essay_dataset cohesion --page 2 --page-size 10

NOTES
  - Matching is a case-insensitive substring test over text fields
  - An empty or omitted term matches every row"#
    )]
    Search {
        #[arg(help = "Dataset directory", value_hint = ValueHint::DirPath)]
        dataset: PathBuf,
        #[arg(help = "Search term")]
        term: Option<String>,
        #[arg(long, default_value_t = 1, help = "Page number (1-based)")]
        page: usize,
        #[arg(long, default_value_t = serve::DEFAULT_PAGE_SIZE, help = "Rows per page")]
        page_size: usize,
        #[arg(long, help = "Emit JSON")]
        json: bool,
    },
    #[command(about = "Column statistics (all columns, or one field)")]
    Stats {
        #[arg(help = "Dataset directory", value_hint = ValueHint::DirPath)]
        dataset: PathBuf,
        #[arg(help = "Field name")]
        field: Option<String>,
        #[arg(long, help = "Restrict statistics to rows matching this term")]
        filter: Option<String>,
        #[arg(long, help = "Emit JSON")]
        json: bool,
    },
    #[command(about = "Score distributions and essay length summary")]
    Analyze {
        #[arg(help = "Dataset directory", value_hint = ValueHint::DirPath)]
        dataset: PathBuf,
        #[arg(long, help = "Emit JSON")]
        json: bool,
    },
    #[command(
        about = "Browse a dataset in the web viewer",
        after_help = r#"EXAMPLES
  $ essayset serve essay_dataset
  $ essayset serve essay_dataset --bind 127.0.0.1:9900 --max-page-size 200

NOTES
  - Binds to loopback by default; other addresses need --allow-non-loopback
  - Logging follows RUST_LOG (default: info)"#
    )]
    Serve {
        #[arg(help = "Dataset directory", value_hint = ValueHint::DirPath)]
        dataset: PathBuf,
        #[arg(long, default_value = "127.0.0.1:9800", help = "Bind address")]
        bind: String,
        #[arg(long, help = "Allow binding to a non-loopback address")]
        allow_non_loopback: bool,
        #[arg(long, default_value_t = serve::DEFAULT_PAGE_SIZE, help = "Default rows per page")]
        page_size: usize,
        #[arg(long, default_value_t = serve::DEFAULT_MAX_PAGE_SIZE, help = "Largest page_size a request may ask for")]
        max_page_size: usize,
        #[arg(long = "cors-origin", help = "Allowed CORS origin (repeatable)")]
        cors_origins: Vec<String>,
    },
    #[command(
        about = "Publish a dataset to a Hugging Face compatible registry",
        after_help = r#"EXAMPLES
  $ essayset upload essay_dataset alice/essay-feedback
  $ essayset upload essay_dataset alice/essay-feedback --token-file ~/.hf_token --private

NOTES
  - Token order: --token/--token-file, HF_TOKEN, $HF_HOME/token (~/.cache/huggingface/token)
  - Endpoint: --endpoint, HF_ENDPOINT, https://huggingface.co
  - Steps: login, create-repo, upload, readme (README failures are notices)"#
    )]
    Upload {
        #[arg(help = "Dataset directory", value_hint = ValueHint::DirPath)]
        dataset: PathBuf,
        #[arg(help = "Repository id (namespace/name)")]
        repo: String,
        #[arg(long, help = "Registry token (prefer --token-file)")]
        token: Option<String>,
        #[arg(long, help = "Read the registry token from a file", value_hint = ValueHint::FilePath)]
        token_file: Option<PathBuf>,
        #[arg(long, help = "Registry endpoint URL")]
        endpoint: Option<String>,
        #[arg(long, help = "Create the repository as private")]
        private: bool,
        #[arg(long, help = "Commit message for the data upload")]
        message: Option<String>,
        #[arg(long, help = "Emit JSON")]
        json: bool,
    },
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
    #[command(about = "Print version")]
    Version,
}

fn add_schema_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::SchemaViolation || err.hint().is_some() {
        return err;
    }
    err.with_hint("Fix the cell in the input table, or clear it so it is filled with 0.")
}

fn add_io_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Permission => {
            err.with_hint("Permission denied. Check file permissions or registry credentials.")
        }
        ErrorKind::Io => err.with_hint("I/O error. Check the path, filesystem, and network."),
        _ => err,
    }
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_LOG=debug and share command/context if it persists.",
    )
}

fn read_token_file(path: &Path) -> Result<String, Error> {
    let raw = std::fs::read_to_string(path).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("failed to read token file")
            .with_path(path)
            .with_source(err)
    })?;
    let token = raw.trim().to_string();
    if token.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("token file is empty")
            .with_path(path));
    }
    Ok(token)
}

fn resolve_token_value(
    token: Option<String>,
    token_file: Option<PathBuf>,
) -> Result<Option<String>, Error> {
    if token.is_some() && token_file.is_some() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--token cannot be combined with --token-file")
            .with_hint("Use --token-file for safer handling, or pass --token for local/dev use."));
    }
    if let Some(path) = token_file {
        return read_token_file(&path).map(Some);
    }
    Ok(token)
}

fn wants_json(json: bool) -> bool {
    json || !io::stdout().is_terminal()
}

fn emit_version_output(color_mode: ColorMode) {
    if io::stdout().is_terminal() {
        println!("essayset {}", env!("CARGO_PKG_VERSION"));
    } else {
        emit_json(
            json!({
                "name": "essayset",
                "version": env!("CARGO_PKG_VERSION"),
            }),
            color_mode,
        );
    }
}

fn emit_table(headers: &[&str], rows: &[Vec<String>]) {
    println!("{}", render_table(headers, rows));
}

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    if headers.is_empty() {
        return String::new();
    }
    let column_count = headers.len();
    let mut sanitized_rows = Vec::with_capacity(rows.len());
    let mut widths = headers
        .iter()
        .map(|header| header.chars().count())
        .collect::<Vec<_>>();

    for row in rows {
        let mut sanitized = Vec::with_capacity(column_count);
        for (idx, width) in widths.iter_mut().enumerate() {
            let value = row.get(idx).map(String::as_str).unwrap_or("");
            let cleaned = sanitize_table_cell(value);
            *width = (*width).max(cleaned.chars().count());
            sanitized.push(cleaned);
        }
        sanitized_rows.push(sanitized);
    }

    let mut lines = Vec::with_capacity(sanitized_rows.len() + 1);
    lines.push(format_table_line(
        &headers
            .iter()
            .map(|header| header.to_string())
            .collect::<Vec<_>>(),
        &widths,
    ));
    for row in sanitized_rows {
        lines.push(format_table_line(&row, &widths));
    }
    lines.join("\n")
}

fn sanitize_table_cell(value: &str) -> String {
    value.replace('\n', "\\n").replace('\r', "\\r")
}

fn format_table_line(cells: &[String], widths: &[usize]) -> String {
    let mut line = String::new();
    for (idx, width) in widths.iter().enumerate() {
        if idx > 0 {
            line.push_str("  ");
        }
        let cell = cells.get(idx).map(String::as_str).unwrap_or("");
        line.push_str(cell);
        let cell_len = cell.chars().count();
        if *width > cell_len {
            line.push_str(&" ".repeat(*width - cell_len));
        }
    }
    line.trim_end().to_string()
}

/// First `max` characters of `text`, with an ellipsis when cut.
fn truncate_chars(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

fn format_float(value: Option<f64>) -> String {
    match value {
        Some(value) if value.fract() == 0.0 => format!("{value:.1}"),
        Some(value) => format!("{value:.3}"),
        None => "-".to_string(),
    }
}

fn format_opt<T: ToString>(value: Option<T>) -> String {
    value.map(|value| value.to_string()).unwrap_or_else(|| "-".to_string())
}

fn numeric_row(summary: &NumericSummary) -> Vec<String> {
    vec![
        summary.field.clone(),
        summary.count.to_string(),
        format_float(summary.mean),
        format_float(summary.std),
        format_opt(summary.min),
        format_float(summary.p25),
        format_float(summary.p50),
        format_float(summary.p75),
        format_opt(summary.max),
    ]
}

const NUMERIC_HEADERS: [&str; 9] = ["FIELD", "COUNT", "MEAN", "STD", "MIN", "25%", "50%", "75%", "MAX"];
const TEXT_HEADERS: [&str; 6] = ["FIELD", "COUNT", "MIN LEN", "MEAN LEN", "MAX LEN", "DISTINCT"];

fn text_row(summary: &TextSummary) -> Vec<String> {
    vec![
        summary.field.clone(),
        summary.count.to_string(),
        format_opt(summary.min_length),
        format_float(summary.mean_length),
        format_opt(summary.max_length),
        summary.distinct_count.to_string(),
    ]
}

fn emit_describe_human(report: &DescribeReport) {
    println!("{} rows", report.rows);
    println!();
    emit_table(
        &NUMERIC_HEADERS,
        &report.numeric.iter().map(numeric_row).collect::<Vec<_>>(),
    );
    println!();
    emit_table(
        &TEXT_HEADERS,
        &report.text.iter().map(text_row).collect::<Vec<_>>(),
    );
}

fn emit_column_stats_human(stats: &ColumnStats) {
    match stats {
        ColumnStats::Numeric(summary) => emit_table(&NUMERIC_HEADERS, &[numeric_row(summary)]),
        ColumnStats::Text(summary) => emit_table(&TEXT_HEADERS, &[text_row(summary)]),
    }
}

fn emit_profile_human(profile: &TableProfile, output: &Path, rows: usize) {
    println!(
        "Read {} rows x {} columns ({} missing cells)",
        profile.total_rows,
        profile.total_columns,
        profile.total_missing()
    );
    let table_rows = profile
        .columns
        .iter()
        .map(|column| {
            vec![
                column.name.clone(),
                column.missing.to_string(),
                column.kinds.join(","),
            ]
        })
        .collect::<Vec<_>>();
    emit_table(&["COLUMN", "MISSING", "KINDS"], &table_rows);
    println!();
    println!("Wrote {rows} records to {}", output.display());
}

fn emit_page_human(view: &PageView) {
    if view.total_count == 0 {
        println!("No matching rows.");
        return;
    }
    let store = view.rows.store();
    let schema = store.schema();
    let id = schema.position("Essay_id");
    let score = schema.position("Essay_score");
    let overall = schema.position("Overall_score");
    let essay = schema.position("Essay");
    let rows = view
        .rows
        .positions()
        .iter()
        .filter_map(|position| store.get(*position))
        .map(|record| {
            let int_at = |position: Option<usize>| {
                format_opt(position.and_then(|position| record.integer_at(position)))
            };
            vec![
                int_at(id),
                int_at(overall),
                int_at(score),
                truncate_chars(
                    essay
                        .and_then(|position| record.text_at(position))
                        .unwrap_or(""),
                    72,
                ),
            ]
        })
        .collect::<Vec<_>>();
    emit_table(&["ID", "OVERALL", "SCORE", "ESSAY"], &rows);
    println!();
    println!(
        "rows {}-{} of {} (page {}/{})",
        view.start + 1,
        view.end,
        view.total_count,
        view.page,
        view.total_pages
    );
}

fn emit_publish_human(report: &PublishReport) {
    let rows = report
        .steps
        .iter()
        .map(|step| {
            let status = match step.status {
                StepStatus::Ok => "ok",
                StepStatus::Failed => "failed",
                StepStatus::Skipped => "skipped",
            };
            vec![
                step.name.to_string(),
                status.to_string(),
                step.detail.clone().unwrap_or_default(),
            ]
        })
        .collect::<Vec<_>>();
    emit_table(&["STEP", "STATUS", "DETAIL"], &rows);
    println!();
    println!(
        "Published {} rows ({} files) as {} to {}",
        report.rows,
        report.files.len(),
        report.user,
        report.url
    );
}

fn emit_json(value: serde_json::Value, color_mode: ColorMode) {
    let is_tty = io::stdout().is_terminal();
    let pretty = is_tty || matches!(color_mode, ColorMode::Always);
    let json = if pretty {
        serde_json::to_string_pretty(&value)
            .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string())
    } else {
        serde_json::to_string(&value)
            .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string())
    };
    println!("{json}");
}

fn to_json_value<T: serde::Serialize>(value: &T) -> Result<Value, Error> {
    serde_json::to_value(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode output json")
            .with_source(err)
    })
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn emit_notice(notice: &Notice, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        let label = colorize_label("notice:", color_mode.use_color(is_tty), AnsiColor::Yellow);
        eprintln!("{label} {} (dataset: {})", notice.message, notice.dataset);
        return;
    }

    let value = notice_json(notice);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"notice\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::AlreadyExists => "already exists".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::SchemaViolation => "value violates the schema".to_string(),
        ErrorKind::FieldType => "field has the wrong type".to_string(),
        ErrorKind::OutOfRange => "out of range".to_string(),
        ErrorKind::Registry => "registry error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(field) = err.field() {
        inner.insert("field".to_string(), json!(field));
    }
    if let Some(row) = err.row() {
        inner.insert("row".to_string(), json!(row));
    }
    if let Some(step) = err.step() {
        inner.insert("step".to_string(), json!(step));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }
    if let Some(field) = err.field() {
        lines.push(format!(
            "{} {field}",
            colorize_label("field:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(row) = err.row() {
        lines.push(format!(
            "{} {row}",
            colorize_label("row:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(step) = err.step() {
        lines.push(format!(
            "{} {step}",
            colorize_label("step:", use_color, AnsiColor::Yellow)
        ));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);

    let Some(usage) = usage else {
        return "Try `essayset --help`.".to_string();
    };

    let tokens: Vec<&str> = usage.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| *t == "essayset") else {
        return "Try `essayset --help`.".to_string();
    };

    let mut parts = Vec::new();
    for token in tokens.iter().skip(pos + 1) {
        if token.starts_with('-') || token.starts_with('<') || token.starts_with('[') {
            break;
        }
        parts.push(*token);
    }

    if parts.is_empty() {
        return "Try `essayset --help`.".to_string();
    }

    format!("Try `essayset {} --help`.", parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::{
        Cli, Command, add_schema_hint, error_json, error_text, format_float, render_table,
        resolve_token_value, truncate_chars,
    };
    use clap::Parser;
    use essayset::api::{Error, ErrorKind};

    #[test]
    fn table_columns_align_and_escape_newlines() {
        let table = render_table(
            &["A", "LONGER"],
            &[
                vec!["x".to_string(), "1".to_string()],
                vec!["line\nbreak".to_string(), "22".to_string()],
            ],
        );
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "A            LONGER");
        assert_eq!(lines[1], "x            1");
        assert_eq!(lines[2], "line\\nbreak  22");
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_chars("短文本", 5), "短文本");
        assert_eq!(truncate_chars("abcdef", 3), "abc…");
    }

    #[test]
    fn floats_render_like_dataframes() {
        assert_eq!(format_float(Some(7.0)), "7.0");
        assert_eq!(format_float(Some(6.5)), "6.500");
        assert_eq!(format_float(None), "-");
    }

    #[test]
    fn error_json_carries_context() {
        let err = Error::new(ErrorKind::SchemaViolation)
            .with_message("value out of range")
            .with_field("Essay_score")
            .with_row(3);
        let value = error_json(&add_schema_hint(err));
        assert_eq!(value["error"]["kind"], "SchemaViolation");
        assert_eq!(value["error"]["field"], "Essay_score");
        assert_eq!(value["error"]["row"], 3);
        assert!(value["error"]["hint"].is_string());
    }

    #[test]
    fn error_text_lists_step() {
        let err = Error::new(ErrorKind::Registry)
            .with_message("upload failed")
            .with_step("upload");
        let text = error_text(&err, false);
        assert!(text.starts_with("error: upload failed"));
        assert!(text.contains("step: upload"));
    }

    #[test]
    fn token_and_token_file_conflict() {
        let err = resolve_token_value(Some("t".to_string()), Some("f".into())).expect_err("conflict");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(resolve_token_value(None, None).expect("none"), None);
    }

    #[test]
    fn search_defaults_to_first_page() {
        let cli = Cli::try_parse_from(["essayset", "search", "data"]).expect("parse");
        match cli.command {
            Command::Search {
                page, page_size, term, ..
            } => {
                assert_eq!(page, 1);
                assert_eq!(page_size, 25);
                assert_eq!(term, None);
            }
            _ => panic!("expected search"),
        }
    }
}
