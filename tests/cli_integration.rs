//! Purpose: End-to-end tests for the `essayset` binary.
//! Exports: None (integration test module).
//! Role: Validate convert/info/search/stats/analyze output envelopes and exit codes.
//! Invariants: Stdout is not a terminal here, so every command emits JSON.
//! Invariants: Each test works inside its own temp directory.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;

const ESSAYS_CSV: &str = "\
Essay_id,Essay_Prompt,Essay,Essay_score,Overall_score,Score_TR,Notes
1,Cities,Public transport improves cohesion in cities.,6,7,6,x
2,Cities,Remote work changes how cities grow.,,6.5,5,y
3,Health,Exercise habits start in school.,8,8,NaN,z
";

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_essayset");
    let mut command = Command::new(exe);
    command.env_remove("RUST_LOG");
    command
}

fn parse_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("valid json")
}

fn parse_stderr_error(output: &Output) -> Value {
    let text = String::from_utf8_lossy(&output.stderr);
    let line = text
        .lines()
        .find(|line| line.starts_with("{\"error\""))
        .expect("error json line");
    serde_json::from_str(line).expect("valid json")
}

fn write_csv(dir: &Path) -> PathBuf {
    let path = dir.join("essays.csv");
    std::fs::write(&path, ESSAYS_CSV).expect("write csv");
    path
}

fn convert(dir: &Path) -> PathBuf {
    let input = write_csv(dir);
    let output = dir.join("essay_dataset");
    let run = cmd()
        .args(["convert", input.to_str().unwrap(), "-o", output.to_str().unwrap()])
        .output()
        .expect("convert");
    assert!(
        run.status.success(),
        "convert failed: {}",
        String::from_utf8_lossy(&run.stderr)
    );
    output
}

#[test]
fn convert_writes_dataset_layout() {
    let temp = tempfile::tempdir().expect("tempdir");
    let input = write_csv(temp.path());
    let output = temp.path().join("out");

    let run = cmd()
        .args([
            "convert",
            input.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--name",
            "ielts_feedback",
        ])
        .output()
        .expect("convert");
    assert!(run.status.success());
    let value = parse_json(&run.stdout);
    let convert = &value["convert"];
    assert_eq!(convert["rows"], 3);
    assert_eq!(convert["dataset_name"], "ielts_feedback");
    assert_eq!(convert["dropped_columns"][0], "Notes");
    assert_eq!(convert["profile"]["total_rows"], 3);

    assert!(output.join("dataset/dataset_dict.json").is_file());
    assert!(output.join("dataset/train/data.jsonl").is_file());
    assert!(output.join("dataset_info.json").is_file());
    assert!(output.join("README.md").is_file());

    let data = std::fs::read_to_string(output.join("dataset/train/data.jsonl")).expect("data");
    let rows: Vec<Value> = data
        .lines()
        .map(|line| serde_json::from_str(line).expect("row"))
        .collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1]["Essay_score"], 0);
    assert_eq!(rows[1]["Overall_score"], 6);
    assert_eq!(rows[2]["Score_TR"], 0);
    assert_eq!(rows[0]["Feedback_TR"], "");
    assert!(rows[0].get("Notes").is_none());

    let info: Value = serde_json::from_str(
        &std::fs::read_to_string(output.join("dataset_info.json")).expect("info"),
    )
    .expect("info json");
    assert_eq!(info["dataset_name"], "ielts_feedback");
    assert_eq!(info["splits"]["train"]["num_examples"], 3);
}

#[test]
fn info_lists_schema_columns() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dataset = convert(temp.path());
    let run = cmd()
        .args(["info", dataset.to_str().unwrap()])
        .output()
        .expect("info");
    assert!(run.status.success());
    let value = parse_json(&run.stdout);
    assert_eq!(value["info"]["rows"], 3);
    let columns = value["info"]["columns"].as_array().expect("columns");
    assert_eq!(columns.len(), 14);
    assert_eq!(columns[0]["name"], "Essay_id");
    assert_eq!(columns[2]["dtype"], "string");
}

#[test]
fn search_pages_through_matches() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dataset = convert(temp.path());

    let run = cmd()
        .args([
            "search",
            dataset.to_str().unwrap(),
            "CITIES",
            "--page-size",
            "1",
            "--page",
            "2",
        ])
        .output()
        .expect("search");
    assert!(run.status.success());
    let value = parse_json(&run.stdout);
    let page = &value["page"];
    assert_eq!(page["total_count"], 2);
    assert_eq!(page["total_pages"], 2);
    assert_eq!(page["has_previous"], true);
    assert_eq!(page["has_next"], false);
    assert_eq!(page["rows"][0]["Essay_id"], 2);
}

#[test]
fn search_past_last_page_is_out_of_range() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dataset = convert(temp.path());
    let run = cmd()
        .args(["search", dataset.to_str().unwrap(), "--page", "9"])
        .output()
        .expect("search");
    assert_eq!(run.status.code(), Some(9));
    let err = parse_stderr_error(&run);
    assert_eq!(err["error"]["kind"], "OutOfRange");
}

#[test]
fn stats_reports_numeric_and_text_fields() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dataset = convert(temp.path());

    let run = cmd()
        .args(["stats", dataset.to_str().unwrap(), "Overall_score"])
        .output()
        .expect("stats");
    assert!(run.status.success());
    let value = parse_json(&run.stdout);
    assert_eq!(value["stats"]["dtype"], "int64");
    assert_eq!(value["stats"]["count"], 3);
    assert_eq!(value["stats"]["min"], 6);
    assert_eq!(value["stats"]["max"], 8);

    let run = cmd()
        .args(["stats", dataset.to_str().unwrap(), "--filter", "health"])
        .output()
        .expect("describe");
    assert!(run.status.success());
    let value = parse_json(&run.stdout);
    assert_eq!(value["describe"]["rows"], 1);

    let run = cmd()
        .args(["stats", dataset.to_str().unwrap(), "Missing_field"])
        .output()
        .expect("stats");
    assert_eq!(run.status.code(), Some(3));
    assert_eq!(parse_stderr_error(&run)["error"]["kind"], "NotFound");
}

#[test]
fn analyze_reports_distributions() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dataset = convert(temp.path());
    let run = cmd()
        .args(["analyze", dataset.to_str().unwrap()])
        .output()
        .expect("analyze");
    assert!(run.status.success());
    let value = parse_json(&run.stdout);
    assert_eq!(value["analyze"]["rows"], 3);
    let scores = value["analyze"]["scores"].as_array().expect("scores");
    let essay = scores
        .iter()
        .find(|entry| entry["field"] == "Essay_score")
        .expect("essay score");
    assert_eq!(essay["counts"][0]["value"], 0);
    assert!(value["analyze"]["essay_length"]["max_length"].as_u64().unwrap() > 0);
}

#[test]
fn unrepresentable_cell_is_schema_violation() {
    let temp = tempfile::tempdir().expect("tempdir");
    let input = temp.path().join("bad.csv");
    std::fs::write(&input, "Essay_id,Essay_score\n1,1e400\n").expect("write");
    let run = cmd()
        .args([
            "convert",
            input.to_str().unwrap(),
            "-o",
            temp.path().join("out").to_str().unwrap(),
        ])
        .output()
        .expect("convert");
    assert_eq!(run.status.code(), Some(7));
    let err = parse_stderr_error(&run);
    assert_eq!(err["error"]["kind"], "SchemaViolation");
    assert_eq!(err["error"]["field"], "Essay_score");
    assert_eq!(err["error"]["row"], 0);
    assert!(!temp.path().join("out").exists());
}

#[test]
fn convert_keeps_csv_text_verbatim() {
    let temp = tempfile::tempdir().expect("tempdir");
    let input = temp.path().join("codes.csv");
    std::fs::write(
        &input,
        "Essay_id,Essay_Prompt,Feedback_TR,Essay,Essay_score\n007,007,true,1e3,TRUE\n",
    )
    .expect("write");
    let output = temp.path().join("out");
    let run = cmd()
        .args(["convert", input.to_str().unwrap(), "-o", output.to_str().unwrap()])
        .output()
        .expect("convert");
    assert!(run.status.success(), "stderr: {}", String::from_utf8_lossy(&run.stderr));

    let data = std::fs::read_to_string(output.join("dataset/train/data.jsonl")).expect("data");
    let row: Value = serde_json::from_str(data.lines().next().expect("row")).expect("json");
    assert_eq!(row["Essay_id"], 7);
    assert_eq!(row["Essay_Prompt"], "007");
    assert_eq!(row["Feedback_TR"], "true");
    assert_eq!(row["Essay"], "1e3");
    assert_eq!(row["Essay_score"], 1);
}

#[test]
fn bare_dataset_dir_is_accepted_from_output_root() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dataset = convert(temp.path());

    let run = cmd()
        .args(["info", "dataset"])
        .current_dir(&dataset)
        .output()
        .expect("info");
    assert!(run.status.success(), "stderr: {}", String::from_utf8_lossy(&run.stderr));
    let value = parse_json(&run.stdout);
    assert_eq!(value["info"]["rows"], 3);
    assert_eq!(value["info"]["name"], "essay_feedback_dataset");

    let run = cmd()
        .args(["stats", "dataset", "Overall_score"])
        .current_dir(&dataset)
        .output()
        .expect("stats");
    assert!(run.status.success(), "stderr: {}", String::from_utf8_lossy(&run.stderr));
    assert_eq!(parse_json(&run.stdout)["stats"]["count"], 3);
}

#[test]
fn missing_dataset_and_bad_format_report_errors() {
    let temp = tempfile::tempdir().expect("tempdir");
    let run = cmd()
        .args(["info", temp.path().join("nope").to_str().unwrap()])
        .output()
        .expect("info");
    assert_eq!(run.status.code(), Some(3));

    let input = temp.path().join("essays.txt");
    std::fs::write(&input, "hello").expect("write");
    let run = cmd()
        .args(["convert", input.to_str().unwrap()])
        .current_dir(temp.path())
        .output()
        .expect("convert");
    assert_eq!(run.status.code(), Some(2));
    let err = parse_stderr_error(&run);
    assert_eq!(err["error"]["kind"], "Usage");
    assert!(err["error"]["hint"].as_str().unwrap().contains(".csv"));
}

#[test]
fn usage_errors_carry_command_hint() {
    let run = cmd().args(["search"]).output().expect("search");
    assert_eq!(run.status.code(), Some(2));
    let err = parse_stderr_error(&run);
    assert_eq!(err["error"]["kind"], "Usage");
    assert_eq!(err["error"]["hint"], "Try `essayset search --help`.");
}

#[test]
fn upload_without_token_is_permission_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dataset = convert(temp.path());
    let run = cmd()
        .args([
            "upload",
            dataset.to_str().unwrap(),
            "alice/essays",
            "--endpoint",
            "http://127.0.0.1:9",
        ])
        .env_remove("HF_TOKEN")
        .env("HF_HOME", temp.path().join("hf"))
        .output()
        .expect("upload");
    assert_eq!(run.status.code(), Some(5));
    assert_eq!(parse_stderr_error(&run)["error"]["kind"], "Permission");
}

#[test]
fn version_emits_json() {
    let run = cmd().arg("version").output().expect("version");
    assert!(run.status.success());
    let value = parse_json(&run.stdout);
    assert_eq!(value["name"], "essayset");
    assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
}
