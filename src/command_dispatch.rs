//! Purpose: Hold top-level CLI command dispatch for `essayset`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Every command emits exactly one JSON value on stdout in non-human mode.
//! Invariants: Rendering helpers live in `main.rs`; pipeline logic lives in `essayset::api`.

use super::*;

use std::net::SocketAddr;

use essayset::api::{
    DatasetInfo, DatasetSummary, FieldType, HubClient, HubConfig, PublishRequest, RecordStore,
    RepoId, aggregate_numeric, aggregate_text, column_stats, describe, essay_schema, filter,
    load_dataset, load_table, normalize, page_view, publish, save_dataset, value_counts,
};

const PROFILE_SAMPLE_ROWS: usize = 5;
const ID_FIELD: &str = "Essay_id";
const ESSAY_FIELD: &str = "Essay";

pub(super) fn dispatch_command(command: Command, color_mode: ColorMode) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "essayset", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_version_output(color_mode);
            Ok(RunOutcome::ok())
        }
        Command::Convert {
            input,
            output,
            sheet,
            name,
            json,
        } => {
            let table = load_table(&input, sheet.as_deref())?;
            let profile = table.profile(PROFILE_SAMPLE_ROWS);
            let schema = essay_schema();
            let dropped = table
                .columns()
                .iter()
                .filter(|column| schema.position(column).is_none())
                .cloned()
                .collect::<Vec<_>>();
            let store = normalize(&table, schema)?;
            let mut info = DatasetInfo::for_store(&store);
            if let Some(name) = name {
                info = info.with_name(name);
            }
            let layout = save_dataset(&store, &info, &output)?;
            tracing::info!(rows = store.len(), output = %layout.root().display(), "converted");

            if wants_json(json) {
                emit_json(
                    json!({
                        "convert": {
                            "input": input.display().to_string(),
                            "output": layout.root().display().to_string(),
                            "dataset_name": info.dataset_name,
                            "rows": store.len(),
                            "dropped_columns": dropped,
                            "profile": to_json_value(&profile)?,
                        }
                    }),
                    color_mode,
                );
            } else {
                emit_profile_human(&profile, layout.root(), store.len());
                if !dropped.is_empty() {
                    println!("Dropped columns: {}", dropped.join(", "));
                }
            }
            Ok(RunOutcome::ok())
        }
        Command::Info { dataset, json } => {
            let loaded = load_dataset(&dataset)?;
            let summary = DatasetSummary::of(&loaded);
            if wants_json(json) {
                emit_json(json!({ "info": to_json_value(&summary)? }), color_mode);
            } else {
                println!("{} ({} rows)", summary.name, summary.rows);
                if let Some(version) = &summary.version {
                    println!("version: {version}");
                }
                println!("root: {}", summary.root.display());
                println!();
                let rows = summary
                    .columns
                    .iter()
                    .map(|column| {
                        vec![
                            column.name.clone(),
                            column.dtype.to_string(),
                            column.description.clone(),
                        ]
                    })
                    .collect::<Vec<_>>();
                emit_table(&["COLUMN", "DTYPE", "DESCRIPTION"], &rows);
            }
            Ok(RunOutcome::ok())
        }
        Command::Search {
            dataset,
            term,
            page,
            page_size,
            json,
        } => {
            let loaded = load_dataset(&dataset)?;
            let term = term.unwrap_or_default();
            let result = filter(&loaded.store, &term);
            let view = page_view(&result, &term, page, page_size)?;
            if wants_json(json) {
                emit_json(json!({ "page": to_json_value(&view)? }), color_mode);
            } else {
                emit_page_human(&view);
            }
            Ok(RunOutcome::ok())
        }
        Command::Stats {
            dataset,
            field,
            filter: term,
            json,
        } => {
            let loaded = load_dataset(&dataset)?;
            let view = filter(&loaded.store, term.as_deref().unwrap_or(""));
            match field {
                Some(field) => {
                    let stats = column_stats(&view, &field)?;
                    if wants_json(json) {
                        emit_json(json!({ "stats": to_json_value(&stats)? }), color_mode);
                    } else {
                        emit_column_stats_human(&stats);
                    }
                }
                None => {
                    let report = describe(&view)?;
                    if wants_json(json) {
                        emit_json(json!({ "describe": to_json_value(&report)? }), color_mode);
                    } else {
                        emit_describe_human(&report);
                    }
                }
            }
            Ok(RunOutcome::ok())
        }
        Command::Analyze { dataset, json } => {
            let loaded = load_dataset(&dataset)?;
            if wants_json(json) {
                emit_json(json!({ "analyze": analyze(&loaded.store)? }), color_mode);
            } else {
                emit_analysis_human(&loaded.store)?;
            }
            Ok(RunOutcome::ok())
        }
        Command::Serve {
            dataset,
            bind,
            allow_non_loopback,
            page_size,
            max_page_size,
            cors_origins,
        } => {
            let bind: SocketAddr = bind.parse().map_err(|_| {
                Error::new(ErrorKind::Usage)
                    .with_message("invalid bind address")
                    .with_hint("Use a host:port value like 127.0.0.1:9800.")
            })?;
            let config = serve::ServeConfig {
                bind,
                dataset,
                allow_non_loopback,
                default_page_size: page_size,
                max_page_size,
                cors_allowed_origins: cors_origins,
            };
            if io::stderr().is_terminal() {
                eprintln!("essayset viewer on http://{bind}/ (Ctrl-C to stop)");
            }
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve::serve(config))?;
            Ok(RunOutcome::ok())
        }
        Command::Upload {
            dataset,
            repo,
            token,
            token_file,
            endpoint,
            private,
            message,
            json,
        } => {
            let repo_id: RepoId = repo.parse()?;
            let token = resolve_token_value(token, token_file)?;
            let config = HubConfig::resolve(endpoint, token, |key| std::env::var(key).ok())?;
            if config.token.is_none() {
                return Err(Error::new(ErrorKind::Permission)
                    .with_message("no registry token available")
                    .with_hint(
                        "Pass --token-file, set HF_TOKEN, or log in so a cached token exists.",
                    ));
            }
            let client = HubClient::from_config(&config)?;
            let request = PublishRequest {
                dataset: dataset.clone(),
                repo_id,
                private,
                summary: message,
            };
            let report = publish(&client, &request)?;

            let dataset_label = dataset.display().to_string();
            for message in &report.notices {
                let notice = Notice::now("publish", "upload", dataset_label.as_str(), message.as_str())
                    .with_detail("repo_id", report.repo_id.as_str());
                emit_notice(&notice, color_mode);
            }

            if wants_json(json) {
                emit_json(json!({ "publish": to_json_value(&report)? }), color_mode);
            } else {
                emit_publish_human(&report);
            }
            Ok(RunOutcome::ok())
        }
    }
}

/// Integer fields other than the id, in schema order.
fn score_fields(store: &RecordStore) -> Vec<String> {
    store
        .schema()
        .fields()
        .iter()
        .filter(|field| field.field_type == FieldType::Integer && field.name != ID_FIELD)
        .map(|field| field.name.clone())
        .collect()
}

fn analyze(store: &RecordStore) -> Result<Value, Error> {
    let mut scores = Vec::new();
    for field in score_fields(store) {
        let summary = aggregate_numeric(store, &field)?;
        let counts = value_counts(store, &field)?
            .into_iter()
            .map(|(value, count)| json!({ "value": value, "count": count }))
            .collect::<Vec<_>>();
        scores.push(json!({
            "field": field,
            "summary": to_json_value(&summary)?,
            "counts": counts,
        }));
    }
    let essay = match store.schema().field(ESSAY_FIELD) {
        Some(spec) if spec.field_type == FieldType::Text => {
            to_json_value(&aggregate_text(store, ESSAY_FIELD)?)?
        }
        _ => Value::Null,
    };
    Ok(json!({
        "rows": store.len(),
        "scores": scores,
        "essay_length": essay,
    }))
}

fn emit_analysis_human(store: &RecordStore) -> Result<(), Error> {
    println!("{} rows", store.len());
    println!();
    let mut summaries = Vec::new();
    for field in score_fields(store) {
        summaries.push(numeric_row(&aggregate_numeric(store, &field)?));
    }
    emit_table(&NUMERIC_HEADERS, &summaries);

    for field in ["Overall_score", "Essay_score"] {
        if store.schema().field(field).is_none() {
            continue;
        }
        let counts = value_counts(store, field)?;
        let peak = counts.iter().map(|(_, count)| *count).max().unwrap_or(0);
        println!();
        println!("{field} distribution");
        let rows = counts
            .iter()
            .map(|(value, count)| {
                vec![value.to_string(), count.to_string(), histogram_bar(*count, peak)]
            })
            .collect::<Vec<_>>();
        emit_table(&["VALUE", "COUNT", ""], &rows);
    }

    if let Some(spec) = store.schema().field(ESSAY_FIELD) {
        if spec.field_type == FieldType::Text {
            println!();
            emit_table(&TEXT_HEADERS, &[text_row(&aggregate_text(store, ESSAY_FIELD)?)]);
        }
    }
    Ok(())
}

fn histogram_bar(count: usize, peak: usize) -> String {
    const WIDTH: usize = 40;
    if peak == 0 {
        return String::new();
    }
    let len = (count * WIDTH).div_ceil(peak);
    "#".repeat(len)
}
