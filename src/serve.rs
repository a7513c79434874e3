//! Purpose: HTTP/JSON viewer server for one converted dataset.
//! Exports: `ServeConfig`, `serve`, `DEFAULT_PAGE_SIZE`, `DEFAULT_MAX_PAGE_SIZE`.
//! Role: Axum server behind `essayset serve`; the embedded page calls the `/v0` routes.
//! Invariants: Errors use `{"error": {kind, message, ...}}`; kinds map to stable statuses.
//! Invariants: Loopback-only unless explicitly allowed.
//! Invariants: Handlers read a dataset snapshot; `POST /v0/reload` swaps it without blocking readers.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use essayset::api::{DatasetSession, DatasetSummary, Error, ErrorKind, describe};

pub const DEFAULT_PAGE_SIZE: usize = 25;
pub const DEFAULT_MAX_PAGE_SIZE: usize = 100;

const INDEX_HTML: &str = include_str!("../ui/index.html");

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub dataset: PathBuf,
    pub allow_non_loopback: bool,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub cors_allowed_origins: Vec<String>,
}

struct AppState {
    session: DatasetSession,
    default_page_size: usize,
    max_page_size: usize,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    init_tracing();

    let cors = cors_layer(&config.cors_allowed_origins)?;
    let session = DatasetSession::open(&config.dataset)?;
    tracing::info!(
        dataset = %session.root().display(),
        bind = %config.bind,
        "starting viewer"
    );
    let state = Arc::new(AppState {
        session,
        default_page_size: config.default_page_size,
        max_page_size: config.max_page_size,
    });

    let mut app = router(state).layer(TraceLayer::new_for_http());
    if let Some(cors) = cors {
        app = app.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/v0/info", get(info))
        .route("/v0/rows", get(rows))
        .route("/v0/search", get(search))
        .route("/v0/stats", get(stats))
        .route("/v0/stats/:field", get(field_stats))
        .route("/v0/stats/:field/counts", get(field_counts))
        .route("/v0/correlation", get(correlation))
        .route("/v0/reload", post(reload))
        .with_state(state)
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if !is_loopback(config.bind.ip()) && !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }

    if config.max_page_size == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-page-size must be greater than zero")
            .with_hint("Use a positive value like 100."));
    }

    if config.default_page_size == 0 || config.default_page_size > config.max_page_size {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("default page size must be between 1 and --max-page-size")
            .with_hint(format!(
                "Use a --page-size between 1 and {}.",
                config.max_page_size
            )));
    }

    Ok(())
}

fn cors_layer(origins: &[String]) -> Result<Option<CorsLayer>, Error> {
    if origins.is_empty() {
        return Ok(None);
    }
    let mut values = Vec::with_capacity(origins.len());
    for origin in origins {
        let value = HeaderValue::from_str(origin).map_err(|_| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid CORS origin `{origin}`"))
                .with_hint("Use an origin like http://localhost:3000.")
        })?;
        values.push(value);
    }
    Ok(Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(values))
            .allow_methods([Method::GET, Method::POST]),
    ))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

#[derive(Debug, Default, Deserialize)]
struct RowsQuery {
    q: Option<String>,
    page: Option<usize>,
    page_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn healthz() -> Response {
    json_response(&json!({ "ok": true }))
}

async fn info(State(state): State<Arc<AppState>>) -> Response {
    match state.session.summary() {
        Ok(summary) => json_response(&json!({ "dataset": summary })),
        Err(err) => error_response(err),
    }
}

async fn rows(
    State(state): State<Arc<AppState>>,
    query: Result<Query<RowsQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => return error_response(query_error(rejection)),
    };
    let page_size = query.page_size.unwrap_or(state.default_page_size);
    if page_size > state.max_page_size {
        return error_response(
            Error::new(ErrorKind::Usage)
                .with_message(format!(
                    "page_size {page_size} exceeds the maximum of {}",
                    state.max_page_size
                ))
                .with_hint(format!("Use a page_size between 1 and {}.", state.max_page_size)),
        );
    }
    let term = query.q.unwrap_or_default();
    let page = query.page.unwrap_or(1);
    let result = run_blocking(move || state.session.get_page(&term, page, page_size)).await;
    match result {
        Ok(view) => json_response(&view),
        Err(err) => error_response(err),
    }
}

async fn search(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Response {
    let term = match query {
        Ok(Query(query)) => query.q.unwrap_or_default(),
        Err(rejection) => return error_response(query_error(rejection)),
    };
    let lookup = term.clone();
    match run_blocking(move || state.session.search(&lookup)).await {
        Ok(rows) => {
            tracing::debug!(term = %term, matches = rows.len(), "search");
            json_response(&json!({ "query": term, "count": rows.len(), "rows": rows }))
        }
        Err(err) => error_response(err),
    }
}

/// Describe report, over the rows matching `q` when given.
async fn stats(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Response {
    let term = match query {
        Ok(Query(query)) => query.q.unwrap_or_default(),
        Err(rejection) => return error_response(query_error(rejection)),
    };
    let lookup = term.clone();
    let report = run_blocking(move || {
        if lookup.is_empty() {
            state.session.describe()
        } else {
            state
                .session
                .query(&lookup)
                .and_then(|result| describe(&result))
        }
    })
    .await;
    match report {
        Ok(report) => json_response(&json!({ "query": term, "stats": report })),
        Err(err) => error_response(err),
    }
}

async fn field_stats(
    State(state): State<Arc<AppState>>,
    AxumPath(field): AxumPath<String>,
) -> Response {
    let lookup = field.clone();
    match run_blocking(move || state.session.get_column_stats(&lookup)).await {
        Ok(stats) => json_response(&json!({ "field": field, "stats": stats })),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Serialize)]
struct CountEntry {
    value: i64,
    count: usize,
}

async fn field_counts(
    State(state): State<Arc<AppState>>,
    AxumPath(field): AxumPath<String>,
) -> Response {
    let lookup = field.clone();
    match run_blocking(move || state.session.value_counts(&lookup)).await {
        Ok(counts) => {
            let counts = counts
                .into_iter()
                .map(|(value, count)| CountEntry { value, count })
                .collect::<Vec<_>>();
            json_response(&json!({ "field": field, "counts": counts }))
        }
        Err(err) => error_response(err),
    }
}

async fn correlation(State(state): State<Arc<AppState>>) -> Response {
    match run_blocking(move || state.session.correlation()).await {
        Ok(matrix) => json_response(&json!({ "correlation": matrix })),
        Err(err) => error_response(err),
    }
}

async fn reload(State(state): State<Arc<AppState>>) -> Response {
    match run_blocking(move || state.session.reload()).await {
        Ok(dataset) => json_response(&json!({ "dataset": DatasetSummary::of(&dataset) })),
        Err(err) => {
            tracing::warn!(error = %err, "reload failed; keeping current dataset");
            error_response(err)
        }
    }
}

/// Run dataset work on the blocking pool; scans and disk reads stay off the async workers.
async fn run_blocking<T, F>(work: F) -> Result<T, Error>
where
    F: FnOnce() -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("dataset task failed")
            .with_source(err)
    })?
}

fn query_error(rejection: QueryRejection) -> Error {
    Error::new(ErrorKind::Usage)
        .with_message(format!("invalid query string: {}", rejection.body_text()))
        .with_hint("Use numeric page and page_size values, e.g. ?page=2&page_size=25.")
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

fn json_response<T: Serialize>(payload: &T) -> Response {
    Json(payload).into_response()
}

fn error_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Usage | ErrorKind::OutOfRange | ErrorKind::FieldType => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: Error) -> Response {
    let status = error_status(err.kind());
    let body = ErrorEnvelope {
        error: ErrorBody {
            kind: format!("{:?}", err.kind()),
            message: err.message().unwrap_or("error").to_string(),
            hint: err.hint().map(str::to_string),
            field: err.field().map(str::to_string),
            path: err.path().map(|path| path.to_string_lossy().to_string()),
        },
    };
    (status, Json(body)).into_response()
}
