//! Purpose: Blocking HTTP client for a Hugging Face compatible dataset registry.
//! Exports: `HubClient`, `HubConfig`, `RepoId`, `Identity`, `CommitReport`, `UploadedFile`,
//!          `TokenSource`, `DEFAULT_ENDPOINT`.
//! Role: Transport behind `publish`; one commit per upload call.
//! Invariants: Commits use the NDJSON commit endpoint with base64 file payloads.
//! Invariants: Repo paths are relative and `/`-separated regardless of platform.
//! Invariants: Authenticated calls fail with `Permission` before any request when no token is set.
#![allow(clippy::result_large_err)]

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use base64::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use url::Url;

use crate::core::error::{Error, ErrorKind};

type ApiResult<T> = Result<T, Error>;

pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";
const TOKEN_HINT: &str = "Pass --token/--token-file, set HF_TOKEN, or log in with the huggingface CLI.";

/// `namespace/name` registry repository id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RepoId {
    namespace: String,
    name: String,
}

impl RepoId {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for RepoId {
    type Err = Error;

    fn from_str(raw: &str) -> ApiResult<Self> {
        let invalid = || {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid repo id `{raw}`"))
                .with_hint("Use the form `namespace/name`, e.g. `alice/essay-feedback`.")
        };
        let (namespace, name) = raw.split_once('/').ok_or_else(invalid)?;
        if !valid_repo_part(namespace) || !valid_repo_part(name) {
            return Err(invalid());
        }
        Ok(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

fn valid_repo_part(part: &str) -> bool {
    !part.is_empty()
        && part.len() <= 96
        && part
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
        && !part.starts_with(['-', '.'])
        && !part.ends_with(['-', '.'])
        && !part.contains("--")
        && !part.contains("..")
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    Explicit,
    Environment,
    Cache(PathBuf),
}

#[derive(Clone, Debug)]
pub struct HubConfig {
    pub endpoint: String,
    pub token: Option<String>,
    pub token_source: Option<TokenSource>,
}

impl HubConfig {
    /// Resolve endpoint and token: explicit value, then `HF_ENDPOINT`/`HF_TOKEN`,
    /// then the token cache under `HF_HOME` (or `~/.cache/huggingface`).
    pub fn resolve(
        endpoint: Option<String>,
        token: Option<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ApiResult<Self> {
        let endpoint = endpoint
            .or_else(|| lookup("HF_ENDPOINT").filter(|value| !value.is_empty()))
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        let (token, token_source) = if let Some(token) = non_empty(token) {
            (Some(token), Some(TokenSource::Explicit))
        } else if let Some(token) = non_empty(lookup("HF_TOKEN")) {
            (Some(token), Some(TokenSource::Environment))
        } else {
            match token_cache_path(&lookup) {
                Some(path) if path.is_file() => {
                    let text = fs::read_to_string(&path).map_err(|err| {
                        Error::new(ErrorKind::Io)
                            .with_message("failed to read cached registry token")
                            .with_path(&path)
                            .with_source(err)
                    })?;
                    match non_empty(Some(text)) {
                        Some(token) => (Some(token), Some(TokenSource::Cache(path))),
                        None => (None, None),
                    }
                }
                _ => (None, None),
            }
        };
        Ok(Self {
            endpoint,
            token,
            token_source,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn token_cache_path(lookup: &impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    if let Some(home) = lookup("HF_HOME").filter(|value| !value.is_empty()) {
        return Some(PathBuf::from(home).join("token"));
    }
    lookup("HOME")
        .filter(|value| !value.is_empty())
        .map(|home| PathBuf::from(home).join(".cache").join("huggingface").join("token"))
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Identity {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct UploadedFile {
    pub path_in_repo: String,
    pub size: u64,
    pub sha256: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct CommitReport {
    pub files: Vec<UploadedFile>,
    pub commit_url: Option<String>,
}

#[derive(Deserialize)]
struct CommitResponse {
    #[serde(rename = "commitUrl", default)]
    commit_url: Option<String>,
}

#[derive(Deserialize)]
struct HubErrorBody {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Clone)]
pub struct HubClient {
    inner: Arc<HubClientInner>,
}

struct HubClientInner {
    base_url: Url,
    token: Option<String>,
    agent: ureq::Agent,
}

impl HubClient {
    pub fn new(endpoint: impl Into<String>) -> ApiResult<Self> {
        let base_url = normalize_base_url(endpoint.into())?;
        let agent = ureq::AgentBuilder::new().build();
        Ok(Self {
            inner: Arc::new(HubClientInner {
                base_url,
                token: None,
                agent,
            }),
        })
    }

    pub fn from_config(config: &HubConfig) -> ApiResult<Self> {
        let client = Self::new(config.endpoint.clone())?;
        Ok(match &config.token {
            Some(token) => client.with_token(token.clone()),
            None => client,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.token = Some(token.into());
        } else {
            self.inner = Arc::new(HubClientInner {
                base_url: self.inner.base_url.clone(),
                token: Some(token.into()),
                agent: self.inner.agent.clone(),
            });
        }
        self
    }

    pub fn repo_url(&self, repo_id: &RepoId) -> String {
        format!(
            "{}datasets/{}",
            self.inner.base_url.as_str(),
            repo_id
        )
    }

    pub fn whoami(&self) -> ApiResult<Identity> {
        self.require_token()?;
        let url = build_url(&self.inner.base_url, &["api", "whoami-v2"])?;
        self.request_json("GET", &url, &())
    }

    /// Create the dataset repository; an existing repository counts as success.
    pub fn create_repository(&self, repo_id: &RepoId, private: bool) -> ApiResult<String> {
        self.require_token()?;
        let url = build_url(&self.inner.base_url, &["api", "repos", "create"])?;
        let body = json!({
            "type": "dataset",
            "name": repo_id.name(),
            "organization": repo_id.namespace(),
            "private": private,
        });
        match self.request_json::<_, serde_json::Value>("POST", &url, &body) {
            Ok(_) => {
                tracing::info!(repo = %repo_id, "created dataset repository");
                Ok(self.repo_url(repo_id))
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                tracing::info!(repo = %repo_id, "dataset repository already exists");
                Ok(self.repo_url(repo_id))
            }
            Err(err) => Err(err),
        }
    }

    /// Commit every regular file under `folder`, placed under `path_in_repo` in the repository.
    pub fn upload_folder(
        &self,
        folder: &Path,
        path_in_repo: &str,
        repo_id: &RepoId,
        summary: &str,
    ) -> ApiResult<CommitReport> {
        let files = collect_folder(folder, path_in_repo)?;
        if files.is_empty() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("nothing to upload")
                .with_path(folder));
        }
        self.commit(repo_id, summary, &files)
    }

    pub fn upload_file(
        &self,
        path: &Path,
        path_in_repo: &str,
        repo_id: &RepoId,
        summary: &str,
    ) -> ApiResult<CommitReport> {
        self.commit(
            repo_id,
            summary,
            &[(path.to_path_buf(), path_in_repo.to_string())],
        )
    }

    fn commit(
        &self,
        repo_id: &RepoId,
        summary: &str,
        files: &[(PathBuf, String)],
    ) -> ApiResult<CommitReport> {
        self.require_token()?;
        let mut body = String::new();
        push_ndjson(&mut body, &json!({"key": "header", "value": {"summary": summary}}))?;
        let mut uploaded = Vec::with_capacity(files.len());
        for (path, path_in_repo) in files {
            let bytes = fs::read(path).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to read file for upload")
                    .with_path(path)
                    .with_source(err)
            })?;
            push_ndjson(
                &mut body,
                &json!({
                    "key": "file",
                    "value": {
                        "content": BASE64_STANDARD.encode(&bytes),
                        "path": path_in_repo,
                        "encoding": "base64",
                    }
                }),
            )?;
            uploaded.push(UploadedFile {
                path_in_repo: path_in_repo.clone(),
                size: bytes.len() as u64,
                sha256: sha256_hex(&bytes),
            });
        }

        let url = build_url(
            &self.inner.base_url,
            &[
                "api",
                "datasets",
                repo_id.namespace(),
                repo_id.name(),
                "commit",
                "main",
            ],
        )?;
        let response = self
            .request("POST", &url)
            .set("Accept", "application/json")
            .set("Content-Type", "application/x-ndjson")
            .send_string(&body);
        let parsed: CommitResponse = match response {
            Ok(resp) => read_json_response(resp)?,
            Err(ureq::Error::Status(code, resp)) => return Err(parse_error_response(code, resp)),
            Err(ureq::Error::Transport(err)) => {
                return Err(Error::new(ErrorKind::Io)
                    .with_message("registry request failed")
                    .with_source(err));
            }
        };
        tracing::info!(repo = %repo_id, files = uploaded.len(), "committed files");
        Ok(CommitReport {
            files: uploaded,
            commit_url: parsed.commit_url,
        })
    }

    fn require_token(&self) -> ApiResult<()> {
        if self.inner.token.is_some() {
            return Ok(());
        }
        Err(Error::new(ErrorKind::Permission)
            .with_message("no registry token available")
            .with_hint(TOKEN_HINT))
    }

    fn request_json<T, R>(&self, method: &str, url: &Url, body: &T) -> ApiResult<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let request = self.request(method, url).set("Accept", "application/json");
        let response = if method == "GET" {
            request.call()
        } else {
            let payload = serde_json::to_string(body).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to encode request json")
                    .with_source(err)
            })?;
            request
                .set("Content-Type", "application/json")
                .send_string(&payload)
        };

        match response {
            Ok(resp) => read_json_response(resp),
            Err(ureq::Error::Status(code, resp)) => Err(parse_error_response(code, resp)),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Io)
                .with_message("registry request failed")
                .with_source(err)),
        }
    }

    fn request(&self, method: &str, url: &Url) -> ureq::Request {
        let mut request = self.inner.agent.request(method, url.as_str());
        if let Some(token) = &self.inner.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        request
    }
}

fn push_ndjson(body: &mut String, value: &serde_json::Value) -> ApiResult<()> {
    let line = serde_json::to_string(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode commit line")
            .with_source(err)
    })?;
    body.push_str(&line);
    body.push('\n');
    Ok(())
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut output = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

/// Regular files under `folder`, sorted, paired with their `/`-joined repository path.
/// Hidden entries (`.DS_Store`, `.git/`, editor swap files) are never uploaded.
fn collect_folder(folder: &Path, prefix: &str) -> ApiResult<Vec<(PathBuf, String)>> {
    if !folder.is_dir() {
        return Err(Error::new(ErrorKind::NotFound)
            .with_message("upload folder not found")
            .with_path(folder));
    }
    let mut out = Vec::new();
    let mut pending = vec![folder.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to list upload folder")
                .with_path(&dir)
                .with_source(err)
        })?;
        for entry in entries {
            let entry = entry.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to list upload folder")
                    .with_path(&dir)
                    .with_source(err)
            })?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.is_file() {
                let relative = repo_path(folder, &path)?;
                let prefix = prefix.trim_matches('/');
                let in_repo = if prefix.is_empty() {
                    relative
                } else {
                    format!("{prefix}/{relative}")
                };
                out.push((path, in_repo));
            }
        }
    }
    out.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(out)
}

fn repo_path(root: &Path, path: &Path) -> ApiResult<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        Error::new(ErrorKind::Internal)
            .with_message("upload path escaped its folder")
            .with_path(path)
    })?;
    let mut parts = Vec::new();
    for component in relative.components() {
        let part = component.as_os_str().to_str().ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message("upload paths must be valid UTF-8")
                .with_path(path)
        })?;
        parts.push(part);
    }
    Ok(parts.join("/"))
}

fn normalize_base_url(raw: String) -> ApiResult<Url> {
    let mut url = Url::parse(&raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid registry endpoint")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("registry endpoint must use http or https scheme"));
    }
    if url.path() != "/" && !url.path().is_empty() {
        return Err(
            Error::new(ErrorKind::Usage).with_message("registry endpoint must not include a path")
        );
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn build_url(base_url: &Url, segments: &[&str]) -> ApiResult<Url> {
    let mut url = base_url.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            Error::new(ErrorKind::Usage).with_message("registry endpoint cannot be a base")
        })?;
        path.clear();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

fn read_json_response<R>(response: ureq::Response) -> ApiResult<R>
where
    R: DeserializeOwned,
{
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Registry)
            .with_message("invalid registry response json")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let body = response.into_string().unwrap_or_default();
    let kind = error_kind_from_status(status);
    let detail = serde_json::from_str::<HubErrorBody>(&body)
        .ok()
        .and_then(|parsed| parsed.error);
    let mut err = Error::new(kind).with_message(match detail {
        Some(detail) => format!("registry error status {status}: {detail}"),
        None => format!("registry error status {status}"),
    });
    if kind == ErrorKind::Permission {
        err = err.with_hint(TOKEN_HINT);
    }
    err
}

fn error_kind_from_status(status: u16) -> ErrorKind {
    match status {
        400 | 413 | 422 => ErrorKind::Usage,
        401 | 403 => ErrorKind::Permission,
        404 => ErrorKind::NotFound,
        409 => ErrorKind::AlreadyExists,
        _ => ErrorKind::Registry,
    }
}
